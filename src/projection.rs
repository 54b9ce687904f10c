use thiserror::Error;

use crate::{
    error_expl::{ContextBuilder, Pretty, PrettyError},
    span::Span,
};

/// Top-level splitting of field lists, aware of parentheses and quoted spans.
mod split;

/// Compilation of a select text into a [ProjectionSpec].
mod compile;

/// Query spec assembly, executor contract and reshaping of tabular results.
mod query;

pub use compile::{compile_projection, Field, ProjectionSpec, AGGREGATE_FUNCTIONS};
pub use query::{
    build_query_spec, query_data, reshape_result, ObjRef, QueryExecutor, QuerySpec, Record,
    Scalar, TaggedCell, Tuple, TupleResult, DEFAULT_LIMIT,
};
pub use split::{split_top_level, strip_quotes, Delimiter};

/// The select text could not be understood. Each variant carries the offending text
/// verbatim, no partial parse is ever returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedExpression {
    #[error("Bad Format - Uneven Parens: `{text}`")]
    UnevenParens { text: String },

    #[error("Bad Format - Uneven Quotes: `{text}`")]
    UnevenQuotes { text: String },

    #[error("Parsing Field, Confused By: {field}")]
    ConfusedBy { field: String, span: Span },

    #[error("Output name `{name}` is used by more than one field")]
    DuplicateName { name: String, span: Span },
}

impl MalformedExpression {
    /// Span of the offending field inside the select text, when it is known.
    pub fn span(&self) -> Option<Span> {
        match self {
            MalformedExpression::ConfusedBy { span, .. }
            | MalformedExpression::DuplicateName { span, .. } => Some(*span),
            MalformedExpression::UnevenParens { .. } | MalformedExpression::UnevenQuotes { .. } => {
                None
            }
        }
    }

    /// Render the error against the select text it came from, underlining the field
    /// at fault. Errors without a span underline the whole text.
    pub fn explain(&self, select: &str) -> Option<PrettyError> {
        let span = self.span().unwrap_or(Span::from(0..select.len()));
        let context = ContextBuilder::new()
            .span(span)
            .message(self.to_string())
            .build()
            .ok()?;

        let mut builder = Pretty::new(select).explain_builder();
        builder.error(context);
        builder.build().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explain_points_at_confusing_field() {
        let select = "id, a b c, name";
        let err = compile_projection(select).unwrap_err();
        let pretty = err.explain(select).unwrap();

        let lines: Vec<_> = pretty.lines().collect();
        assert_eq!(lines[0], "error: Parsing Field, Confused By: a b c");
        assert_eq!(lines[2], "  |     ^^^^^ Parsing Field, Confused By: a b c");
    }

    #[test]
    fn explain_without_span_covers_everything() {
        let select = "sum(a";
        let err = compile_projection(select).unwrap_err();
        assert!(err.span().is_none());
        let pretty = err.explain(select).unwrap();
        assert!(pretty.contains("^^^^^"));
    }
}
