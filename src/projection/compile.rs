use std::collections::HashSet;

use lazy_regex::regex_captures;
use log::{debug, trace};

use super::{
    split::{split_spanned, strip_quotes, Delimiter},
    MalformedExpression,
};
use crate::span::Span;

/// Function names that turn a field into an aggregate. Matched case-insensitively.
pub const AGGREGATE_FUNCTIONS: [&str; 6] = ["max", "min", "sum", "count", "avg", "stddev"];

/// One requested column of a projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    expression: String,
    output_name: String,
    is_aggregate: bool,
    span: Span,
}

impl Field {
    /// Expression handed to the query engine.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Name of the column in reshaped records. Defaults to the expression.
    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    pub fn is_aggregate(&self) -> bool {
        self.is_aggregate
    }

    /// Where the field sits in the select text.
    pub fn span(&self) -> Span {
        self.span
    }
}

/// Compiled select text: ordered fields and, when any field aggregates, the
/// expressions to group by.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectionSpec {
    fields: Vec<Field>,
    group_keys: Vec<String>,
}

impl ProjectionSpec {
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Expressions of non-aggregate fields, in field order.
    pub fn group_keys(&self) -> &[String] {
        &self.group_keys
    }

    pub fn has_aggregate(&self) -> bool {
        self.fields.iter().any(Field::is_aggregate)
    }

    /// Group clause, present only when at least one field aggregates.
    pub fn group(&self) -> Option<String> {
        self.has_aggregate().then(|| self.group_keys.join(","))
    }

    /// Projection clause: all expressions joined by commas.
    pub fn projection(&self) -> String {
        self.fields
            .iter()
            .map(Field::expression)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Output names in the same order as the requested expressions.
    pub fn output_names(&self) -> Vec<&str> {
        self.fields.iter().map(Field::output_name).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Compile a select text like `region as "Region", sum(sales) Total` into a
/// [ProjectionSpec].
///
/// Each comma separated field is one of:
/// - `expr`, named after itself;
/// - `expr alias`;
/// - `expr AS alias` (`as` in any case).
///
/// Aliases may be wrapped in double quotes. Empty fields are skipped.
pub fn compile_projection(select: &str) -> Result<ProjectionSpec, MalformedExpression> {
    let segments = split_spanned(select, Delimiter::Comma).map_err(|e| e.with_text(select))?;

    let mut spec = ProjectionSpec::default();
    let mut seen = HashSet::new();

    for segment in segments {
        let (field, raw_span) = segment.split();
        let field = field.trim();
        if field.is_empty() {
            continue;
        }
        let span = trimmed_span(select, raw_span);

        let parts = split_spanned(field, Delimiter::Space).map_err(|e| e.with_text(field))?;
        trace!("Field `{field}` split into {} part(s)", parts.len());
        if parts.first().map_or(true, |p| p.is_empty()) {
            continue;
        }

        let (expression, output_name) = match parts.as_slice() {
            [expr] => (expr.as_str(), expr.as_str()),
            [expr, alias] => (expr.as_str(), strip_quotes(alias)),
            [expr, as_kw, alias] if as_kw.eq_ignore_ascii_case("as") => {
                (expr.as_str(), strip_quotes(alias))
            }
            _ => {
                return Err(MalformedExpression::ConfusedBy {
                    field: field.to_owned(),
                    span,
                })
            }
        };

        if !seen.insert(output_name.to_owned()) {
            return Err(MalformedExpression::DuplicateName {
                name: output_name.to_owned(),
                span,
            });
        }

        let is_aggregate = is_aggregate_call(expression);
        if !is_aggregate {
            spec.group_keys.push(expression.to_owned());
        }
        spec.fields.push(Field {
            expression: expression.to_owned(),
            output_name: output_name.to_owned(),
            is_aggregate,
            span,
        });
    }

    debug!(
        "Compiled {} field(s), {} group key(s), aggregate: {}",
        spec.fields.len(),
        spec.group_keys.len(),
        spec.has_aggregate()
    );
    Ok(spec)
}

/// Whether the expression starts with a call of one of [AGGREGATE_FUNCTIONS].
fn is_aggregate_call(expression: &str) -> bool {
    regex_captures!(r"^([a-zA-Z]+) *\(", expression)
        .map(|(_, name)| {
            AGGREGATE_FUNCTIONS
                .iter()
                .any(|agg| name.eq_ignore_ascii_case(agg))
        })
        .unwrap_or(false)
}

/// Narrow a raw segment span to its non-whitespace content.
fn trimmed_span(text: &str, raw: Span) -> Span {
    let slice = raw.slice(text);
    let lead = slice.len() - slice.trim_start().len();
    let trail = slice.len() - slice.trim_end().len();
    Span::new(raw.start() + lead as u32, raw.end() - trail as u32).unwrap_or(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_fields() {
        let spec = compile_projection("id,name").unwrap();
        let names: Vec<_> = spec
            .fields()
            .iter()
            .map(|f| (f.expression(), f.output_name()))
            .collect();
        assert_eq!(names, [("id", "id"), ("name", "name")]);
        assert!(!spec.has_aggregate());
        assert_eq!(spec.group(), None);
    }

    #[test]
    fn aliases_and_aggregates() {
        let spec = compile_projection(r#"region as "Region", sum(sales) Total"#).unwrap();
        assert_eq!(spec.projection(), "region,sum(sales)");
        assert_eq!(spec.output_names(), ["Region", "Total"]);
        assert_eq!(spec.group_keys(), ["region"]);
        assert!(!spec.fields()[0].is_aggregate());
        assert!(spec.fields()[1].is_aggregate());
        assert_eq!(spec.group().as_deref(), Some("region"));
    }

    #[test]
    fn as_keyword_any_case() {
        let spec = compile_projection("a AS x, b As y, c aS z").unwrap();
        assert_eq!(spec.output_names(), ["x", "y", "z"]);
    }

    #[test]
    fn quoted_alias_with_spaces() {
        let spec = compile_projection(r#"sum(cost) "Total Cost""#).unwrap();
        assert_eq!(spec.output_names(), ["Total Cost"]);
    }

    #[test]
    fn complex_expression_alias() {
        let spec = compile_projection(
            r#"productId as Product, sum(sales) TotalSales, (productType=="New"?"New":"Old") as "Is New?""#,
        )
        .unwrap();
        assert_eq!(spec.output_names(), ["Product", "TotalSales", "Is New?"]);
        assert_eq!(
            spec.group().as_deref(),
            Some(r#"productId,(productType=="New"?"New":"Old")"#)
        );
    }

    #[test]
    fn aggregate_detection_is_case_insensitive() {
        for expr in ["MAX(a)", "Count (id)", "stddev(x)", "avg(y)", "min(z)"] {
            assert!(is_aggregate_call(expr), "{expr}");
        }
        for expr in ["lower(a)", "a", "(sum(a))", "sum"] {
            assert!(!is_aggregate_call(expr), "{expr}");
        }
    }

    #[test]
    fn non_aggregate_function_is_grouped() {
        let spec = compile_projection("lower(name), count(id)").unwrap();
        assert_eq!(spec.group_keys(), ["lower(name)"]);
        assert_eq!(spec.group().as_deref(), Some("lower(name)"));
    }

    #[test]
    fn three_tokens_without_as() {
        let err = compile_projection("a b c").unwrap_err();
        let MalformedExpression::ConfusedBy { field, span } = err else {
            panic!("expected ConfusedBy, got {err:?}");
        };
        assert_eq!(field, "a b c");
        assert_eq!(span, Span::from(0..5));
    }

    #[test]
    fn error_shows_field_verbatim() {
        let err = compile_projection("id, x as y z").unwrap_err();
        assert_eq!(err.to_string(), "Parsing Field, Confused By: x as y z");
    }

    #[test]
    fn unbalanced_input() {
        assert!(matches!(
            compile_projection("id, sum(a").unwrap_err(),
            MalformedExpression::UnevenParens { .. }
        ));
        assert!(matches!(
            compile_projection(r#"id "Name"#).unwrap_err(),
            MalformedExpression::UnevenQuotes { .. }
        ));
    }

    #[test]
    fn empty_fields_skipped() {
        let spec = compile_projection("a,, b,").unwrap();
        assert_eq!(spec.output_names(), ["a", "b"]);
        assert!(compile_projection("").unwrap().is_empty());
    }

    #[test]
    fn duplicate_output_name() {
        let err = compile_projection("a, b a").unwrap_err();
        assert!(matches!(err, MalformedExpression::DuplicateName { ref name, .. } if name == "a"));
    }

    #[test]
    fn field_spans_are_trimmed() {
        let select = "id ,  sum(x) Total";
        let spec = compile_projection(select).unwrap();
        assert_eq!(spec.fields()[0].span().slice(select), "id");
        assert_eq!(spec.fields()[1].span().slice(select), "sum(x) Total");
    }
}
