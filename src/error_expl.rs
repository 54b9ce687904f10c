use log::trace;
use smallvec::SmallVec;

use crate::span::Span;

/// Renders errors against the select text they were found in, underlining the
/// offending part.
pub struct Pretty<'src> {
    src: &'src str,
}

impl<'src> Pretty<'src> {
    pub fn new(src: &'src str) -> Self {
        Self { src }
    }

    pub fn explain_builder(&self) -> ExplainBuilder<'src> {
        ExplainBuilder {
            src: self.src,
            error_context: None,
            explain_contexts: Default::default(),
        }
    }
}

pub struct ExplainBuilder<'src> {
    src: &'src str,
    error_context: Option<Context>,
    explain_contexts: SmallVec<[Context; 4]>,
}

impl<'src> ExplainBuilder<'src> {
    /// Add a context with the error message.
    pub fn push_context(&mut self, context: Context) -> &mut Self {
        self.explain_contexts.push(context);
        self
    }

    /// Add an error context to the error message.
    pub fn error(&mut self, context: Context) -> &mut Self {
        self.error_context = Some(context);
        self
    }

    /// Build pretty explanation from the provided contexts.
    pub fn build(self) -> Result<PrettyError, ExplainBuildError> {
        let ExplainBuilder {
            src,
            error_context,
            explain_contexts,
        } = self;

        let error = error_context.ok_or(ExplainBuildError::MissingErrorContext)?;
        let src_len = src.len() as u32;
        if error.span.end() > src_len {
            return Err(ExplainBuildError::SpanOutOfSource);
        }

        // Line breaks would shift the underline, so the source is printed flat.
        let flat: String = src
            .chars()
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect();

        let mut out = format!("error: {}\n  | {flat}\n", error.message);
        out.push_str(&underline(src, &error, '^'));
        for context in &explain_contexts {
            if context.span.end() > src_len {
                trace!("Skipping context outside of the source: {}", context.message);
                continue;
            }
            out.push_str(&underline(src, context, '-'));
        }
        Ok(PrettyError(out.trim_end().to_owned()))
    }
}

fn underline(src: &str, context: &Context, mark: char) -> String {
    let lead = context.span.slice_before(src).chars().count();
    let width = context.span.slice(src).chars().count().max(1);
    format!(
        "  | {}{} {}\n",
        " ".repeat(lead),
        mark.to_string().repeat(width),
        context.message
    )
}

trait SliceBefore {
    fn slice_before<'a>(&self, text: &'a str) -> &'a str;
}

impl SliceBefore for Span {
    fn slice_before<'a>(&self, text: &'a str) -> &'a str {
        text.get(..self.start() as usize).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct PrettyError(String);

impl std::fmt::Display for PrettyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for PrettyError {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::convert::AsRef<str> for PrettyError {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExplainBuildError {
    #[error("Error context is missing")]
    MissingErrorContext,

    #[error("Error context points outside of the source text")]
    SpanOutOfSource,
}

#[derive(Debug, Clone)]
pub struct Context {
    span: Span,
    message: String,
}

#[derive(Debug, Default)]
pub struct ContextBuilder {
    span: Option<Span>,
    message: Option<String>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self {
            span: None,
            message: None,
        }
    }

    pub fn span(&mut self, span: Span) -> &mut Self {
        self.span = Some(span);
        self
    }

    pub fn message(&mut self, message: impl Into<String>) -> &mut Self {
        self.message = Some(message.into());
        self
    }

    pub fn build(&mut self) -> Result<Context, ContextBuildError> {
        trace!("Building context");

        let span = self.span.take().ok_or(ContextBuildError::MissingSpan)?;

        trace!("Check if message is present");
        if let Some(message) = self.message.take() {
            trace!("Context is built successfully");
            Ok(Context { span, message })
        } else {
            Err(ContextBuildError::MissingMessage)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContextBuildError {
    #[error("Missing span")]
    MissingSpan,

    #[error("Missing message")]
    MissingMessage,
}
