use log::trace;
use logos::Logos;
use smallvec::SmallVec;

use super::MalformedExpression;
use crate::span::{Span, Spanned};

/// Lexical elements of a field list. Everything that is not structurally
/// meaningful collapses into [FieldLex::Text].
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
enum FieldLex {
    #[token("\"")]
    Quote,

    #[token("(")]
    OpenParen,

    #[token(")")]
    CloseParen,

    #[token(",")]
    Comma,

    #[token(" ")]
    Space,

    #[regex(r#"[^"(), ]+"#)]
    Text,
}

/// Character a field list can be split on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    /// Separates fields of a select text.
    Comma,

    /// Separates an expression from its alias.
    Space,
}

impl Delimiter {
    fn token(self) -> FieldLex {
        match self {
            Delimiter::Comma => FieldLex::Comma,
            Delimiter::Space => FieldLex::Space,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum SplitError {
    UnevenParens,
    UnevenQuotes,
}

impl SplitError {
    pub(super) fn with_text(self, text: &str) -> MalformedExpression {
        let text = text.to_owned();
        match self {
            SplitError::UnevenParens => MalformedExpression::UnevenParens { text },
            SplitError::UnevenQuotes => MalformedExpression::UnevenQuotes { text },
        }
    }
}

/// Split `text` on `delimiter`, but only outside of parentheses and quoted spans.
///
/// Quotes inside a quoted span are escaped by doubling, as in CSV. Whitespace that
/// starts a segment or follows another whitespace is dropped.
pub fn split_top_level(
    text: &str,
    delimiter: Delimiter,
) -> Result<Vec<String>, MalformedExpression> {
    split_spanned(text, delimiter)
        .map(|parts| parts.into_iter().map(Spanned::into_inner).collect())
        .map_err(|e| e.with_text(text))
}

/// Same as [split_top_level], but each part keeps the byte range of the raw segment
/// it was taken from.
pub(super) fn split_spanned(
    text: &str,
    delimiter: Delimiter,
) -> Result<SmallVec<[Spanned<String>; 8]>, SplitError> {
    use FieldLex::*;

    let mut parts = SmallVec::new();
    if text.is_empty() {
        return Ok(parts);
    }

    let delim = delimiter.token();
    let mut lex = FieldLex::lexer(text);
    let mut depth: i32 = 0;
    let mut quoted = false;
    let mut prev: Option<FieldLex> = None;
    let mut buffer = String::new();
    let mut segment_start = 0;

    while let Some(token) = lex.next() {
        let range = lex.span();
        // Every character is covered by some token, anything else is plain text.
        let token = token.unwrap_or(Text);
        let last = prev.replace(token);

        if token == delim && depth == 0 && !quoted {
            parts.push(Span::from(segment_start..range.start).with(std::mem::take(&mut buffer)));
            segment_start = range.end;
            continue;
        }

        match token {
            OpenParen if !quoted => depth += 1,
            CloseParen if !quoted => depth -= 1,
            Quote => {
                quoted = !quoted;
                if last == Some(Quote) {
                    // Second quote of an escaped pair.
                    continue;
                }
            }
            Space if !quoted && (buffer.is_empty() || last == Some(Space)) => continue,
            _ => {}
        }
        buffer.push_str(lex.slice());
    }

    if depth != 0 {
        trace!("Uneven parens, depth {depth} at the end of `{text}`");
        return Err(SplitError::UnevenParens);
    }
    if quoted {
        trace!("Quoted span left open at the end of `{text}`");
        return Err(SplitError::UnevenQuotes);
    }

    parts.push(Span::from(segment_start..text.len()).with(buffer));
    Ok(parts)
}

/// Remove one pair of surrounding double quotes, if both are present.
pub fn strip_quotes(text: &str) -> &str {
    text.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(text)
}
