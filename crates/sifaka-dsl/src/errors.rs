use miette::Diagnostic;
use thiserror::Error;

use crate::ast::Span;

#[derive(Debug, Error, Diagnostic)]
pub enum ParseError {
    #[error("Syntax error: {message}")]
    #[diagnostic(code(sifaka::parse::syntax))]
    Syntax {
        message: String,
        #[label("here")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("Duplicate definition: {name}")]
    #[diagnostic(code(sifaka::parse::duplicate))]
    Duplicate {
        name: String,
        #[label("duplicate")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("Malformed {context}: {message}")]
    #[diagnostic(code(sifaka::parse::malformed))]
    Malformed {
        context: String,
        message: String,
        #[label("in this {context}")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },
}

impl ParseError {
    pub fn syntax(message: impl Into<String>, span: Span, source: &str, filename: &str) -> Self {
        ParseError::Syntax {
            message: message.into(),
            span: to_miette(span),
            src: miette::NamedSource::new(filename, source.to_owned()),
        }
    }

    pub fn duplicate(name: impl Into<String>, span: Span, source: &str, filename: &str) -> Self {
        ParseError::Duplicate {
            name: name.into(),
            span: to_miette(span),
            src: miette::NamedSource::new(filename, source.to_owned()),
        }
    }

    pub fn malformed(
        context: impl Into<String>,
        message: impl Into<String>,
        span: Span,
        source: &str,
        filename: &str,
    ) -> Self {
        ParseError::Malformed {
            context: context.into(),
            message: message.into(),
            span: to_miette(span),
            src: miette::NamedSource::new(filename, source.to_owned()),
        }
    }
}

fn to_miette(span: Span) -> miette::SourceSpan {
    (span.start, span.end.saturating_sub(span.start)).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_syntax_error() {
        let err = ParseError::syntax("unexpected EOF", Span::new(0, 3), "abc", "t.pmrs");
        assert_eq!(err.to_string(), "Syntax error: unexpected EOF");
    }

    #[test]
    fn display_duplicate_error() {
        let err = ParseError::duplicate("list", Span::new(5, 9), "type list", "t.pmrs");
        assert_eq!(err.to_string(), "Duplicate definition: list");
    }

    #[test]
    fn span_conversion_is_offset_and_length() {
        let err = ParseError::syntax("x", Span::new(4, 9), "some text here", "t.pmrs");
        match err {
            ParseError::Syntax { span, .. } => {
                assert_eq!(span.offset(), 4);
                assert_eq!(span.len(), 5);
            }
            _ => unreachable!(),
        }
    }
}
