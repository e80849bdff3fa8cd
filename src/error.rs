//! Compile-time diagnostics for template sources

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    /// Malformed expression or directive argument
    #[error("syntax error at {span:?}: {message}")]
    Syntax {
        span: Span,
        message: String,
        expected: Vec<String>,
    },

    /// Block directive without its opening or closing counterpart
    #[error("unbalanced directive at {span:?}: {message}")]
    Unbalanced { span: Span, message: String },

    /// Error located in the layout a template extends rather than the template itself
    #[error("in layout '{layout}': {inner}")]
    InLayout {
        layout: String,
        #[source]
        inner: Box<CompileError>,
    },
}

impl CompileError {
    pub fn syntax(span: Span, message: impl Into<String>, expected: Vec<String>) -> Self {
        Self::Syntax {
            span,
            message: message.into(),
            expected,
        }
    }

    pub fn unbalanced(span: Span, message: impl Into<String>) -> Self {
        Self::Unbalanced {
            span,
            message: message.into(),
        }
    }

    /// Attribute this error to a layout source
    pub fn in_layout(self, layout: impl Into<String>) -> Self {
        match self {
            already @ Self::InLayout { .. } => already,
            other => Self::InLayout {
                layout: layout.into(),
                inner: Box::new(other),
            },
        }
    }

    /// Name of the layout whose source the span refers to, if any
    pub fn layout(&self) -> Option<&str> {
        match self {
            Self::InLayout { layout, .. } => Some(layout),
            _ => None,
        }
    }

    pub fn span(&self) -> &Span {
        match self {
            Self::Syntax { span, .. } | Self::Unbalanced { span, .. } => span,
            Self::InLayout { inner, .. } => inner.span(),
        }
    }

    /// Format the error with source context using ariadne
    ///
    /// `source` must be the text the span points into: the template itself, or the
    /// layout named by [`CompileError::layout`].
    pub fn format(&self, source: &str, filename: &str) -> String {
        let (message, detail) = match self {
            Self::Syntax {
                message, expected, ..
            } => {
                let expected_str = if expected.is_empty() {
                    String::new()
                } else {
                    format!("\nExpected: {}", expected.join(", "))
                };
                (message.clone(), format!("{}{}", message, expected_str))
            }
            Self::Unbalanced { message, .. } => (message.clone(), message.clone()),
            Self::InLayout { inner, .. } => return inner.format(source, filename),
        };

        // Clamp so a stale source can't make ariadne index past the end
        let end = self.span().end.min(source.len());
        let start = self.span().start.min(end);

        let mut buf = Vec::new();
        let written = Report::build(ReportKind::Error, filename, start)
            .with_message(&message)
            .with_label(
                Label::new((filename, start..end))
                    .with_message(detail)
                    .with_color(Color::Red),
            )
            .finish()
            .write((filename, Source::from(source)), &mut buf);

        match written {
            Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
            Err(_) => format!("{}: {}\n", filename, self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_layout_keeps_inner_span() {
        let err = CompileError::unbalanced(4..7, "@if is never closed").in_layout("layouts/main");
        assert_eq!(err.layout(), Some("layouts/main"));
        assert_eq!(err.span(), &(4..7));
        assert!(err.to_string().contains("layouts/main"));
    }

    #[test]
    fn test_in_layout_is_not_nested_twice() {
        let err = CompileError::unbalanced(0..1, "x")
            .in_layout("a")
            .in_layout("b");
        assert_eq!(err.layout(), Some("a"));
    }

    #[test]
    fn test_format_mentions_file_and_message() {
        let err = CompileError::syntax(3..5, "unexpected '?'", vec!["identifier".to_string()]);
        let report = err.format("{{ ?? }}", "home.html");
        assert!(report.contains("home.html"));
        assert!(report.contains("unexpected '?'"));
    }
}
