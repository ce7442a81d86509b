//! The external math-rendering collaborator (a KaTeX equivalent).
//!
//! Rendering is synchronous and failure-prone on malformed input; the
//! pipeline catches every failure locally and degrades to a visible
//! `tex-error` span, so a bad formula can never blank out the rest of a
//! message.

use crate::prelude::*;

#[derive(Debug)]
pub enum MathError {
    /// The source failed to parse as TeX. Expected and common; rendered as
    /// an inline error marker without logging.
    Parse(String),
    /// Anything else the renderer reports. Unexpected; logged.
    Render(Report),
}

impl std::fmt::Display for MathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MathError::Parse(msg) => write!(f, "TeX parse error: {msg}"),
            MathError::Render(report) => write!(f, "TeX render error: {report}"),
        }
    }
}

impl std::error::Error for MathError {}

pub trait MathRenderer {
    /// Render TeX source to an HTML fragment. `display_mode` selects
    /// display (block) math over inline math.
    fn render(&self, source: &str, display_mode: bool) -> Result<String, MathError>;
}

/// Stand-in renderer for deployments without a TeX engine. Every formula
/// degrades to the `tex-error` span, which keeps the output shape stable
/// until the authoritative server render arrives.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledMathRenderer;

impl MathRenderer for DisabledMathRenderer {
    fn render(&self, _source: &str, _display_mode: bool) -> Result<String, MathError> {
        Err(MathError::Parse("math rendering is not available".to_owned()))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Fake TeX renderer: wraps well-formed input in a recognizable span and
    /// fails on cue.
    #[derive(Debug, Default)]
    pub struct TestMathRenderer;

    impl MathRenderer for TestMathRenderer {
        fn render(&self, source: &str, display_mode: bool) -> Result<String, MathError> {
            if source.contains("\\bad") {
                return Err(MathError::Parse("unknown control sequence".to_owned()));
            }
            if source.contains("\\explode") {
                return Err(MathError::Render(eyre!("renderer crashed")));
            }
            let class = if display_mode {
                "katex-display"
            } else {
                "katex"
            };
            Ok(format!(
                "<span class=\"{class}\">{}</span>",
                crate::render::escape_html_text(source)
            ))
        }
    }
}
