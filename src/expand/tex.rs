//! Inline math pass: `$$...$$` on a single line.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::math::MathError;
use crate::prelude::*;
use crate::render::escape_html_text;

use super::{substitute, ExpandContext};

static INLINE_MATH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\$([^\n$]+)\$\$").unwrap());

pub(crate) fn expand_inline_math(text: &str, ctx: &mut ExpandContext) -> String {
    substitute(text, &INLINE_MATH_RE, |caps| {
        let html = match ctx.math.render(&caps[1], false) {
            Ok(html) => html,
            // Parse errors are the user's problem and get a visible marker.
            Err(MathError::Parse(_)) => format!(
                r#"<span class="tex-error">{}</span>"#,
                escape_html_text(&caps[0])
            ),
            // Anything else is ours; log it and leave the raw text alone.
            Err(MathError::Render(report)) => {
                error!("Inline math failed to render: {report}");
                return None;
            }
        };
        Some(ctx.stash.stash(html, false))
    })
}

#[cfg(test)]
mod tests {
    use crate::expand::testing::TestRig;

    #[test]
    fn inline_math_renders() {
        let rig = TestRig::new();
        assert_eq!(
            rig.expand("so $$x^2$$ holds"),
            r#"so <span class="katex">x^2</span> holds"#
        );
    }

    #[test]
    fn parse_failure_keeps_the_delimiters_in_the_error_span() {
        let rig = TestRig::new();
        assert_eq!(
            rig.expand("$$\\bad{x}$$"),
            r#"<span class="tex-error">$$\bad{x}$$</span>"#
        );
    }

    #[test]
    fn unexpected_render_failure_leaves_raw_text() {
        let rig = TestRig::new();
        assert_eq!(rig.expand("$$\\explode$$"), "$$\\explode$$");
    }

    #[test]
    fn unclosed_delimiters_stay_literal() {
        let rig = TestRig::new();
        assert_eq!(rig.expand("costs $$5 up front"), "costs $$5 up front");
    }

    #[test]
    fn math_does_not_span_lines() {
        let rig = TestRig::new();
        assert_eq!(rig.expand("$$a\nb$$"), "$$a\nb$$");
    }
}
