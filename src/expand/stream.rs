//! Stream and stream/topic link passes.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::render::escape_html_text;

use super::{substitute, ExpandContext};

static STREAM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)(^|\W)#\*\*([^*>\n]+?)(?:>([^*\n]*))?\*\*").unwrap());

pub(crate) fn expand_stream_links(text: &str, ctx: &mut ExpandContext) -> String {
    substitute(text, &STREAM_RE, |caps| {
        let stream = ctx.helpers.stream_by_name(caps[2].trim())?;

        // A `>` with nothing after it is malformed, not a plain stream
        // link; the raw syntax passes through.
        let topic = match caps.get(3) {
            Some(m) => {
                let topic = m.as_str().trim();
                if topic.is_empty() {
                    return None;
                }
                Some(topic)
            }
            None => None,
        };

        let html = match topic {
            Some(topic) => format!(
                r#"<a class="stream-topic" data-stream-id="{}" href="{}">#{} &gt; {}</a>"#,
                stream.id,
                escape_html_text(&ctx.helpers.stream_topic_hash(&stream, topic)),
                escape_html_text(&stream.name),
                escape_html_text(topic)
            ),
            None => format!(
                r#"<a class="stream" data-stream-id="{}" href="{}">#{}</a>"#,
                stream.id,
                escape_html_text(&ctx.helpers.stream_hash(&stream)),
                escape_html_text(&stream.name)
            ),
        };

        Some(format!("{}{}", &caps[1], ctx.stash.stash(html, false)))
    })
}
