//! Realm linkifier pass. Runs last so every built-in syntax has already
//! been consumed.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::linkifier::Linkifier;
use crate::prelude::*;
use crate::render::escape_html_text;
use crate::stash::Stash;

use super::ExpandContext;

// Spans already claimed by earlier passes or by freezing. Rules are
// arbitrary patterns, so unlike the built-in syntaxes they could chew into
// a token and corrupt it.
static CLAIMED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x{E000}\x{E001}]\d+[\x{E000}\x{E001}]").unwrap());

pub(crate) fn expand_linkifiers(text: &str, ctx: &mut ExpandContext) -> String {
    let rules = ctx.linkifiers.all();
    let mut text = text.to_owned();
    for rule in rules.iter() {
        text = apply_rule(&text, rule, ctx.stash);
    }
    text
}

fn apply_rule(text: &str, rule: &Linkifier, stash: &mut Stash) -> String {
    let claimed: Vec<_> = CLAIMED_RE.find_iter(text).map(|m| m.range()).collect();

    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for caps in rule.pattern.captures_iter(text) {
        let caps = match caps {
            Ok(caps) => caps,
            // Backtracking limit or similar; keep the rest of the message
            // intact and move on.
            Err(e) => {
                warn!("Linkifier match failed: {e}");
                break;
            }
        };
        let whole = match caps.get(0) {
            Some(whole) => whole,
            None => continue,
        };
        if whole.start() < last
            || claimed
                .iter()
                .any(|r| whole.start() < r.end && r.start < whole.end())
        {
            continue;
        }

        out.push_str(&text[last..whole.start()]);
        let html = format!(
            r#"<a href="{}">{}</a>"#,
            escape_html_text(&rule.build_url(&caps)),
            escape_html_text(whole.as_str())
        );
        out.push_str(&stash.stash(html, false));
        last = whole.end();
    }

    out.push_str(&text[last..]);
    out
}
