//! Text-level substitution passes.
//!
//! These run between the fence pre-pass and the Markdown engine, rewriting
//! special syntaxes (mentions, stream links, emoji, timestamps, inline math,
//! linkifiers) into stash placeholders. Passes operate on plain text, so
//! anything code-like is frozen first and thawed after the last pass to keep
//! it out of their reach.

pub(crate) mod emoji;
pub(crate) mod linkifier;
pub(crate) mod mention;
pub(crate) mod stream;
pub(crate) mod tex;
pub(crate) mod timestamp;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::emoji::EmojiMap;
use crate::helpers::Helpers;
use crate::linkifier::LinkifierRegistry;
use crate::math::MathRenderer;
use crate::prelude::*;
use crate::stash::Stash;

// Freeze tokens use a different private-use character than the stash so the
// two namespaces cannot collide.
pub(crate) const FREEZE_SENTINEL: char = '\u{E001}';

static FREEZE_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\x{E001}(\d+)\x{E001}").unwrap());

// Markdown link destinations and bare URLs; both are handed to the engine
// verbatim rather than picked over by the passes.
static LINK_URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\]\(\s*[^)\s]+\s*\)").unwrap());
static BARE_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\bhttps?://[^\s<>"`]+"#).unwrap());

pub(crate) struct ExpandContext<'a> {
    pub helpers: &'a dyn Helpers,
    pub emoji: &'a EmojiMap,
    pub linkifiers: &'a LinkifierRegistry,
    pub math: &'a dyn MathRenderer,
    pub stash: &'a mut Stash,
}

/// Run every substitution pass over `text`, in order. Order matters: user
/// mentions must strip their `@**...**` syntax before the group pass sees
/// single asterisks, named emoji must go before the unicode scanner, and
/// linkifiers run last so built-in syntaxes take precedence.
pub(crate) fn expand(text: &str, ctx: &mut ExpandContext) -> String {
    let mut frozen = Vec::new();
    let mut text = freeze(text, &mut frozen);

    text = tex::expand_inline_math(&text, ctx);
    text = timestamp::expand_timestamps(&text, ctx);
    text = mention::expand_user_mentions(&text, ctx);
    text = mention::expand_group_mentions(&text, ctx);
    text = stream::expand_stream_links(&text, ctx);
    text = emoji::expand_emoticons(&text, ctx);
    text = emoji::expand_named_emoji(&text, ctx);
    text = emoji::expand_unicode_emoji(&text, ctx);
    text = linkifier::expand_linkifiers(&text, ctx);

    thaw(&text, &frozen)
}

/// Regex-driven search and replace where the callback can decline a match.
/// `None` leaves the matched text exactly as it was.
pub(crate) fn substitute<F>(text: &str, re: &Regex, mut f: F) -> String
where
    F: FnMut(&regex::Captures) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for caps in re.captures_iter(text) {
        let whole = caps.get(0).expect("capture 0 always exists");
        out.push_str(&text[last..whole.start()]);
        match f(&caps) {
            Some(replacement) => out.push_str(&replacement),
            None => out.push_str(whole.as_str()),
        }
        last = whole.end();
    }

    out.push_str(&text[last..]);
    out
}

fn freeze_token(text: &str, frozen: &mut Vec<String>) -> String {
    frozen.push(text.to_owned());
    format!("{FREEZE_SENTINEL}{}{FREEZE_SENTINEL}", frozen.len() - 1)
}

fn freeze(text: &str, frozen: &mut Vec<String>) -> String {
    let text = freeze_code_spans(text, frozen);
    let text = substitute(&text, &LINK_URL_RE, |caps| {
        Some(freeze_token(&caps[0], frozen))
    });
    substitute(&text, &BARE_URL_RE, |caps| {
        Some(freeze_token(&caps[0], frozen))
    })
}

fn thaw(text: &str, frozen: &[String]) -> String {
    FREEZE_TOKEN_RE
        .replace_all(text, |caps: &regex::Captures| {
            match caps[1].parse::<usize>().ok().and_then(|n| frozen.get(n)) {
                Some(original) => original.clone(),
                None => {
                    warn!("Unresolvable freeze token {} in message text.", &caps[0]);
                    String::new()
                }
            }
        })
        .into_owned()
}

/// Freeze inline code spans: a backtick run, content, and a closing run of
/// the same length. Unpaired runs stay live text.
fn freeze_code_spans(text: &str, frozen: &mut Vec<String>) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < bytes.len() {
        let Some(offset) = text[i..].find('`') else {
            out.push_str(&text[i..]);
            break;
        };
        let run_start = i + offset;
        out.push_str(&text[i..run_start]);

        let mut run_end = run_start;
        while run_end < bytes.len() && bytes[run_end] == b'`' {
            run_end += 1;
        }
        let run_len = run_end - run_start;

        match find_closing_run(bytes, run_end, run_len) {
            Some(close) => {
                let span = &text[run_start..close + run_len];
                out.push_str(&freeze_token(span, frozen));
                i = close + run_len;
            }
            None => {
                out.push_str(&text[run_start..run_end]);
                i = run_end;
            }
        }
    }

    out
}

fn find_closing_run(bytes: &[u8], from: usize, len: usize) -> Option<usize> {
    let mut i = from;
    while i < bytes.len() {
        if bytes[i] == b'`' {
            let start = i;
            while i < bytes.len() && bytes[i] == b'`' {
                i += 1;
            }
            if i - start == len {
                return Some(start);
            }
        } else {
            i += 1;
        }
    }
    None
}


#[cfg(test)]
mod tests {
    use super::testing::TestRig;
    use super::*;

    #[test]
    fn code_spans_are_left_alone() {
        let rig = TestRig::new();
        assert_eq!(rig.expand("see `@**Bob**` here"), "see `@**Bob**` here");
    }

    #[test]
    fn double_backtick_spans_may_contain_backticks() {
        let rig = TestRig::new();
        assert_eq!(rig.expand("`` ` :smile: ``"), "`` ` :smile: ``");
    }

    #[test]
    fn unpaired_backtick_is_live_text() {
        let rig = TestRig::new();
        let out = rig.expand("a ` b :smile: c");
        assert!(out.contains("emoji"));
        assert!(out.starts_with("a ` b"));
    }

    #[test]
    fn link_destinations_are_not_linkified() {
        let rig = TestRig::new();
        let out = rig.expand("[PR](https://example.com/#123)");
        assert_eq!(out, "[PR](https://example.com/#123)");
    }

    #[test]
    fn bare_urls_are_not_picked_over() {
        let rig = TestRig::new();
        let out = rig.expand("see https://example.com/#123 now");
        assert_eq!(out, "see https://example.com/#123 now");
    }
}
