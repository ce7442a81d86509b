//! Opaque placeholders for finished HTML.
//!
//! The substitution passes and the fence processor produce final HTML long
//! before the Markdown engine runs. Splicing that HTML straight into the
//! source would invite the engine to re-escape or re-parse it, so each
//! fragment is parked here and replaced by a sentinel token the engine
//! treats as ordinary text. Tokens are resolved back into HTML at the
//! output stage, each one exactly once.

use ahash::AHashMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::prelude::*;

// Private-use character; stripped from raw input before the pipeline runs
// so a typed token cannot alias a stash key, and passes through HTML
// escaping untouched.
pub(crate) const SENTINEL: char = '\u{E000}';

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\x{E000}(\d+)\x{E000}").unwrap());

#[derive(Debug)]
struct Entry {
    html: String,
    /// Block-level fragments get their paragraph wrapper dropped at render
    /// time; inline fragments stay embedded in surrounding text.
    block: bool,
}

#[derive(Debug, Default)]
pub struct Stash {
    entries: AHashMap<usize, Entry>,
    next: usize,
}

impl Stash {
    pub fn new() -> Self {
        Stash::default()
    }

    /// Park `html` and return the sentinel token standing in for it.
    pub fn stash(&mut self, html: impl Into<String>, block: bool) -> String {
        let key = self.next;
        self.next += 1;
        self.entries.insert(
            key,
            Entry {
                html: html.into(),
                block,
            },
        );
        format!("{SENTINEL}{key}{SENTINEL}")
    }

    /// Whether `text` consists solely of block-level tokens and whitespace.
    pub fn is_block_only(&self, text: &str) -> bool {
        let mut found = false;
        let stripped = TOKEN_RE.replace_all(text, |caps: &regex::Captures| {
            found = true;
            let block = caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|key| self.entries.get(&key))
                .is_some_and(|entry| entry.block);
            if block { "" } else { "\u{FFFD}" }.to_owned()
        });
        found && stripped.trim().is_empty()
    }

    /// Replace every token in `text` with its parked HTML.
    pub fn unstash(&self, text: &str) -> String {
        TOKEN_RE
            .replace_all(text, |caps: &regex::Captures| {
                match caps[1]
                    .parse::<usize>()
                    .ok()
                    .and_then(|key| self.entries.get(&key))
                {
                    Some(entry) => entry.html.clone(),
                    None => {
                        warn!("Unresolvable stash token {} in rendered output.", &caps[0]);
                        String::new()
                    }
                }
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let mut stash = Stash::new();
        let token = stash.stash("<b>hi</b>", false);
        assert!(!token.contains('<'));
        assert_eq!(stash.unstash(&format!("a {token} b")), "a <b>hi</b> b");
    }

    #[test]
    fn block_detection() {
        let mut stash = Stash::new();
        let block = stash.stash("<div></div>", true);
        let inline = stash.stash("<span></span>", false);

        assert!(stash.is_block_only(&format!("  {block}  ")));
        assert!(!stash.is_block_only(&inline));
        assert!(!stash.is_block_only(&format!("{block} trailing words")));
        assert!(!stash.is_block_only("no tokens here"));
    }

    #[test]
    fn plain_text_is_untouched() {
        let stash = Stash::new();
        assert_eq!(stash.unstash("nothing stashed"), "nothing stashed");
    }
}
