//! Realm and unicode emoji tables.
//!
//! The surrounding application normally supplies these tables from server
//! data; `with_builtin` loads a reasonable default set from the `emojis`
//! crate for standalone use. Realm emoji always shadow unicode emoji of the
//! same name.

use ahash::AHashMap;
use itertools::Itertools;
use regex::Regex;

use crate::prelude::*;

#[derive(Debug, Clone)]
struct UnicodeEmoji {
    literal: String,
    /// Hyphen-joined hex codepoints, e.g. `1f604`; used in the emoji span's
    /// CSS class.
    codepoint: String,
}

#[derive(Debug, Default)]
pub struct EmojiMap {
    by_name: AHashMap<String, UnicodeEmoji>,
    name_by_literal: AHashMap<String, String>,
    realm_by_name: AHashMap<String, String>,
    literal_re: Option<Regex>,
}

impl EmojiMap {
    pub fn new() -> Self {
        EmojiMap::default()
    }

    /// Table seeded from the `emojis` crate's shortcode data.
    pub fn with_builtin() -> Self {
        let mut map = EmojiMap::new();
        for emoji in emojis::iter() {
            let mut shortcodes = emoji.shortcodes().peekable();
            let primary = match shortcodes.peek() {
                Some(name) => (*name).to_owned(),
                None => continue,
            };
            map.name_by_literal
                .insert(emoji.as_str().to_owned(), primary);
            for name in emoji.shortcodes() {
                map.add_unicode_emoji(name, emoji.as_str());
            }
        }
        map
    }

    pub fn add_unicode_emoji(&mut self, name: &str, literal: &str) {
        let codepoint = literal
            .chars()
            .map(|c| format!("{:x}", c as u32))
            .join("-");
        self.name_by_literal
            .entry(literal.to_owned())
            .or_insert_with(|| name.to_owned());
        self.by_name.insert(
            name.to_owned(),
            UnicodeEmoji {
                literal: literal.to_owned(),
                codepoint,
            },
        );
        // A stale scanner would miss the new literal.
        self.literal_re = None;
    }

    pub fn add_realm_emoji(&mut self, name: &str, url: &str) {
        self.realm_by_name.insert(name.to_owned(), url.to_owned());
        self.literal_re = None;
    }

    pub fn realm_url(&self, name: &str) -> Option<&str> {
        self.realm_by_name.get(name).map(String::as_str)
    }

    pub fn codepoint_for_name(&self, name: &str) -> Option<&str> {
        self.by_name.get(name).map(|e| e.codepoint.as_str())
    }

    pub fn name_for_literal(&self, literal: &str) -> Option<&str> {
        self.name_by_literal.get(literal).map(String::as_str)
    }

    /// Compile the scanner that finds emoji literals in message text.
    /// Longer literals are tried first so multi-codepoint sequences win over
    /// their prefixes.
    pub(crate) fn compile(&mut self) {
        if self.literal_re.is_some() || self.name_by_literal.is_empty() {
            return;
        }
        let alternation = self
            .name_by_literal
            .keys()
            .sorted_by_key(|literal| std::cmp::Reverse(literal.len()))
            .map(|literal| regex::escape(literal))
            .join("|");
        match Regex::new(&alternation) {
            Ok(re) => self.literal_re = Some(re),
            // Escaped literals should always compile; an oversized table is
            // the only realistic way to land here.
            Err(e) => warn!("Could not compile unicode emoji scanner: {e}"),
        }
    }

    pub(crate) fn literal_regex(&self) -> Option<&Regex> {
        self.literal_re.as_ref()
    }
}
