//! Source-dialect to host-dialect pattern translation.
//!
//! Linkifier definitions arrive in a Python-flavored dialect: named capture
//! groups (`(?P<name>...)`), inline flag markers (`(?im)`), and URL
//! templates with `%(name)s` placeholders. The host engine only has
//! positional captures, so each named group becomes a plain group and each
//! placeholder becomes a `\N` back-reference keyed by the group's position
//! in the pattern. The rewrite is deliberately textual; the quirks of this
//! translation (including silently dropping unsupported flags) are part of
//! the compatibility contract with the server-side dialect, so a cleaner
//! re-parse is off the table.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::prelude::*;

static NAMED_GROUP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\?P<([^>]+?)>").unwrap());
static INLINE_FLAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\?([Limsux]+)\)").unwrap());

#[derive(Debug)]
pub(crate) struct Translated {
    pub regex: fancy_regex::Regex,
    /// Translated pattern source, including the trailing guard and any flag
    /// prefix; kept for building the local-echo eligibility pattern.
    pub source: String,
    /// URL template with positional `\N` back-references.
    pub url_template: String,
}

/// Translate one linkifier definition into a host pattern and a positional
/// URL template.
pub(crate) fn translate(pattern: &str, url_format: &str) -> Result<Translated> {
    let mut pattern = pattern.to_owned();
    let mut url = url_format.to_owned();

    // Named groups are numbered by their position in the pattern, not by
    // the order their names appear in the template.
    let mut current_group = 1;
    while let Some(caps) = NAMED_GROUP_RE.captures(&pattern) {
        let name = caps[1].to_owned();
        let marker = caps.get(0).expect("capture 0 always exists").range();
        pattern.replace_range(marker, "(");
        url = url.replace(&format!("%({name})s"), &format!("\\{current_group}"));
        current_group += 1;
    }

    // Only case-insensitivity and multiline survive the dialect crossing;
    // the rest of the flag letters are dropped.
    let mut flags = String::new();
    if let Some(caps) = INLINE_FLAG_RE.captures(&pattern) {
        for flag in caps[1].chars() {
            if flag == 'i' || flag == 'm' {
                flags.push(flag);
            }
        }
        let marker = caps.get(0).expect("capture 0 always exists").range();
        pattern.replace_range(marker, "");
    }

    // Trailing guard: a linkifier for `ABC-\d+` must not fire inside
    // `ABC-1234x`. Matching is run with `captures_iter`, which covers the
    // source dialect's implicit global flag.
    let mut source = String::new();
    if !flags.is_empty() {
        source.push_str(&format!("(?{flags})"));
    }
    source.push_str(&pattern);
    source.push_str(r"(?!\w)");

    let regex = fancy_regex::Regex::new(&source)
        .map_err(|e| eyre!(e).wrap_err(format!("Pattern {pattern:?} is invalid in the host regex dialect.")))?;

    Ok(Translated {
        regex,
        source,
        url_template: url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_named_group() {
        let t = translate(r"ABC-(?P<id>\d+)", "https://x/%(id)s").unwrap();
        assert_eq!(t.url_template, r"https://x/\1");
        assert_eq!(t.source, r"ABC-(\d+)(?!\w)");
    }

    #[test]
    fn groups_numbered_by_pattern_order() {
        let t = translate(
            r"(?P<org>[a-z]+)/(?P<repo>[a-z]+)#(?P<id>\d+)",
            "https://github.com/%(org)s/%(repo)s/issues/%(id)s",
        )
        .unwrap();
        assert_eq!(t.url_template, r"https://github.com/\1/\2/issues/\3");
    }

    #[test]
    fn template_order_does_not_matter() {
        let t = translate(
            r"(?P<a>x)(?P<b>y)",
            "%(b)s-%(a)s",
        )
        .unwrap();
        assert_eq!(t.url_template, r"\2-\1");
    }

    #[test]
    fn supported_flags_are_mapped_and_others_dropped() {
        let t = translate(r"(?iLx)abc", "https://x/").unwrap();
        assert_eq!(t.source, r"(?i)abc(?!\w)");
        assert!(t.regex.is_match("ABC").unwrap());
    }

    #[test]
    fn zero_named_groups_is_valid() {
        let t = translate("JIRA", "https://jira/").unwrap();
        assert_eq!(t.source, r"JIRA(?!\w)");
        assert_eq!(t.url_template, "https://jira/");
    }

    #[test]
    fn dangling_placeholder_is_left_alone() {
        let t = translate(r"ABC-(?P<id>\d+)", "https://x/%(id)s/%(missing)s").unwrap();
        assert_eq!(t.url_template, r"https://x/\1/%(missing)s");
    }

    #[test]
    fn invalid_host_pattern_is_an_error() {
        assert!(translate(r"ABC-(?P<id>\d+", "https://x/%(id)s").is_err());
    }

    #[test]
    fn trailing_guard_blocks_word_continuation() {
        let t = translate(r"ABC-(?P<id>\d+)", "https://x/%(id)s").unwrap();
        assert!(t.regex.is_match("fixed in ABC-1234 today").unwrap());
        assert!(!t.regex.is_match("ABC-1234x").unwrap());
    }
}
