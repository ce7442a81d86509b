//! Server-configured linkifier rules.
//!
//! The server pushes an ordered list of pattern/URL-template definitions
//! whenever realm configuration changes. The registry translates each one
//! into the host regex dialect and swaps the whole rule set in atomically;
//! readers always observe either the old snapshot or the new one, never a
//! partially rebuilt registry. Definitions that fail translation are logged
//! and dropped without affecting the rest of the rebuild.

mod translate;

use std::sync::Arc;

use arc_swap::ArcSwap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::prelude::*;

use self::translate::translate;

static BACKREF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\(\d+)").unwrap());

/// A linkifier definition as supplied by the server: a source-dialect
/// pattern with optional named groups, and a URL template with `%(name)s`
/// placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LinkifierDef {
    pub pattern: String,
    pub url_format: String,
}

/// A successfully translated rule. Every rule in the registry has already
/// compiled; translation failures never get this far.
#[derive(Debug)]
pub struct Linkifier {
    pub pattern: fancy_regex::Regex,
    /// URL template with positional `\N` back-references.
    pub url_template: String,
    /// Enriched pattern used by the local-echo eligibility check: the
    /// translated pattern with a leading negative-context character class.
    /// `None` if the enrichment itself failed to compile.
    pub(crate) echo_guard: Option<fancy_regex::Regex>,
}

impl Linkifier {
    /// Substitute captured groups into the URL template, left to right.
    /// Back-references to groups that did not participate substitute the
    /// empty string; unresolved `%(name)s` placeholders pass through
    /// untouched.
    pub fn build_url(&self, caps: &fancy_regex::Captures) -> String {
        BACKREF_RE
            .replace_all(&self.url_template, |backref: &regex::Captures| {
                backref[1]
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| caps.get(n))
                    .map(|m| m.as_str().to_owned())
                    .unwrap_or_default()
            })
            .into_owned()
    }
}

/// A link extracted from a message topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicLink {
    pub text: String,
    pub url: String,
}

#[derive(Debug, Default)]
pub struct LinkifierRegistry {
    rules: ArcSwap<Vec<Linkifier>>,
}

impl LinkifierRegistry {
    pub fn new() -> Self {
        LinkifierRegistry::default()
    }

    /// Replace the active rule set wholesale. Input order is preserved;
    /// definitions that fail translation are skipped.
    pub fn rebuild(&self, definitions: &[LinkifierDef]) {
        let mut rules = Vec::with_capacity(definitions.len());

        for def in definitions {
            match translate(&def.pattern, &def.url_format) {
                Ok(translated) => {
                    let enriched = format!("[^\\s\"'(,:<]{}", translated.source);
                    let echo_guard = fancy_regex::Regex::new(&enriched).ok();
                    rules.push(Linkifier {
                        pattern: translated.regex,
                        url_template: translated.url_template,
                        echo_guard,
                    });
                }
                Err(e) => {
                    warn!("Dropping linkifier {:?}: {e}", def.pattern);
                }
            }
        }

        debug!(
            "Linkifier registry rebuilt with {} of {} definitions.",
            rules.len(),
            definitions.len()
        );
        self.rules.store(Arc::new(rules));
    }

    /// Current snapshot of the active rules, in definition order.
    pub fn all(&self) -> Arc<Vec<Linkifier>> {
        self.rules.load_full()
    }

    /// Apply every active rule to a topic string, collecting matches in
    /// positional order.
    pub fn topic_links(&self, topic: &str) -> Vec<TopicLink> {
        let mut links: Vec<(usize, TopicLink)> = Vec::new();

        for rule in self.all().iter() {
            for caps in rule.pattern.captures_iter(topic) {
                let caps = match caps {
                    Ok(caps) => caps,
                    Err(e) => {
                        warn!("Linkifier match failed on topic text: {e}");
                        break;
                    }
                };
                let whole = match caps.get(0) {
                    Some(m) => m,
                    None => continue,
                };
                links.push((
                    whole.start(),
                    TopicLink {
                        text: whole.as_str().to_owned(),
                        url: rule.build_url(&caps),
                    },
                ));
            }
        }

        links.sort_by_key(|(start, _)| *start);
        links.into_iter().map(|(_, link)| link).collect()
    }
}
