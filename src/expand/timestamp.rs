//! Global timestamp pass: `<time:...>` markers.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::render::escape_html_text;

use super::{substitute, ExpandContext};

static TIMESTAMP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<time:([^>]*)>").unwrap());

pub(crate) fn expand_timestamps(text: &str, ctx: &mut ExpandContext) -> String {
    substitute(text, &TIMESTAMP_RE, |caps| {
        let arg = caps[1].trim();
        let escaped = escape_html_text(arg);

        // Unparseable arguments still consume the marker; a bare span beats
        // leaking `<time:...>` as bogus inline HTML.
        let html = match parse_timestamp(arg) {
            Some(instant) => format!(
                r#"<time datetime="{}">{escaped}</time>"#,
                instant.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
            None => format!("<span>{escaped}</span>"),
        };

        Some(ctx.stash.stash(html, false))
    })
}

/// Accepted forms: integer Unix seconds, RFC 3339, and a few dateless or
/// zoneless ISO shapes (interpreted as UTC).
fn parse_timestamp(arg: &str) -> Option<DateTime<Utc>> {
    if !arg.is_empty() && arg.chars().all(|c| c.is_ascii_digit()) {
        return arg
            .parse::<i64>()
            .ok()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
    }

    if let Ok(instant) = DateTime::parse_from_rfc3339(arg) {
        return Some(instant.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(arg, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(arg, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}
