//! Emoji passes: emoticon translation, `:name:` shortcodes, and literal
//! unicode emoji.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::render::escape_html_text;

use super::{substitute, ExpandContext};

static NAMED_EMOJI_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r":([A-Za-z0-9_+-]+):").unwrap());

const EMOTICON_CONVERSIONS: &[(&str, &str)] = &[
    (":)", "smile"),
    ("(:", "smile"),
    (":(", "frown"),
    ("<3", "heart"),
    (":|", "neutral"),
    (":/", "confused"),
];

// One pattern per emoticon; built once. The trailing whitespace boundary
// is checked by hand rather than consumed, so `:) :)` translates both.
static EMOTICON_RES: Lazy<Vec<(Regex, &str)>> = Lazy::new(|| {
    EMOTICON_CONVERSIONS
        .iter()
        .map(|(emoticon, name)| {
            let pattern = format!(r"(?m)(^|\s){}", regex::escape(emoticon));
            (Regex::new(&pattern).expect("emoticon patterns are static"), *name)
        })
        .collect()
});

/// Rewrite emoticons to `:name:` shortcodes, which the named pass then
/// resolves. Gated on the viewer's preference.
pub(crate) fn expand_emoticons(text: &str, ctx: &mut ExpandContext) -> String {
    if !ctx.helpers.should_translate_emoticons() {
        return text.to_owned();
    }

    let mut text = text.to_owned();
    for (re, name) in EMOTICON_RES.iter() {
        let src = text;
        text = substitute(&src, re, |caps| {
            let whole = caps.get(0).expect("capture 0 always exists");
            let bounded = src[whole.end()..]
                .chars()
                .next()
                .map_or(true, char::is_whitespace);
            if !bounded {
                return None;
            }
            Some(format!("{}:{name}:", &caps[1]))
        });
    }
    text
}

pub(crate) fn expand_named_emoji(text: &str, ctx: &mut ExpandContext) -> String {
    substitute(text, &NAMED_EMOJI_RE, |caps| {
        let name = &caps[1];
        let html = if let Some(url) = ctx.emoji.realm_url(name) {
            render_realm_img(name, url)
        } else {
            let codepoint = ctx.emoji.codepoint_for_name(name)?;
            render_unicode_span(name, codepoint)
        };
        Some(ctx.stash.stash(html, false))
    })
}

/// Replace literal unicode emoji characters in the text. Realm emoji of the
/// same name shadow the unicode rendering here too.
pub(crate) fn expand_unicode_emoji(text: &str, ctx: &mut ExpandContext) -> String {
    let Some(re) = ctx.emoji.literal_regex() else {
        return text.to_owned();
    };

    substitute(text, re, |caps| {
        let name = ctx.emoji.name_for_literal(&caps[0])?.to_owned();
        let html = if let Some(url) = ctx.emoji.realm_url(&name) {
            render_realm_img(&name, url)
        } else {
            let codepoint = ctx.emoji.codepoint_for_name(&name)?;
            render_unicode_span(&name, codepoint)
        };
        Some(ctx.stash.stash(html, false))
    })
}

/// Emoji titles are the name with underscores opened up.
fn title_of(name: &str) -> String {
    name.replace('_', " ")
}

fn render_realm_img(name: &str, url: &str) -> String {
    let title = escape_html_text(&title_of(name));
    format!(
        r#"<img alt=":{name}:" class="emoji" src="{}" title="{title}">"#,
        escape_html_text(url)
    )
}

fn render_unicode_span(name: &str, codepoint: &str) -> String {
    let title = escape_html_text(&title_of(name));
    format!(
        r#"<span aria-label="{title}" class="emoji emoji-{codepoint}" role="img" title="{title}">:{name}:</span>"#
    )
}
