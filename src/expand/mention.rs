//! User and group mention passes.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::helpers::UserId;
use crate::render::escape_html_text;

use super::{substitute, ExpandContext};

// Mentions must start the text or follow a non-word character; `a@**x**`
// stays literal so email addresses never mention anyone.
static USER_MENTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)(^|\W)@(_?)\*\*([^*\n]+)\*\*").unwrap());

static GROUP_MENTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)(^|\W)@(_?)\*([^*\n]+)\*").unwrap());

const WILDCARDS: &[&str] = &["all", "everyone", "stream"];

pub(crate) fn expand_user_mentions(text: &str, ctx: &mut ExpandContext) -> String {
    substitute(text, &USER_MENTION_RE, |caps| {
        let silent = !caps[2].is_empty();
        let html = render_user_mention(ctx, silent, caps[3].trim())?;
        Some(format!("{}{}", &caps[1], ctx.stash.stash(html, false)))
    })
}

/// Must run after the user pass: by then every `@**...**` has been consumed,
/// so a single-asterisk match really is a group mention.
pub(crate) fn expand_group_mentions(text: &str, ctx: &mut ExpandContext) -> String {
    substitute(text, &GROUP_MENTION_RE, |caps| {
        let silent = !caps[2].is_empty();
        let group = ctx.helpers.user_group_by_name(caps[3].trim())?;

        let class = if silent {
            "user-group-mention silent"
        } else {
            "user-group-mention"
        };
        let label = if silent {
            group.name.clone()
        } else {
            format!("@{}", group.name)
        };
        let html = format!(
            r#"<span class="{class}" data-user-group-id="{}">{}</span>"#,
            group.id,
            escape_html_text(&label)
        );
        Some(format!("{}{}", &caps[1], ctx.stash.stash(html, false)))
    })
}

fn render_user_mention(ctx: &ExpandContext, silent: bool, token: &str) -> Option<String> {
    if WILDCARDS.contains(&token) {
        return Some(render_span(silent, "*", token));
    }

    let (id, name) = parse_token(ctx, token)?;
    Some(render_span(silent, &id.to_string(), &name))
}

/// Resolve a mention token to a user. Accepted forms: `name|id` (jointly
/// validated, rendered with the canonical name), `|id`, and a bare name.
fn parse_token(ctx: &ExpandContext, token: &str) -> Option<(UserId, String)> {
    if let Some((name, id_str)) = token.rsplit_once('|') {
        if let Ok(id) = id_str.trim().parse::<UserId>() {
            let name = name.trim();
            if !name.is_empty() && !ctx.helpers.is_valid_full_name_and_user_id(name, id) {
                return None;
            }
            return ctx.helpers.user_full_name(id).map(|full| (id, full));
        }
        // A pipe without a numeric id is just part of the name.
    }

    let id = ctx.helpers.user_id_for_full_name(token)?;
    let full = ctx.helpers.user_full_name(id)?;
    Some((id, full))
}

fn render_span(silent: bool, id: &str, name: &str) -> String {
    let class = if silent {
        "user-mention silent"
    } else {
        "user-mention"
    };
    let label = if silent {
        name.to_owned()
    } else {
        format!("@{name}")
    };
    format!(
        r#"<span class="{class}" data-user-id="{id}">{}</span>"#,
        escape_html_text(&label)
    )
}
