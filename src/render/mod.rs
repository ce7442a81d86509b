//! The rendering engine: ties the fence pre-pass, the substitution passes,
//! and the Markdown parser together into `apply_markdown`.
//!
//! The dialect deliberately diverges from stock CommonMark in a few places:
//! no setext headings, no autolinking, no underscore emphasis, and soft
//! line breaks are hard breaks. The parser has no switches for any of
//! those, so the event stream is filtered instead: offending constructs are
//! re-emitted as literal text, everything else passes through to the HTML
//! writer.

mod rewrite;

use std::ops::Range;

use once_cell::sync::Lazy;
use pulldown_cmark::escape::escape_html;
use pulldown_cmark::{html, CodeBlockKind, CowStr, Event, LinkType, Options, Parser, Tag};
use regex::Regex;

use crate::emoji::EmojiMap;
use crate::expand::{self, ExpandContext};
use crate::fenced;
use crate::helpers::Helpers;
use crate::linkifier::{LinkifierDef, LinkifierRegistry};
use crate::math::MathRenderer;
use crate::message::Message;
use crate::prelude::*;
use crate::stash::{self, Stash};

// Message shapes the local renderer cannot reproduce: previewable media and
// embeds are generated server-side only.
static BACKEND_ONLY_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?m)\S*(?:\.bmp|\.gif|\.jpg|\.jpeg|\.png|\.webp|\.mp4|\.webm)\)?(\s|$)")
            .unwrap(),
        Regex::new(r"\S*(?:twitter|youtube)\.com/\S*").unwrap(),
    ]
});

static USER_MENTION_SPAN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<span class="user-mention( silent)?" data-user-id="(\*|\d+)">"#).unwrap()
});

static GROUP_MENTION_SPAN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<span class="user-group-mention( silent)?" data-user-group-id="(\d+)">"#)
        .unwrap()
});

pub(crate) fn escape_html_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // Writing into a String cannot fail.
    let _ = escape_html(&mut out, text);
    out
}

pub struct MarkdownEngine {
    helpers: Box<dyn Helpers>,
    emoji: EmojiMap,
    math: Box<dyn MathRenderer>,
    linkifiers: LinkifierRegistry,
}

impl MarkdownEngine {
    pub fn new(
        helpers: Box<dyn Helpers>,
        mut emoji: EmojiMap,
        math: Box<dyn MathRenderer>,
        linkifier_defs: &[LinkifierDef],
    ) -> Self {
        emoji.compile();
        let linkifiers = LinkifierRegistry::new();
        linkifiers.rebuild(linkifier_defs);

        MarkdownEngine {
            helpers,
            emoji,
            math,
            linkifiers,
        }
    }

    /// Swap in a new linkifier rule set, e.g. after a realm config event.
    pub fn rebuild_linkifiers(&self, definitions: &[LinkifierDef]) {
        self.linkifiers.rebuild(definitions);
    }

    pub fn linkifiers(&self) -> &LinkifierRegistry {
        &self.linkifiers
    }

    /// Swap in a new emoji table, e.g. after a realm emoji event.
    pub fn update_emoji(&mut self, mut emoji: EmojiMap) {
        emoji.compile();
        self.emoji = emoji;
    }

    /// Render `message.raw_content` to HTML and set the derived fields
    /// (`content`, the mention flags, `is_me_message`). Never fails: every
    /// fallible collaborator degrades to a local fallback rendering.
    pub fn apply_markdown(&self, message: &mut Message) {
        message.is_me_message = message.raw_content.starts_with("/me ");

        // The placeholder sentinels are reserved; a typed occurrence could
        // alias a stash key and duplicate its HTML at resolution time.
        let raw = message
            .raw_content
            .replace([stash::SENTINEL, expand::FREEZE_SENTINEL], "");

        let mut stash = Stash::new();
        let fenced = fenced::process(&raw, &mut stash, self.math.as_ref());
        let expanded = {
            let mut ctx = ExpandContext {
                helpers: self.helpers.as_ref(),
                emoji: &self.emoji,
                linkifiers: &self.linkifiers,
                math: self.math.as_ref(),
                stash: &mut stash,
            };
            expand::expand(&fenced, &mut ctx)
        };
        let html = self.to_html(&expanded, &stash);

        self.set_message_flags(&html, message);
        message.content = html;
    }

    /// Whether `content` uses syntax the local renderer cannot reproduce
    /// faithfully, in which case echoing should wait for the authoritative
    /// server rendering.
    pub fn contains_backend_only_syntax(&self, content: &str) -> bool {
        if BACKEND_ONLY_RES.iter().any(|re| re.is_match(content)) {
            return true;
        }

        // A linkifier match jammed against other text renders differently
        // server-side; treat the engine erroring out the same way.
        self.linkifiers.all().iter().any(|rule| match &rule.echo_guard {
            Some(re) => re.is_match(content).unwrap_or(true),
            None => false,
        })
    }

    fn to_html(&self, source: &str, stash: &Stash) -> String {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);

        let mut root: Vec<Event> = Vec::new();
        let mut quotes: Vec<Vec<Event>> = Vec::new();
        let mut para: Option<Vec<Event>> = None;
        let mut code: Option<(String, String)> = None;
        let mut skip: Option<(SkipKind, usize)> = None;

        for (event, range) in Parser::new_ext(source, options).into_offset_iter() {
            // Inside a skipped construct everything is dropped; the literal
            // source text already went out when the skip started.
            if let Some((kind, mut depth)) = skip {
                match &event {
                    Event::Start(tag) if skip_kind(tag) == Some(kind) => depth += 1,
                    Event::End(tag) if skip_kind(tag) == Some(kind) => depth -= 1,
                    _ => {}
                }
                skip = (depth > 0).then_some((kind, depth));
                continue;
            }

            if let Some((_, text)) = code.as_mut() {
                match event {
                    Event::Text(t) => text.push_str(&t),
                    Event::End(Tag::CodeBlock(_)) => {
                        let (lang, text) = code.take().expect("code buffer is active");
                        let html = format!("{}\n", fenced::wrap_code(&text, &lang));
                        sink(&mut para, &mut quotes, &mut root).push(Event::Html(html.into()));
                    }
                    _ => {}
                }
                continue;
            }

            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    let lang = match kind {
                        CodeBlockKind::Fenced(info) => {
                            info.split_whitespace().next().unwrap_or("").to_owned()
                        }
                        CodeBlockKind::Indented => String::new(),
                    };
                    code = Some((lang, String::new()));
                }
                // Setext headings are not part of the dialect; ATX are.
                Event::Start(Tag::Heading(..)) if is_setext(source, &range) => {
                    emit_literal(source, &range, &mut para, &mut quotes, &mut root);
                    skip = Some((SkipKind::Heading, 1));
                }
                // Angle-bracket autolinks are disabled.
                Event::Start(Tag::Link(LinkType::Autolink | LinkType::Email, ..)) => {
                    emit_literal(source, &range, &mut para, &mut quotes, &mut root);
                    skip = Some((SkipKind::Link, 1));
                }
                // Underscore emphasis is disabled; `_` is too common in
                // identifiers and snake_case prose.
                Event::Start(ref tag @ (Tag::Emphasis | Tag::Strong))
                    if source.as_bytes().get(range.start) == Some(&b'_') =>
                {
                    let kind = skip_kind(tag).expect("emphasis tags have a skip kind");
                    emit_literal(source, &range, &mut para, &mut quotes, &mut root);
                    skip = Some((kind, 1));
                }
                Event::Start(Tag::Paragraph) => para = Some(Vec::new()),
                Event::End(Tag::Paragraph) => {
                    let events = para.take().unwrap_or_default();
                    flush_paragraph(events, quotes.last_mut().unwrap_or(&mut root), stash);
                }
                Event::Start(Tag::BlockQuote) => quotes.push(Vec::new()),
                Event::End(Tag::BlockQuote) => {
                    let inner = quotes.pop().expect("blockquote stack is non-empty");
                    let html = self.render_quote(inner, stash);
                    quotes
                        .last_mut()
                        .unwrap_or(&mut root)
                        .push(Event::Html(html.into()));
                }
                // Newlines within a paragraph are real breaks.
                Event::SoftBreak => {
                    sink(&mut para, &mut quotes, &mut root).push(Event::HardBreak)
                }
                // Raw HTML in message text is always escaped.
                Event::Html(text) => {
                    sink(&mut para, &mut quotes, &mut root).push(Event::Text(text))
                }
                event => sink(&mut para, &mut quotes, &mut root).push(event),
            }
        }

        let mut out = String::new();
        html::push_html(&mut out, root.into_iter());
        stash.unstash(&out)
    }

    /// Quoted content renders normally, then has its mentions silenced so a
    /// quote of "@Bob fix this" does not re-ping Bob.
    fn render_quote(&self, events: Vec<Event>, stash: &Stash) -> String {
        let mut inner = String::new();
        html::push_html(&mut inner, events.into_iter());
        let inner = stash.unstash(&inner);

        let inner = match rewrite::silence_mentions(&inner) {
            Ok(silenced) => silenced,
            Err(e) => {
                warn!("Could not silence mentions in quoted block: {e}");
                inner
            }
        };

        format!("<blockquote>\n{inner}</blockquote>\n")
    }

    /// Mention flags come from a scan of the final HTML, so mentions inside
    /// blockquotes (silenced by then) never count.
    fn set_message_flags(&self, html: &str, message: &mut Message) {
        message.mentioned = false;
        message.mentioned_me_directly = false;

        let me = self.helpers.my_user_id();
        for caps in USER_MENTION_SPAN_RE.captures_iter(html) {
            if caps.get(1).is_some() {
                continue;
            }
            match &caps[2] {
                "*" => message.mentioned = true,
                id => {
                    if id.parse().ok() == Some(me) {
                        message.mentioned = true;
                        message.mentioned_me_directly = true;
                    }
                }
            }
        }

        for caps in GROUP_MENTION_SPAN_RE.captures_iter(html) {
            if caps.get(1).is_some() {
                continue;
            }
            let member = caps[2]
                .parse()
                .ok()
                .is_some_and(|group| self.helpers.is_member_of_group(me, group));
            if member {
                message.mentioned = true;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipKind {
    Heading,
    Emphasis,
    Strong,
    Link,
}

fn skip_kind(tag: &Tag) -> Option<SkipKind> {
    match tag {
        Tag::Heading(..) => Some(SkipKind::Heading),
        Tag::Emphasis => Some(SkipKind::Emphasis),
        Tag::Strong => Some(SkipKind::Strong),
        Tag::Link(..) => Some(SkipKind::Link),
        _ => None,
    }
}

fn is_setext(source: &str, range: &Range<usize>) -> bool {
    !source[range.clone()].trim_start().starts_with('#')
}

fn sink<'s, 'a>(
    para: &'s mut Option<Vec<Event<'a>>>,
    quotes: &'s mut Vec<Vec<Event<'a>>>,
    root: &'s mut Vec<Event<'a>>,
) -> &'s mut Vec<Event<'a>> {
    match para.as_mut() {
        Some(buf) => buf,
        None => quotes.last_mut().unwrap_or(root),
    }
}

fn emit_literal<'a>(
    source: &'a str,
    range: &Range<usize>,
    para: &mut Option<Vec<Event<'a>>>,
    quotes: &mut Vec<Vec<Event<'a>>>,
    root: &mut Vec<Event<'a>>,
) {
    sink(para, quotes, root).push(Event::Text(CowStr::Borrowed(&source[range.clone()])));
}

/// A paragraph holding nothing but block-level placeholders sheds its `<p>`
/// wrapper; a code block must not end up inside a paragraph.
fn flush_paragraph<'a>(events: Vec<Event<'a>>, out: &mut Vec<Event<'a>>, stash: &Stash) {
    if let [Event::Text(text)] = events.as_slice() {
        if stash.is_block_only(text) {
            out.push(Event::Html(format!("{}\n", text.trim()).into()));
            return;
        }
    }

    out.push(Event::Start(Tag::Paragraph));
    out.extend(events);
    out.push(Event::End(Tag::Paragraph));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::testing::TestHelpers;
    use crate::math::testing::TestMathRenderer;

    fn engine() -> MarkdownEngine {
        let mut emoji = EmojiMap::new();
        emoji.add_unicode_emoji("smile", "\u{1F604}");

        MarkdownEngine::new(
            Box::new(TestHelpers::standard()),
            emoji,
            Box::new(TestMathRenderer),
            &[LinkifierDef {
                pattern: r"#(?P<id>\d+)".to_owned(),
                url_format: "https://github.com/zulip/zulip/pull/%(id)s".to_owned(),
            }],
        )
    }

    fn render(raw: &str) -> Message {
        let mut message = Message::new(raw);
        engine().apply_markdown(&mut message);
        message
    }

    #[test]
    fn plain_paragraph() {
        assert_eq!(render("hello world").content, "<p>hello world</p>\n");
    }

    #[test]
    fn newlines_are_hard_breaks() {
        assert_eq!(
            render("line one\nline two").content,
            "<p>line one<br />\nline two</p>\n"
        );
    }

    #[test]
    fn asterisk_emphasis_works() {
        assert_eq!(
            render("*em* and **strong**").content,
            "<p><em>em</em> and <strong>strong</strong></p>\n"
        );
    }

    #[test]
    fn underscore_emphasis_is_literal() {
        assert_eq!(render("snake_case and _under_").content, "<p>snake_case and _under_</p>\n");
        assert_eq!(render("__dunder__").content, "<p>__dunder__</p>\n");
    }

    #[test]
    fn atx_headings_work() {
        assert_eq!(render("## Title").content, "<h2>Title</h2>\n");
    }

    #[test]
    fn setext_headings_are_literal() {
        let html = render("Title\n=====").content;
        assert!(!html.contains("<h1>"));
        assert!(html.contains("Title"));
    }

    #[test]
    fn autolinks_are_literal() {
        let html = render("<https://example.com>").content;
        assert!(!html.contains("<a "));
        assert!(html.contains("&lt;https://example.com&gt;"));
    }

    #[test]
    fn explicit_links_still_work() {
        assert_eq!(
            render("[site](https://example.com)").content,
            "<p><a href=\"https://example.com\">site</a></p>\n"
        );
    }

    #[test]
    fn raw_html_is_escaped() {
        let html = render("<script>alert(1)</script>").content;
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn fenced_code_is_not_wrapped_in_a_paragraph() {
        let html = render("```py\nx = 1\n```").content;
        assert!(html.starts_with("<div class=\"codehilite\" data-code-language=\"py\">"));
        assert!(!html.contains("<p>"));
        assert!(html.contains("x = 1\n</code></pre></div>"));
    }

    #[test]
    fn indented_code_uses_the_same_wrapper() {
        let html = render("    x = 1").content;
        assert!(html.contains("<div class=\"codehilite\"><pre><span></span><code>x = 1\n"));
    }

    #[test]
    fn blockquote_mentions_are_silenced() {
        let message = render("> @**Alice Smith** wrote this");
        assert!(message
            .content
            .contains(r#"<span class="user-mention silent" data-user-id="42">Alice Smith</span>"#));
        assert!(message.content.starts_with("<blockquote>"));
    }

    #[test]
    fn quoted_mentions_do_not_set_flags() {
        let message = render("> @**Bob** said so");
        assert!(!message.mentioned);
        assert!(!message.mentioned_me_directly);
    }

    #[test]
    fn direct_mention_sets_both_flags() {
        let message = render("hey @**Bob**");
        assert!(message.mentioned);
        assert!(message.mentioned_me_directly);
    }

    #[test]
    fn mention_of_someone_else_sets_neither_flag() {
        let message = render("hey @**Alice Smith**");
        assert!(!message.mentioned);
        assert!(!message.mentioned_me_directly);
    }

    #[test]
    fn wildcard_sets_only_the_broad_flag() {
        let message = render("@**everyone** meeting now");
        assert!(message.mentioned);
        assert!(!message.mentioned_me_directly);
    }

    #[test]
    fn group_mention_sets_flag_for_members() {
        // The viewer (id 7) is in "backend".
        let message = render("paging @*backend*");
        assert!(message.mentioned);
        assert!(!message.mentioned_me_directly);
    }

    #[test]
    fn silent_mention_sets_no_flags() {
        let message = render("fyi @_**Bob**");
        assert!(!message.mentioned);
        assert!(!message.mentioned_me_directly);
    }

    #[test]
    fn me_message_flag() {
        assert!(render("/me waves").is_me_message);
        assert!(!render("me waves").is_me_message);
        assert!(!render("/meta discussion").is_me_message);
    }

    #[test]
    fn backend_only_media_and_embeds() {
        let engine = engine();
        assert!(engine.contains_backend_only_syntax("look at cat.png "));
        assert!(engine.contains_backend_only_syntax("https://youtube.com/watch?v=x"));
        assert!(engine.contains_backend_only_syntax("https://twitter.com/user/status/1"));
        assert!(!engine.contains_backend_only_syntax("plain old text"));
    }

    #[test]
    fn backend_only_linkifier_edge() {
        let engine = engine();
        // Boundary-respecting matches echo fine; jammed ones defer.
        assert!(!engine.contains_backend_only_syntax("see #123"));
        assert!(engine.contains_backend_only_syntax("see x#123"));
    }

    #[test]
    fn linkifier_end_to_end() {
        let mut message = Message::new("issue ABC-42 fixed");
        let engine = engine();
        engine.rebuild_linkifiers(&[LinkifierDef {
            pattern: r"ABC-(?P<id>\d+)".to_owned(),
            url_format: "https://x/%(id)s".to_owned(),
        }]);
        engine.apply_markdown(&mut message);
        assert_eq!(
            message.content,
            "<p>issue <a href=\"https://x/42\">ABC-42</a> fixed</p>\n"
        );
    }

    #[test]
    fn quote_fence_end_to_end() {
        let html = render("~~~quote\nhello\nworld\n~~~").content;
        assert_eq!(
            html,
            "<blockquote>\n<p>hello<br />\nworld</p>\n</blockquote>\n"
        );
    }

    #[test]
    fn unknown_emoji_shortcode_is_untouched() {
        assert_eq!(
            render("just :not_a_real_emoji: here").content,
            "<p>just :not_a_real_emoji: here</p>\n"
        );
    }

    #[test]
    fn spoiler_end_to_end() {
        let html = render("```spoiler Who wins\n**Nobody**\n```").content;
        assert!(html.contains(r#"<div class="spoiler-block"><div class="spoiler-header">"#));
        assert!(html.contains("Who wins"));
        assert!(html.contains(r#"<div class="spoiler-content" aria-hidden="true">"#));
        assert!(html.contains("<strong>Nobody</strong>"));
        assert!(html.ends_with("</div></div>\n"));
    }

    #[test]
    fn timestamp_end_to_end() {
        let html = render("meet at <time:2023-04-16T16:27:00Z>").content;
        assert!(html.contains(
            r#"<time datetime="2023-04-16T16:27:00Z">2023-04-16T16:27:00Z</time>"#
        ));
    }

    #[test]
    fn math_end_to_end() {
        let inline = render("so $$x^2$$ holds").content;
        assert!(inline.contains(r#"<span class="katex">x^2</span>"#));

        let block = render("```math\nx^2\n```").content;
        assert!(block.contains(r#"<span class="katex-display">x^2</span>"#));
        assert!(!block.contains("<p>"));
    }

    #[test]
    fn code_inside_quote_keeps_its_shape() {
        let html = render("~~~quote\n```\nlet x = 1;\n```\n~~~").content;
        assert!(html.starts_with("<blockquote>"));
        assert!(html.contains("let x = 1;"));
        assert!(html.contains("codehilite"));
    }

    #[test]
    fn typed_sentinel_characters_cannot_alias_the_stash() {
        let html = render("```\nsecret\n```\n\u{E000}0\u{E000} and \u{E001}0\u{E001}").content;
        assert_eq!(html.matches("secret").count(), 1);
        assert!(!html.contains('\u{E000}'));
        assert!(!html.contains('\u{E001}'));
    }

    #[test]
    fn tables_render() {
        let html = render("|a|b|\n|-|-|\n|1|2|").content;
        assert!(html.contains("<table>"));
    }

    #[test]
    fn strikethrough_renders() {
        assert_eq!(render("~~gone~~").content, "<p><del>gone</del></p>\n");
    }
}
