//! Line-oriented pre-pass over raw message text that pulls fenced blocks
//! (code, quote, math, spoiler) out of the Markdown engine's reach.
//!
//! The scanner keeps a stack of open blocks. Quote and spoiler bodies are
//! still Markdown, so fence-opening lines inside them push nested blocks;
//! code and math bodies are taken verbatim. A block closes only on a line
//! exactly equal to its own fence marker, which is what keeps mismatched
//! fence lengths and nesting straight. Finished code/math blocks and the
//! spoiler wrapper chrome become stash placeholders; quote bodies are
//! re-emitted as `> `-prefixed Markdown.

use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::math::{MathError, MathRenderer};
use crate::prelude::*;
use crate::render::escape_html_text;
use crate::stash::Stash;

static FENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^ {0,3}(`{3,}|~{3,})\s*(?:\{\.?([a-zA-Z0-9_+\-./#]+)\}|([a-zA-Z0-9_+\-./#]*))\s*(.*?)\s*$",
    )
    .unwrap()
});

static FENCE_LENGTH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^ {0,3}(`{3,})").unwrap());

const SPOILER_HEADER_OPEN: &str = r#"<div class="spoiler-block"><div class="spoiler-header">"#;
const SPOILER_CONTENT_OPEN: &str = r#"</div><div class="spoiler-content" aria-hidden="true">"#;
const SPOILER_FOOTER: &str = "</div></div>";

#[derive(Debug)]
enum Block {
    Code {
        fence: String,
        lang: String,
        lines: Vec<String>,
    },
    Quote {
        fence: String,
        lines: Vec<String>,
    },
    Math {
        fence: String,
        lines: Vec<String>,
    },
    Spoiler {
        fence: String,
        header: String,
        lines: Vec<String>,
    },
}

impl Block {
    fn fence(&self) -> &str {
        match self {
            Block::Code { fence, .. }
            | Block::Quote { fence, .. }
            | Block::Math { fence, .. }
            | Block::Spoiler { fence, .. } => fence,
        }
    }

    fn lines_mut(&mut self) -> &mut Vec<String> {
        match self {
            Block::Code { lines, .. }
            | Block::Quote { lines, .. }
            | Block::Math { lines, .. }
            | Block::Spoiler { lines, .. } => lines,
        }
    }
}

/// Replace every complete fenced block in `content` with its rendering: a
/// stash placeholder for code/math/spoiler chrome, or `> `-quoted Markdown
/// for quote blocks. Ordinary text passes through untouched.
pub(crate) fn process(content: &str, stash: &mut Stash, math: &dyn MathRenderer) -> String {
    let mut output: Vec<String> = Vec::new();
    let mut stack: Vec<Block> = Vec::new();

    for line in content.split('\n') {
        handle_line(line, &mut stack, &mut output, stash, math);
    }

    // Unterminated blocks close innermost-first with whatever they have.
    while let Some(block) = stack.pop() {
        match stack.last_mut() {
            Some(parent) => finish(block, parent.lines_mut(), stash, math),
            None => finish(block, &mut output, stash, math),
        }
    }

    if output.len() > 2 && !output[output.len() - 2].is_empty() {
        output.push(String::new());
    }

    output.join("\n")
}

fn handle_line(
    line: &str,
    stack: &mut Vec<Block>,
    output: &mut Vec<String>,
    stash: &mut Stash,
    math: &dyn MathRenderer,
) {
    if stack.last().is_some_and(|top| line == top.fence()) {
        let block = stack.pop().expect("stack is non-empty");
        match stack.last_mut() {
            Some(parent) => finish(block, parent.lines_mut(), stash, math),
            None => finish(block, output, stash, math),
        }
        return;
    }

    // Only Markdown-bearing bodies (and the top level) can open a nested
    // block; code and math bodies are verbatim.
    let nests = matches!(
        stack.last(),
        None | Some(Block::Quote { .. }) | Some(Block::Spoiler { .. })
    );
    if nests {
        if let Some(block) = parse_fence(line) {
            stack.push(block);
            return;
        }
    }

    match stack.last_mut() {
        // The default handler right-trims; the others keep bytes intact.
        Some(Block::Code { lines, .. }) => lines.push(line.trim_end().to_owned()),
        Some(block) => block.lines_mut().push(line.to_owned()),
        None => output.push(line.to_owned()),
    }
}

fn parse_fence(line: &str) -> Option<Block> {
    let caps = FENCE_RE.captures(line)?;
    let fence = caps[1].to_owned();
    let lang = caps
        .get(2)
        .or_else(|| caps.get(3))
        .map(|m| m.as_str())
        .unwrap_or("");
    let header = caps.get(4).map(|m| m.as_str()).unwrap_or("");
    let header = header
        .strip_prefix('{')
        .and_then(|h| h.strip_suffix('}'))
        .unwrap_or(header)
        .trim()
        .to_owned();

    let block = match lang {
        "quote" => Block::Quote {
            fence,
            lines: Vec::new(),
        },
        "math" | "tex" | "latex" => Block::Math {
            fence,
            lines: Vec::new(),
        },
        "spoiler" => Block::Spoiler {
            fence,
            header,
            lines: Vec::new(),
        },
        _ => Block::Code {
            fence,
            lang: lang.to_owned(),
            lines: Vec::new(),
        },
    };

    Some(block)
}

fn finish(block: Block, out: &mut Vec<String>, stash: &mut Stash, math: &dyn MathRenderer) {
    match block {
        Block::Code { lang, lines, .. } => {
            let html = wrap_code(&lines.join("\n"), &lang);
            emit_block(out, stash.stash(html, true));
        }
        Block::Quote { lines, .. } => {
            emit_block(out, wrap_quote(&lines.join("\n")));
        }
        Block::Math { lines, .. } => {
            let html = wrap_tex(&lines.join("\n"), math);
            emit_block(out, stash.stash(html, true));
        }
        Block::Spoiler { header, lines, .. } => {
            // The wrapper chrome is stashed, but the header and body stay
            // live so they keep rendering as Markdown.
            let text = [
                stash.stash(SPOILER_HEADER_OPEN, true),
                header,
                stash.stash(SPOILER_CONTENT_OPEN, true),
                lines.join("\n"),
                stash.stash(SPOILER_FOOTER, true),
            ]
            .join("\n\n");
            emit_block(out, text);
        }
    }
}

/// Blank-line padding keeps the emitted block separated from surrounding
/// Markdown.
fn emit_block(out: &mut Vec<String>, text: String) {
    out.push(String::new());
    out.push(text);
    out.push(String::new());
}

/// Code block container matching the server renderer's `codehilite` shape.
/// Content is HTML-escaped exactly once; highlighting is the server's job.
pub(crate) fn wrap_code(code: &str, lang: &str) -> String {
    let header = if lang.is_empty() {
        r#"<div class="codehilite"><pre><span></span><code>"#.to_owned()
    } else {
        format!(
            r#"<div class="codehilite" data-code-language="{}"><pre><span></span><code>"#,
            escape_html_text(lang)
        )
    };

    // Collapse leading/trailing blank lines down to the single trailing
    // newline the server's highlighter emits.
    let code = code.trim_matches('\n');
    format!("{header}{}\n</code></pre></div>", escape_html_text(code))
}

fn wrap_quote(text: &str) -> String {
    text.split("\n\n")
        .map(|paragraph| {
            paragraph
                .split('\n')
                .filter(|line| !line.is_empty())
                .map(|line| format!("> {line}"))
                .join("\n")
        })
        .join("\n\n")
}

fn wrap_tex(tex: &str, math: &dyn MathRenderer) -> String {
    match math.render(tex, true) {
        Ok(html) => html,
        Err(e) => {
            if let MathError::Render(report) = &e {
                error!("Display math failed to render: {report}");
            }
            format!(r#"<span class="tex-error">{}</span>"#, escape_html_text(tex))
        }
    }
}

/// A backtick fence guaranteed not to collide with any fence already in
/// `content`: one backtick longer than the longest line-leading run found,
/// never shorter than three.
pub fn get_unused_fence(content: &str) -> String {
    let mut length = 3;
    for caps in FENCE_LENGTH_RE.captures_iter(content) {
        length = length.max(caps[1].len() + 1);
    }
    "`".repeat(length)
}
