use lol_html::html_content::ContentType;
use lol_html::{element, text, HtmlRewriter, Settings};

use crate::prelude::*;

/// Silences every mention span in an HTML fragment: adds the `silent` class
/// and drops the leading `@` glyph. Already-silent spans pass through
/// unchanged, so the rewrite is idempotent.
pub(crate) fn silence_mentions(html: &str) -> Result<String> {
    let mut output = vec![];
    {
        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: vec![
                    element!("span.user-mention", |el| {
                        let class = el.get_attribute("class").unwrap_or_default();
                        if !class.split_ascii_whitespace().any(|c| c == "silent") {
                            el.set_attribute("class", &format!("{class} silent"))?;
                        }
                        Ok(())
                    }),
                    element!("span.user-group-mention", |el| {
                        let class = el.get_attribute("class").unwrap_or_default();
                        if !class.split_ascii_whitespace().any(|c| c == "silent") {
                            el.set_attribute("class", &format!("{class} silent"))?;
                        }
                        Ok(())
                    }),
                    text!("span.user-mention", |chunk| {
                        if let Some(stripped) = chunk.as_str().strip_prefix('@') {
                            // The chunk is already escaped HTML; reinsert it
                            // as such to avoid double-escaping entities.
                            let stripped = stripped.to_owned();
                            chunk.replace(&stripped, ContentType::Html);
                        }
                        Ok(())
                    }),
                    text!("span.user-group-mention", |chunk| {
                        if let Some(stripped) = chunk.as_str().strip_prefix('@') {
                            let stripped = stripped.to_owned();
                            chunk.replace(&stripped, ContentType::Html);
                        }
                        Ok(())
                    }),
                ],
                ..Settings::default()
            },
            |c: &[u8]| output.extend_from_slice(c),
        );
        rewriter.write(html.as_bytes())?;
        rewriter.end()?;
    }
    let html = String::from_utf8(output)?;
    Ok(html)
}
