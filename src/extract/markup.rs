//! HTML and XML.
//!
//! Documents are parsed and rendered to plain text by `html2text`, which
//! drops `<script>` and `<style>` bodies and decodes character references.

use std::fs;
use std::path::Path;

use crate::error::{FiledexError, Result};
use crate::extract::Extractor;
use crate::extract::text::{decode_text, normalize_whitespace};

/// Wide enough that paragraphs are not wrapped into short lines.
const RENDER_WIDTH: usize = 1000;

#[derive(Debug, Clone, Default)]
pub struct MarkupExtractor;

impl MarkupExtractor {
    pub fn new() -> Self {
        MarkupExtractor
    }
}

impl Extractor for MarkupExtractor {
    fn name(&self) -> &'static str {
        "markup"
    }

    fn extensions(&self) -> &[&'static str] {
        &["html", "htm", "xhtml", "xml", "svg"]
    }

    fn extract(&self, path: &Path) -> Result<String> {
        let bytes = fs::read(path).map_err(|e| FiledexError::extraction(path, e.to_string()))?;
        render_markup(&decode_text(&bytes))
            .map_err(|reason| FiledexError::extraction(path, reason))
    }
}

/// Render markup to its normalized text content.
pub fn render_markup(markup: &str) -> std::result::Result<String, String> {
    let rendered = html2text::from_read(markup.as_bytes(), RENDER_WIDTH)
        .map_err(|e| format!("html2text error: {e}"))?;
    let text = normalize_whitespace(&rendered.replace('\u{a0}', " "));
    Ok(collapse_blank_lines(&text))
}

fn collapse_blank_lines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    use tempfile::TempDir;

    #[test]
    fn test_render_drops_script_and_style() {
        let html = "<html><head><style>body { color: red }</style>\
                    <script type=\"x\">var hidden = 1;</script></head>\
                    <body><p>Quarterly&nbsp;results &amp; plan</p><!-- secret --></body></html>";
        let text = render_markup(html).unwrap();
        assert!(text.contains("Quarterly results & plan"), "{text:?}");
        assert!(!text.contains("color"));
        assert!(!text.contains("hidden"));
        assert!(!text.contains("secret"));
    }

    #[test]
    fn test_cells_stay_separate_words() {
        let text = render_markup("<table><tr><td>alpha</td><td>beta</td></tr></table>").unwrap();
        assert!(!text.contains("alphabeta"), "{text:?}");
        assert!(text.contains("alpha"));
        assert!(text.contains("beta"));
    }

    #[test]
    fn test_malformed_markup_keeps_text() {
        let text = render_markup("<p>text <b>bold <i>unclosed").unwrap();
        assert!(text.contains("text"));
        assert!(text.contains("unclosed"));
    }

    #[test]
    fn test_extract_numeric_references() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("page.html");
        fs::write(&path, "<p>caf&#233; &#x263A;</p>").unwrap();
        let text = MarkupExtractor::new().extract(&path).unwrap();
        assert!(text.contains("café"), "{text:?}");
        assert!(text.contains('\u{263A}'));
    }
}
