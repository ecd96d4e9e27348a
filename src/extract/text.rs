//! Plain text and source code.

use std::fs;
use std::path::Path;

use crate::error::{FiledexError, Result};
use crate::extract::Extractor;

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "rst", "py", "java", "c", "h", "cpp", "hpp", "rs", "go", "json",
    "yml", "yaml", "toml", "ini", "cfg", "conf", "css", "js", "ts", "sql", "sh", "bat", "ps1",
    "csv", "log",
];

/// Reads text files, guessing the encoding from the byte order mark.
#[derive(Debug, Clone, Default)]
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    pub fn new() -> Self {
        PlainTextExtractor
    }
}

impl Extractor for PlainTextExtractor {
    fn name(&self) -> &'static str {
        "text"
    }

    fn extensions(&self) -> &[&'static str] {
        TEXT_EXTENSIONS
    }

    fn extract(&self, path: &Path) -> Result<String> {
        let bytes = fs::read(path).map_err(|e| FiledexError::extraction(path, e.to_string()))?;
        Ok(normalize_whitespace(&decode_text(&bytes)))
    }
}

/// Decode bytes as UTF-8 (BOM stripped) or UTF-16 when a BOM says so,
/// falling back to Latin-1, which accepts any byte sequence.
pub fn decode_text(bytes: &[u8]) -> String {
    match bytes {
        [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8_lossy(rest).into_owned(),
        [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, u16::from_le_bytes),
        [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, u16::from_be_bytes),
        _ => match std::str::from_utf8(bytes) {
            Ok(text) => text.to_string(),
            Err(_) => bytes.iter().map(|&b| b as char).collect(),
        },
    }
}

fn decode_utf16(bytes: &[u8], from_bytes: fn([u8; 2]) -> u16) -> String {
    let units = bytes
        .chunks_exact(2)
        .map(|pair| from_bytes([pair[0], pair[1]]));
    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Unify line endings, turn tabs into spaces and collapse runs of spaces.
pub fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut last_space = false;

    while let Some(ch) = chars.next() {
        match ch {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push('\n');
                last_space = false;
            }
            ' ' | '\t' => {
                if !last_space {
                    out.push(' ');
                }
                last_space = true;
            }
            _ => {
                out.push(ch);
                last_space = false;
            }
        }
    }
    out
}
