//! Tokenizers for content and file names.
//!
//! # Examples
//!
//! ```
//! use filedex::analysis::tokenizer::{Tokenizer, UnicodeWordTokenizer};
//!
//! let tokenizer = UnicodeWordTokenizer::new();
//! let tokens: Vec<_> = tokenizer.tokenize("Hello, world! 你好").collect();
//!
//! assert_eq!(tokens[0].text, "hello");
//! assert_eq!(tokens[1].text, "world");
//! assert_eq!(tokens[2].text, "你");
//! ```

use unicode_segmentation::UnicodeSegmentation;

use crate::analysis::token::{Token, TokenStream};

/// Trait for tokenizers that convert text into tokens.
///
/// Implementations lower-case their output and number positions
/// consecutively, skipping nothing; the phrase matcher relies on both.
pub trait Tokenizer: Send + Sync {
    /// Tokenize the given text.
    fn tokenize(&self, text: &str) -> TokenStream;

    /// Get the name of this tokenizer (for debugging and configuration).
    fn name(&self) -> &'static str;
}

/// Splits text on Unicode word boundaries and keeps segments that contain
/// at least one alphanumeric character.
#[derive(Clone, Debug, Default)]
pub struct UnicodeWordTokenizer;

impl UnicodeWordTokenizer {
    pub fn new() -> Self {
        UnicodeWordTokenizer
    }
}

impl Tokenizer for UnicodeWordTokenizer {
    fn tokenize(&self, text: &str) -> TokenStream {
        let tokens: Vec<Token> = text
            .split_word_bound_indices()
            .filter(|(_, word)| word.chars().any(char::is_alphanumeric))
            .enumerate()
            .map(|(position, (start, word))| {
                Token::with_offsets(
                    word.to_lowercase(),
                    position as u32,
                    start,
                    start + word.len(),
                )
            })
            .collect();

        Box::new(tokens.into_iter())
    }

    fn name(&self) -> &'static str {
        "unicode_word"
    }
}

/// Splits file names on every non-alphanumeric character, so that
/// `Report_2024.docx` yields `report`, `2024` and `docx`.
#[derive(Clone, Debug, Default)]
pub struct FilenameTokenizer;

impl FilenameTokenizer {
    pub fn new() -> Self {
        FilenameTokenizer
    }
}

impl Tokenizer for FilenameTokenizer {
    fn tokenize(&self, text: &str) -> TokenStream {
        let mut tokens = Vec::new();
        let mut start: Option<usize> = None;

        for (idx, ch) in text.char_indices().chain(std::iter::once((text.len(), ' '))) {
            match (ch.is_alphanumeric(), start) {
                (true, None) => start = Some(idx),
                (false, Some(begin)) => {
                    let position = tokens.len() as u32;
                    tokens.push(Token::with_offsets(
                        text[begin..idx].to_lowercase(),
                        position,
                        begin,
                        idx,
                    ));
                    start = None;
                }
                _ => {}
            }
        }

        Box::new(tokens.into_iter())
    }

    fn name(&self) -> &'static str {
        "filename"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(stream: TokenStream) -> Vec<String> {
        stream.map(|t| t.text).collect()
    }

    #[test]
    fn test_unicode_word_tokenizer() {
        let tokenizer = UnicodeWordTokenizer::new();
        let tokens: Vec<Token> = tokenizer.tokenize("Quarterly, results!").collect();

        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].text, "quarterly");
        assert_eq!(tokens[1].text, "results");
        assert_eq!(tokens[1].position, 1);
        assert_eq!(tokens[1].start_offset, 11);
    }

    #[test]
    fn test_positions_are_consecutive() {
        let tokenizer = UnicodeWordTokenizer::new();
        let positions: Vec<u32> = tokenizer
            .tokenize("a -- b ... c")
            .map(|t| t.position)
            .collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn test_duplicates_preserved() {
        let tokenizer = UnicodeWordTokenizer::new();
        assert_eq!(
            texts(tokenizer.tokenize("plan the plan")),
            vec!["plan", "the", "plan"]
        );
    }

    #[test]
    fn test_filename_tokenizer() {
        let tokenizer = FilenameTokenizer::new();
        assert_eq!(
            texts(tokenizer.tokenize("Report_2024.docx")),
            vec!["report", "2024", "docx"]
        );
        assert_eq!(texts(tokenizer.tokenize("...")), Vec::<String>::new());
        assert_eq!(tokenizer.name(), "filename");
    }
}
