//! Token type produced by tokenizers.

/// A single token with its position in the token stream and its byte span
/// in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Normalized (lower-cased) token text.
    pub text: String,

    /// Position in the token stream (0-based, consecutive).
    pub position: u32,

    /// Byte offset where this token starts in the original text.
    pub start_offset: usize,

    /// Byte offset where this token ends in the original text.
    pub end_offset: usize,
}

impl Token {
    pub fn new<S: Into<String>>(text: S, position: u32) -> Self {
        Token {
            text: text.into(),
            position,
            start_offset: 0,
            end_offset: 0,
        }
    }

    /// Create a token with byte offsets.
    pub fn with_offsets<S: Into<String>>(
        text: S,
        position: u32,
        start_offset: usize,
        end_offset: usize,
    ) -> Self {
        Token {
            text: text.into(),
            position,
            start_offset,
            end_offset,
        }
    }
}

/// A stream of tokens.
pub type TokenStream = Box<dyn Iterator<Item = Token> + Send>;
