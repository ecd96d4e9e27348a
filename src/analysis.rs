//! Text analysis: turning extracted text and file names into index terms.
//!
//! Terms are lower-cased words found by Unicode word segmentation (UAX #29),
//! which handles scripts without spaces (each CJK ideograph becomes its own
//! token). Positions are consecutive per field so that phrase queries can
//! test adjacency directly.

pub mod analyzer;
pub mod token;
pub mod tokenizer;

pub use analyzer::Analyzer;
pub use token::Token;
pub use tokenizer::{FilenameTokenizer, Tokenizer, UnicodeWordTokenizer};
