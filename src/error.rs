//! Error types for filedex.
//!
//! Every fallible operation in the crate returns [`Result`], whose error type
//! [`FiledexError`] mirrors the failure classes of the indexing core:
//!
//! - per-file failures ([`FiledexError::Extraction`], [`FiledexError::Checksum`])
//!   which never escape the ingestion pipeline,
//! - store failures ([`FiledexError::Commit`], [`FiledexError::CorruptIndex`],
//!   [`FiledexError::ConcurrencyTimeout`]) which surface to the caller,
//! - query failures ([`FiledexError::QuerySyntax`]).
//!
//! # Examples
//!
//! ```
//! use filedex::error::{FiledexError, Result};
//!
//! fn parse_limit(raw: &str) -> Result<usize> {
//!     raw.parse()
//!         .map_err(|_| FiledexError::config(format!("invalid limit: {raw}")))
//! }
//!
//! assert!(parse_limit("ten").is_err());
//! ```

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// The main error type for filedex operations.
#[derive(Error, Debug)]
pub enum FiledexError {
    /// I/O errors outside of per-file extraction (index directory, segments).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Text extraction failed for one file. The file is still indexed
    /// metadata-only.
    #[error("Extraction error for {path}: {reason}")]
    Extraction { path: PathBuf, reason: String },

    /// Hashing a file's bytes failed.
    #[error("Checksum error for {path}: {source}")]
    Checksum {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing a batch (segment or manifest) failed.
    #[error("Commit error: {0}")]
    Commit(String),

    /// The manifest references a segment that is missing or unreadable.
    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    /// Malformed query expression.
    #[error("Query syntax error at {position}: {message}")]
    QuerySyntax { message: String, position: usize },

    /// The single-writer lock could not be acquired within the budget.
    #[error("Timed out waiting for index writer: {0}")]
    ConcurrencyTimeout(String),

    /// Invalid configuration values.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Binary encoding/decoding errors.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An index build was cancelled between batches.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Generic error for other cases.
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for operations that may fail with [`FiledexError`].
pub type Result<T> = std::result::Result<T, FiledexError>;

impl FiledexError {
    /// Create a new extraction error.
    pub fn extraction<P: Into<PathBuf>, S: Into<String>>(path: P, reason: S) -> Self {
        FiledexError::Extraction {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new checksum error.
    pub fn checksum<P: Into<PathBuf>>(path: P, source: io::Error) -> Self {
        FiledexError::Checksum {
            path: path.into(),
            source,
        }
    }

    /// Create a new commit error.
    pub fn commit<S: Into<String>>(msg: S) -> Self {
        FiledexError::Commit(msg.into())
    }

    /// Create a new corrupt index error.
    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        FiledexError::CorruptIndex(msg.into())
    }

    /// Create a new query syntax error at the given byte position.
    pub fn query_syntax<S: Into<String>>(msg: S, position: usize) -> Self {
        FiledexError::QuerySyntax {
            message: msg.into(),
            position,
        }
    }

    /// Create a new writer lock timeout error.
    pub fn lock_timeout<S: Into<String>>(msg: S) -> Self {
        FiledexError::ConcurrencyTimeout(msg.into())
    }

    /// Create a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        FiledexError::Config(msg.into())
    }

    /// Create a new serialization error.
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        FiledexError::Serialization(msg.into())
    }

    /// Create a new cancelled error.
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        FiledexError::Cancelled(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        FiledexError::Other(msg.into())
    }

    /// Whether the failed operation may succeed if attempted again.
    pub fn is_retryable(&self) -> bool {
        match self {
            FiledexError::Commit(_) | FiledexError::ConcurrencyTimeout(_) => true,
            FiledexError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted
                    | io::ErrorKind::WouldBlock
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::PermissionDenied
            ),
            _ => false,
        }
    }

    /// Whether a commit that keeps failing with this error loses only the
    /// batch being written. Anything else leaves the store unusable and
    /// ends the run.
    pub fn is_batch_scoped(&self) -> bool {
        matches!(
            self,
            FiledexError::Commit(_) | FiledexError::ConcurrencyTimeout(_)
        )
    }

    /// Whether this error only affects a single file.
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            FiledexError::Extraction { .. } | FiledexError::Checksum { .. }
        )
    }
}

impl From<bincode::Error> for FiledexError {
    fn from(err: bincode::Error) -> Self {
        FiledexError::Serialization(err.to_string())
    }
}
