//! # filedex
//!
//! Incremental full-text indexing and search for local files.
//!
//! ## Features
//!
//! - Content extraction through a registry of per-extension extractors
//! - Change detection by size, modification time and SHA-256 checksum
//! - Bounded, multi-threaded ingestion with a single committing writer
//! - Crash-safe segment files with an atomically replaced manifest
//! - Boolean, phrase, wildcard, fuzzy and metadata-range queries
//! - Progress events and a periodic update scheduler

pub mod analysis;
pub mod change;
pub mod cli;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod event;
pub mod extract;
pub mod pipeline;
pub mod query;
pub mod store;
pub mod translate;
pub mod util;

pub mod prelude {
    pub use crate::config::IndexerConfig;
    pub use crate::engine::Engine;
    pub use crate::error::{FiledexError, Result};
    pub use crate::event::{IndexEvent, IndexReport};
    pub use crate::query::{SearchFilters, SearchHit};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
