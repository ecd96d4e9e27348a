//! Shared utility modules used across filedex components.

pub mod levenshtein;
pub mod varint;
