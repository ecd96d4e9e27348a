//! On-disk inverted index.
//!
//! An index directory contains immutable segment files
//! (`seg_<id>.seg`, ids increasing) and a `MANIFEST` naming the live
//! segments and the tombstoned document ids. Every mutation writes new files
//! first and then swaps the manifest with a rename; a crash at any point
//! leaves either the old or the new state.
//!
//! Readers work on a [`Snapshot`]; writers go through the single
//! [`IndexWriter`] obtained from [`IndexStore::writer`].

pub mod codec;
pub mod index;
pub mod manifest;
pub mod segment;
pub mod snapshot;

pub use index::{Batch, CommitOutcome, CompactionOutcome, IndexStats, IndexStore, IndexWriter};
pub use manifest::Manifest;
pub use segment::{Posting, SegmentMeta, SegmentReader};
pub use snapshot::Snapshot;
