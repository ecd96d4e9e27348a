//! Change detection.
//!
//! A [`Walker`] lazily enumerates the files below the configured roots and a
//! [`ChangeDetector`] classifies each one against the committed index as
//! new, modified, unchanged or deleted. Cheap metadata (size and
//! modification time) settles most files; the SHA-256 content checksum
//! settles the rest.

pub mod checksum;
pub mod detector;
pub mod walker;

pub use checksum::{failed_checksum, file_checksum, metadata_checksum};
pub use detector::{Change, ChangeDetector};
pub use walker::{WalkEntry, WalkOptions, Walker, normalize_roots};
