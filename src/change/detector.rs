//! Classification of walked paths against the committed index.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::change::checksum::{is_failed_checksum, is_metadata_checksum};
use crate::change::walker::{WalkEntry, in_scope};
use crate::document::{DocId, FileStat};
use crate::pipeline::BuildMode;
use crate::store::Snapshot;

/// What happened to a path since it was last indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// No live document for this path.
    New(FileStat),
    /// Size or modification time differ from the live document.
    Modified { stat: FileStat, previous: DocId },
    /// Metadata matches but cannot vouch for the content; the content
    /// checksum must be compared against `checksum` before deciding.
    Unverified {
        stat: FileStat,
        previous: DocId,
        checksum: String,
    },
    /// Nothing to do.
    Unchanged { path: PathBuf },
    /// The path is gone or unreadable; its document must be removed.
    Deleted { path: String, previous: DocId },
}

/// Compares walk results with a snapshot of the index.
///
/// Every path the detector sees is remembered; once the walk is over,
/// [`ChangeDetector::finish`] reports the live documents under the walked
/// roots that were not seen as deleted.
pub struct ChangeDetector {
    snapshot: Arc<Snapshot>,
    mode: BuildMode,
    roots: Vec<PathBuf>,
    verify_checksums: bool,
    seen: HashSet<String>,
}

impl ChangeDetector {
    pub fn new(
        snapshot: Arc<Snapshot>,
        mode: BuildMode,
        roots: Vec<PathBuf>,
        verify_checksums: bool,
    ) -> Self {
        ChangeDetector {
            snapshot,
            mode,
            roots,
            verify_checksums,
            seen: HashSet::new(),
        }
    }

    /// Classify one walk entry. Unreadable entries that do not name a path
    /// produce nothing.
    pub fn classify(&mut self, entry: WalkEntry) -> Option<Change> {
        match entry {
            WalkEntry::File(stat) => Some(self.classify_file(stat)),
            WalkEntry::Unreadable { path, reason } => {
                let path = path?.to_string_lossy().into_owned();
                self.seen.insert(path.clone());
                let previous = self.snapshot.document_by_path(&path)?.id;
                log::warn!("{path} unreadable ({reason}), dropping it from the index");
                Some(Change::Deleted { path, previous })
            }
        }
    }

    fn classify_file(&mut self, stat: FileStat) -> Change {
        let key = stat.path.to_string_lossy().into_owned();
        self.seen.insert(key.clone());

        let Some(document) = self.snapshot.document_by_path(&key) else {
            return Change::New(stat);
        };
        let previous = document.id;

        if self.mode == BuildMode::Rebuild || document.fingerprint() != stat.fingerprint() {
            return Change::Modified { stat, previous };
        }
        if is_failed_checksum(&document.checksum) {
            log::debug!("{key}: previous ingest failed, retrying");
            return Change::Modified { stat, previous };
        }

        // A file changed within the same timestamp tick as its indexing can
        // keep its fingerprint; only content comparison is conclusive then.
        let ambiguous = stat.modified >= document.indexed_at;
        let verifiable = !is_metadata_checksum(&document.checksum);
        if (ambiguous || self.verify_checksums) && verifiable {
            log::debug!("{key}: fingerprint unchanged, verifying content");
            return Change::Unverified {
                stat,
                previous,
                checksum: document.checksum.clone(),
            };
        }
        if ambiguous {
            // Metadata-only documents have nothing to verify against.
            return Change::Modified { stat, previous };
        }

        Change::Unchanged { path: stat.path }
    }

    /// Live documents under the walked roots that the walk did not see.
    /// In rebuild mode every unseen live document counts, wherever it is.
    pub fn finish(self) -> Vec<Change> {
        let mut deleted: Vec<Change> = self
            .snapshot
            .live_documents()
            .filter(|doc| !self.seen.contains(&doc.path))
            .filter(|doc| {
                self.mode == BuildMode::Rebuild
                    || in_scope(&self.roots, std::path::Path::new(&doc.path))
            })
            .map(|doc| Change::Deleted {
                path: doc.path.clone(),
                previous: doc.id,
            })
            .collect();
        deleted.sort_by(|a, b| match (a, b) {
            (Change::Deleted { previous: x, .. }, Change::Deleted { previous: y, .. }) => x.cmp(y),
            _ => std::cmp::Ordering::Equal,
        });
        deleted
    }
}
