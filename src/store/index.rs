//! The index store: segments, manifest and the single-writer discipline.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::Serialize;

use crate::document::{AnalyzedDocument, DocId, STORED_CONTENT_CHARS, truncate_chars};
use crate::error::{FiledexError, Result};
use crate::store::manifest::{MANIFEST_TMP_FILE, Manifest};
use crate::store::segment::{
    SegmentBuilder, SegmentMeta, SegmentReader, parse_segment_file_name, remove_segment_file,
};
use crate::store::snapshot::Snapshot;

/// Documents and deletions committed together.
#[derive(Debug, Default, Clone)]
pub struct Batch {
    pub documents: Vec<AnalyzedDocument>,
    pub deletions: Vec<DocId>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_document(&mut self, document: AnalyzedDocument) {
        self.documents.push(document);
    }

    pub fn push_deletion(&mut self, id: DocId) {
        self.deletions.push(id);
    }

    pub fn len(&self) -> usize {
        self.documents.len() + self.deletions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.deletions.is_empty()
    }

    /// Check if batch has reached the given size.
    pub fn is_full(&self, max_size: usize) -> bool {
        self.len() >= max_size
    }
}

/// What a commit changed.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitOutcome {
    /// The segment written, if the batch had documents.
    pub segment: Option<SegmentMeta>,
    /// Ids assigned to the batch's documents, in batch order.
    pub doc_ids: Vec<DocId>,
    /// Live documents tombstoned by this commit.
    pub tombstoned: usize,
    pub generation: u64,
}

/// What a compaction changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompactionOutcome {
    pub segments_before: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
    pub documents: u64,
    pub reclaimed: usize,
    pub segment: Option<u64>,
}

/// Store statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub documents: u64,
    pub tombstones: u64,
    pub segments: usize,
    pub bytes: u64,
    pub generation: u64,
    pub deletion_ratio: f64,
}

/// Durable inverted index in one directory.
#[derive(Debug)]
pub struct IndexStore {
    dir: PathBuf,
    snapshot: RwLock<Arc<Snapshot>>,
    writer_lock: Mutex<WriterState>,
    lock_timeout: Duration,
}

/// State owned by whoever holds the writer lock.
#[derive(Debug)]
struct WriterState {
    /// Lowest segment id not yet handed out. Runs ahead of the manifest
    /// when a segment write fails, so a blocked id is never tried twice.
    next_segment_id: u64,
}

impl IndexStore {
    /// Open the index in `dir`, creating an empty one if none exists.
    ///
    /// Segment files not referenced by the manifest are left-overs of an
    /// interrupted commit and are deleted. A referenced segment that is
    /// missing or damaged fails the open with
    /// [`FiledexError::CorruptIndex`].
    pub fn open<P: AsRef<Path>>(dir: P, lock_timeout: Duration) -> Result<IndexStore> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let manifest = match Manifest::load(&dir)? {
            Some(manifest) => manifest,
            None => {
                log::info!("creating new index in {}", dir.display());
                let manifest = Manifest::default();
                manifest.save(&dir)?;
                manifest
            }
        };

        let mut segments = Vec::with_capacity(manifest.segments.len());
        for meta in &manifest.segments {
            let reader = SegmentReader::open(&dir, meta.id)?;
            if reader.documents().len() as u64 != meta.doc_count {
                return Err(FiledexError::corrupt(format!(
                    "segment {} holds {} documents, manifest says {}",
                    meta.id,
                    reader.documents().len(),
                    meta.doc_count
                )));
            }
            segments.push(Arc::new(reader));
        }

        remove_orphans(&dir, &manifest)?;
        let next_segment_id = manifest.next_segment_id;
        log::debug!(
            "opened index {} at generation {} ({} segments)",
            dir.display(),
            manifest.generation,
            manifest.segments.len()
        );

        Ok(IndexStore {
            dir,
            snapshot: RwLock::new(Arc::new(Snapshot::new(manifest, segments))),
            writer_lock: Mutex::new(WriterState { next_segment_id }),
            lock_timeout,
        })
    }

    /// Discard the index in `dir` and start empty, keeping id counters
    /// monotonic when the old manifest is still readable.
    pub fn recover<P: AsRef<Path>>(dir: P, lock_timeout: Duration) -> Result<IndexStore> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let previous = Manifest::load(dir).ok().flatten();
        let mut manifest = Manifest::default();
        if let Some(previous) = previous {
            manifest.generation = previous.generation + 1;
            manifest.next_segment_id = previous.next_segment_id;
            manifest.next_doc_id = previous.next_doc_id;
        }
        manifest.save(dir)?;
        remove_orphans(dir, &manifest)?;
        log::warn!("index {} reset to an empty state", dir.display());
        Self::open(dir, lock_timeout)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The current read view. Cheap; holds no lock after returning.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.read().clone()
    }

    /// Acquire the single-writer lock within the configured budget.
    pub fn writer(&self) -> Result<IndexWriter<'_>> {
        let guard = self.writer_lock.try_lock_for(self.lock_timeout).ok_or_else(|| {
            FiledexError::lock_timeout(format!(
                "writer lock on {} not acquired within {:?}",
                self.dir.display(),
                self.lock_timeout
            ))
        })?;
        Ok(IndexWriter { store: self, state: guard })
    }

    pub fn needs_compaction(&self, ratio: f64) -> bool {
        self.snapshot().manifest().deletion_ratio() > ratio
    }

    pub fn stats(&self) -> IndexStats {
        let snapshot = self.snapshot();
        let manifest = snapshot.manifest();
        IndexStats {
            documents: snapshot.live_count() as u64,
            tombstones: manifest.tombstones.len() as u64,
            segments: manifest.segments.len(),
            bytes: manifest.byte_size(),
            generation: manifest.generation,
            deletion_ratio: manifest.deletion_ratio(),
        }
    }

    fn publish(&self, snapshot: Snapshot) {
        *self.snapshot.write() = Arc::new(snapshot);
    }
}

/// Exclusive write access to an [`IndexStore`].
pub struct IndexWriter<'a> {
    store: &'a IndexStore,
    state: MutexGuard<'a, WriterState>,
}

impl IndexWriter<'_> {
    /// Hand out a segment id and record it in `manifest`. An id is used at
    /// most once even when the write that reserved it failed.
    fn reserve_segment_id(&mut self, manifest: &mut Manifest) -> u64 {
        let id = self.state.next_segment_id.max(manifest.next_segment_id);
        self.state.next_segment_id = id + 1;
        manifest.next_segment_id = id + 1;
        id
    }

    /// Commit a batch atomically: its documents become visible together
    /// with its deletions, or nothing changes.
    ///
    /// A document supersedes the live document with the same path. An
    /// empty batch is a no-op and does not advance the generation.
    pub fn commit(&mut self, batch: &Batch) -> Result<CommitOutcome> {
        let current = self.store.snapshot();
        if batch.is_empty() {
            return Ok(CommitOutcome {
                segment: None,
                doc_ids: Vec::new(),
                tombstoned: 0,
                generation: current.generation(),
            });
        }

        let store = self.store;
        let dir = store.dir.as_path();
        let mut manifest = current.manifest().clone();
        let mut tombstoned = 0;
        let superseded = batch
            .documents
            .iter()
            .filter_map(|d| current.document_by_path(&d.document.path).map(|old| old.id));
        for id in batch.deletions.iter().copied().chain(superseded) {
            if current.is_live(id) && manifest.tombstones.insert(id) {
                tombstoned += 1;
            }
        }

        let mut segments: Vec<Arc<SegmentReader>> = current.segments().to_vec();
        let mut doc_ids = Vec::with_capacity(batch.documents.len());
        let mut written = None;

        if !batch.documents.is_empty() {
            let segment_id = self.reserve_segment_id(&mut manifest);
            let indexed_at = Utc::now();

            let mut builder = SegmentBuilder::new(segment_id);
            for analyzed in &batch.documents {
                let mut document = analyzed.document.clone();
                document.id = manifest.next_doc_id;
                manifest.next_doc_id += 1;
                document.indexed_at = indexed_at;
                document.content = truncate_chars(&document.content, STORED_CONTENT_CHARS);
                doc_ids.push(document.id);
                builder.add_document(document, analyzed.terms.clone());
            }

            let meta = builder.write(dir).map_err(|e| {
                discard_segment(dir, segment_id);
                FiledexError::commit(format!("writing segment {segment_id}: {e}"))
            })?;
            let reader = SegmentReader::open(dir, segment_id).map_err(|e| {
                discard_segment(dir, segment_id);
                FiledexError::commit(format!("verifying segment {segment_id}: {e}"))
            })?;
            manifest.segments.push(meta);
            segments.push(Arc::new(reader));
            written = Some(meta);
        }

        manifest.generation += 1;
        if let Err(e) = manifest.save(dir) {
            if let Some(meta) = written {
                discard_segment(dir, meta.id);
            }
            return Err(FiledexError::commit(format!("writing manifest: {e}")));
        }

        let generation = manifest.generation;
        log::debug!(
            "committed generation {generation}: {} documents, {tombstoned} tombstones",
            doc_ids.len()
        );
        self.store.publish(Snapshot::new(manifest, segments));

        Ok(CommitOutcome {
            segment: written,
            doc_ids,
            tombstoned,
            generation,
        })
    }

    /// Merge all live documents into a single segment and drop tombstones.
    ///
    /// Returns `None` when there is nothing to reclaim (at most one segment
    /// and no tombstones).
    pub fn compact(&mut self) -> Result<Option<CompactionOutcome>> {
        let current = self.store.snapshot();
        let old = current.manifest();
        if old.segments.len() <= 1 && old.tombstones.is_empty() {
            return Ok(None);
        }

        let store = self.store;
        let dir = store.dir.as_path();
        let mut manifest = old.clone();
        let segment_id = self.reserve_segment_id(&mut manifest);

        let mut builder = SegmentBuilder::new(segment_id);
        for segment in current.segments() {
            for document in segment.documents() {
                if current.is_live(document.id) {
                    builder.add_stored(document.clone());
                }
            }
            for term in segment.terms() {
                let postings = segment.postings(term)?;
                builder.add_postings(term, postings.into_iter().filter(|p| current.is_live(p.doc)));
            }
        }

        let documents = builder.doc_count() as u64;
        let mut segments = Vec::new();
        manifest.segments.clear();
        if !builder.is_empty() {
            let meta = builder.write(dir).map_err(|e| {
                discard_segment(dir, segment_id);
                FiledexError::commit(format!("writing compacted segment {segment_id}: {e}"))
            })?;
            let reader = SegmentReader::open(dir, segment_id).map_err(|e| {
                discard_segment(dir, segment_id);
                FiledexError::commit(format!("verifying compacted segment {segment_id}: {e}"))
            })?;
            manifest.segments.push(meta);
            segments.push(Arc::new(reader));
        }
        let reclaimed = manifest.tombstones.len();
        manifest.tombstones.clear();
        manifest.generation += 1;

        if let Err(e) = manifest.save(dir) {
            discard_segment(dir, segment_id);
            return Err(FiledexError::commit(format!("writing manifest: {e}")));
        }

        let outcome = CompactionOutcome {
            segments_before: old.segments.len(),
            bytes_before: old.byte_size(),
            bytes_after: manifest.byte_size(),
            documents,
            reclaimed,
            segment: manifest.segments.first().map(|s| s.id),
        };
        self.store.publish(Snapshot::new(manifest, segments));

        // Readers holding the previous snapshot keep their mappings alive.
        for meta in &old.segments {
            if let Err(e) = remove_segment_file(dir, meta.id) {
                log::warn!("could not remove compacted segment {}: {e}", meta.id);
            }
        }
        log::info!(
            "compacted {} segments ({} bytes) into {} bytes, {} tombstones reclaimed",
            outcome.segments_before,
            outcome.bytes_before,
            outcome.bytes_after,
            outcome.reclaimed
        );
        Ok(Some(outcome))
    }

    /// Drop every document. Id counters stay monotonic.
    pub fn clear(&mut self) -> Result<()> {
        let current = self.store.snapshot();
        let store = self.store;
        let dir = store.dir.as_path();
        let mut manifest = current.manifest().clone();
        manifest.segments.clear();
        manifest.tombstones.clear();
        manifest.generation += 1;
        manifest
            .save(dir)
            .map_err(|e| FiledexError::commit(format!("writing manifest: {e}")))?;
        self.store.publish(Snapshot::new(manifest.clone(), Vec::new()));
        remove_orphans(dir, &manifest)
    }
}

fn discard_segment(dir: &Path, id: u64) {
    if let Err(e) = remove_segment_file(dir, id) {
        log::warn!("could not remove unfinished segment {id}: {e}");
    }
}

/// Delete segment files the manifest does not reference, and a stale
/// temporary manifest. Entries that are not plain files, or that cannot be
/// removed, are left in place with a warning.
fn remove_orphans(dir: &Path, manifest: &Manifest) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let orphan = name == MANIFEST_TMP_FILE
            || parse_segment_file_name(&name).is_some_and(|id| !manifest.references(id));
        if !orphan {
            continue;
        }
        if !entry.file_type()?.is_file() {
            log::warn!("leaving {name} in place: not a regular file");
            continue;
        }
        log::info!("removing orphaned {name}");
        if let Err(e) = fs::remove_file(entry.path()) {
            log::warn!("could not remove {name}: {e}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Analyzer;
    use crate::document::{Document, FileStat};
    use crate::store::segment::segment_file_name;
    use tempfile::TempDir;

    fn analyzed(path: &str, content: &str) -> AnalyzedDocument {
        let stat = FileStat {
            path: PathBuf::from(path),
            size: content.len() as u64,
            modified: Utc::now(),
            created: Utc::now(),
        };
        let mut document = Document::from_stat(&stat);
        document.content = content.to_string();
        let terms = Analyzer::new().analyze(&document, content);
        AnalyzedDocument { document, terms }
    }

    fn open(dir: &Path) -> IndexStore {
        IndexStore::open(dir, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_commit_makes_documents_visible() {
        let dir = TempDir::new().unwrap();
        let store = open(dir.path());
        let mut batch = Batch::new();
        batch.push_document(analyzed("/a.txt", "quarterly results"));
        batch.push_document(analyzed("/b.txt", "quarterly plan"));

        let outcome = store.writer().unwrap().commit(&batch).unwrap();
        assert_eq!(outcome.doc_ids, vec![1, 2]);
        assert_eq!(outcome.generation, 1);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.live_count(), 2);
        assert_eq!(snapshot.postings("quarterly").unwrap().len(), 2);
        assert_eq!(snapshot.document_by_path("/b.txt").unwrap().id, 2);
    }

    #[test]
    fn test_replacing_a_path_tombstones_old_document() {
        let dir = TempDir::new().unwrap();
        let store = open(dir.path());
        let mut batch = Batch::new();
        batch.push_document(analyzed("/a.txt", "old words"));
        store.writer().unwrap().commit(&batch).unwrap();

        let mut batch = Batch::new();
        batch.push_document(analyzed("/a.txt", "new words"));
        let outcome = store.writer().unwrap().commit(&batch).unwrap();
        assert_eq!(outcome.tombstoned, 1);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.live_count(), 1);
        assert!(snapshot.postings("old").unwrap().is_empty());
        assert_eq!(snapshot.postings("words").unwrap().len(), 1);
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = open(dir.path());
        let before = store.snapshot().manifest().clone();
        store.writer().unwrap().commit(&Batch::new()).unwrap();
        assert_eq!(store.snapshot().manifest(), &before);
    }

    #[test]
    fn test_reopen_preserves_state_and_removes_orphans() {
        let dir = TempDir::new().unwrap();
        {
            let store = open(dir.path());
            let mut batch = Batch::new();
            batch.push_document(analyzed("/a.txt", "quarterly"));
            store.writer().unwrap().commit(&batch).unwrap();
        }
        let orphan = dir.path().join(segment_file_name(99));
        fs::write(&orphan, b"partial").unwrap();

        let store = open(dir.path());
        assert_eq!(store.snapshot().live_count(), 1);
        assert!(!orphan.exists());
    }

    #[test]
    fn test_damaged_referenced_segment_fails_open() {
        let dir = TempDir::new().unwrap();
        {
            let store = open(dir.path());
            let mut batch = Batch::new();
            batch.push_document(analyzed("/a.txt", "quarterly"));
            store.writer().unwrap().commit(&batch).unwrap();
        }
        fs::write(dir.path().join(segment_file_name(1)), b"trunc").unwrap();

        let err = IndexStore::open(dir.path(), Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, FiledexError::CorruptIndex(_)));

        let store = IndexStore::recover(dir.path(), Duration::from_secs(1)).unwrap();
        assert_eq!(store.snapshot().live_count(), 0);
        assert!(store.snapshot().manifest().next_doc_id > 1);
    }

    #[test]
    fn test_compaction_reclaims_tombstones() {
        let dir = TempDir::new().unwrap();
        let store = open(dir.path());
        let mut batch = Batch::new();
        batch.push_document(analyzed("/a.txt", "alpha beta"));
        batch.push_document(analyzed("/b.txt", "gamma delta"));
        store.writer().unwrap().commit(&batch).unwrap();

        let mut batch = Batch::new();
        batch.push_deletion(2);
        store.writer().unwrap().commit(&batch).unwrap();
        assert!(store.needs_compaction(0.3));

        let before = store.stats();
        let outcome = store.writer().unwrap().compact().unwrap().unwrap();
        assert_eq!(outcome.reclaimed, 1);
        assert!(outcome.bytes_after <= before.bytes);

        let snapshot = store.snapshot();
        assert!(snapshot.tombstones().is_empty());
        assert_eq!(snapshot.live_count(), 1);
        assert_eq!(snapshot.document(1).unwrap().path, "/a.txt");
        assert!(snapshot.terms_matching(|t| t == "gamma").is_empty());
        assert!(!dir.path().join(segment_file_name(1)).exists());

        assert!(store.writer().unwrap().compact().unwrap().is_none());
    }

    #[test]
    fn test_clear_drops_everything_but_keeps_counters() {
        let dir = TempDir::new().unwrap();
        let store = open(dir.path());
        let mut batch = Batch::new();
        batch.push_document(analyzed("/a.txt", "alpha"));
        store.writer().unwrap().commit(&batch).unwrap();

        store.writer().unwrap().clear().unwrap();
        assert_eq!(store.stats().documents, 0);
        assert_eq!(store.stats().segments, 0);
        assert!(!dir.path().join(segment_file_name(1)).exists());

        let mut batch = Batch::new();
        batch.push_document(analyzed("/b.txt", "beta"));
        let outcome = store.writer().unwrap().commit(&batch).unwrap();
        assert_eq!(outcome.doc_ids, vec![2]);
    }

    #[test]
    fn test_failed_segment_write_does_not_reuse_its_id() {
        let dir = TempDir::new().unwrap();
        let store = open(dir.path());
        let blocker = dir.path().join(segment_file_name(1));
        fs::create_dir(&blocker).unwrap();

        let mut batch = Batch::new();
        batch.push_document(analyzed("/a.txt", "alpha"));
        let err = store.writer().unwrap().commit(&batch).unwrap_err();
        assert!(matches!(err, FiledexError::Commit(_)));
        assert!(err.is_batch_scoped());
        assert_eq!(store.stats().documents, 0);

        let outcome = store.writer().unwrap().commit(&batch).unwrap();
        assert_eq!(outcome.segment.map(|s| s.id), Some(2));

        // The blocker is not a segment file and survives reopening.
        drop(store);
        let store = open(dir.path());
        assert!(blocker.is_dir());
        assert_eq!(store.stats().documents, 1);
        assert_eq!(store.snapshot().postings("alpha").unwrap().len(), 1);
    }

    #[test]
    fn test_writer_lock_times_out() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::open(dir.path(), Duration::from_millis(20)).unwrap();
        let _held = store.writer().unwrap();
        assert!(matches!(
            store.writer(),
            Err(FiledexError::ConcurrencyTimeout(_))
        ));
    }
}
