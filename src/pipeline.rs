//! Ingestion pipeline.
//!
//! ```text
//! walk thread --(work queue)--> N worker threads --(commit queue)--> committer
//!      \________________________ deletions ________________________/
//! ```
//!
//! Both queues are bounded: the walk blocks when workers fall behind and
//! workers block when the committer does. The committer runs on the thread
//! that called [`Pipeline::run`] and is the only writer to the store.
//! Per-file failures become `FileFailed` events and metadata-only documents.
//! A batch that still fails to commit after the configured retries becomes a
//! `BatchFailed` event and the run continues; only errors that leave the
//! store unusable end it.

pub mod cancel;
pub mod committer;
pub mod worker;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, bounded};
use serde::Serialize;

use crate::analysis::Analyzer;
use crate::change::{Change, ChangeDetector, WalkEntry, WalkOptions, Walker, normalize_roots};
use crate::config::IndexerConfig;
use crate::error::{FiledexError, Result};
use crate::event::{EventBus, IndexEvent, IndexReport, Phase, ProgressCounts};
use crate::extract::ExtractorRegistry;
use crate::store::IndexStore;

pub use cancel::CancelHandle;
pub use committer::{CommitItem, Committer};
pub use worker::{WorkItem, WorkOutcome, Worker};

/// Kind of index build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// Re-index every file and drop everything not found.
    Rebuild,
    /// Only process what changed since the last build.
    Update,
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildMode::Rebuild => write!(f, "rebuild"),
            BuildMode::Update => write!(f, "update"),
        }
    }
}

/// Counters shared by the pipeline threads.
#[derive(Debug, Default)]
pub struct Progress {
    scanned: AtomicU64,
    extracted: AtomicU64,
    failed: AtomicU64,
    committed: AtomicU64,
    deleted: AtomicU64,
    unchanged: AtomicU64,
}

impl Progress {
    pub fn add_scanned(&self, n: u64) {
        self.scanned.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_extracted(&self, n: u64) {
        self.extracted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_failed(&self, n: u64) {
        self.failed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_committed(&self, n: u64) {
        self.committed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_deleted(&self, n: u64) {
        self.deleted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_unchanged(&self, n: u64) {
        self.unchanged.fetch_add(n, Ordering::Relaxed);
    }

    pub fn counts(&self) -> ProgressCounts {
        ProgressCounts {
            scanned: self.scanned.load(Ordering::Relaxed),
            extracted: self.extracted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
        }
    }
}

/// One index build over a set of roots.
pub struct Pipeline<'a> {
    config: &'a IndexerConfig,
    store: &'a IndexStore,
    registry: Arc<ExtractorRegistry>,
    analyzer: Analyzer,
    events: Arc<EventBus>,
    cancel: CancelHandle,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a IndexerConfig,
        store: &'a IndexStore,
        registry: Arc<ExtractorRegistry>,
        analyzer: Analyzer,
        events: Arc<EventBus>,
        cancel: CancelHandle,
    ) -> Self {
        Pipeline {
            config,
            store,
            registry,
            analyzer,
            events,
            cancel,
        }
    }

    /// Run a build to completion, cancellation or the first fatal error.
    pub fn run(&self, mode: BuildMode, roots: &[PathBuf]) -> Result<IndexReport> {
        let started = Instant::now();
        let roots = normalize_roots(roots);
        let walker = Walker::new(&roots, &WalkOptions::from_config(self.config))?;
        let detector = ChangeDetector::new(
            self.store.snapshot(),
            mode,
            roots.clone(),
            self.config.verify_checksums,
        );
        let progress = Arc::new(Progress::default());

        log::info!("{mode} started over {} root(s)", roots.len());
        self.events.emit(IndexEvent::PhaseStarted {
            phase: Phase::Scan,
            mode,
        });
        self.events.emit(IndexEvent::PhaseStarted {
            phase: Phase::Ingest,
            mode,
        });

        let (work_tx, work_rx) = bounded::<WorkItem>(self.config.work_queue_capacity);
        let (commit_tx, commit_rx) = bounded::<CommitItem>(self.config.commit_queue_capacity);

        let mut handles = Vec::with_capacity(self.config.extraction_threads + 1);
        handles.push(spawn_walker(
            walker,
            detector,
            work_tx,
            commit_tx.clone(),
            Arc::clone(&progress),
            self.cancel.clone(),
        )?);
        let worker = Worker::new(
            Arc::clone(&self.registry),
            self.analyzer.clone(),
            self.config.max_file_size,
        );
        for worker_id in 0..self.config.extraction_threads {
            handles.push(spawn_worker(
                worker_id,
                worker.clone(),
                work_rx.clone(),
                commit_tx.clone(),
                Arc::clone(&progress),
                Arc::clone(&self.events),
                self.cancel.clone(),
            )?);
        }
        drop(work_rx);
        drop(commit_tx);

        let mut committer = Committer::new(
            self.store,
            &self.events,
            &progress,
            &self.cancel,
            self.config.commit_batch_size,
            self.config.commit_retries,
            self.config.commit_backoff(),
        );
        let drained = drain(&mut committer, &commit_rx);
        // Producers blocked on a full queue see the disconnect and stop.
        drop(commit_rx);
        for handle in handles {
            let name = handle.thread().name().unwrap_or("pipeline").to_string();
            if handle.join().is_err() {
                log::error!("{name} thread panicked");
            }
        }

        if let Err(err) = drained {
            log::warn!("{mode} stopped: {err}");
            self.events.emit(IndexEvent::Progress(progress.counts()));
            return Err(err);
        }
        if self.cancel.is_cancelled() {
            self.events.emit(IndexEvent::Progress(progress.counts()));
            return Err(FiledexError::cancelled(format!("{mode} cancelled")));
        }

        let failed_batches = committer.failed_batches();
        let mut segments_written = committer.segments_written();
        let mut compacted = false;
        if mode == BuildMode::Rebuild || self.store.needs_compaction(self.config.compaction_ratio) {
            self.events.emit(IndexEvent::PhaseStarted {
                phase: Phase::Compact,
                mode,
            });
            if let Some(outcome) = self.store.writer()?.compact()? {
                compacted = true;
                segments_written += u64::from(outcome.segment.is_some());
                self.events.emit(IndexEvent::Compacted {
                    segments_before: outcome.segments_before,
                    bytes_before: outcome.bytes_before,
                    bytes_after: outcome.bytes_after,
                });
            }
        }

        let counts = progress.counts();
        let report = IndexReport {
            mode,
            counts,
            segments_written,
            failed_batches,
            compacted,
            generation: self.store.snapshot().generation(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        log::info!(
            "{mode} finished: {} scanned, {} committed, {} deleted, {} unchanged, {} failed, {} failed batches in {} ms",
            counts.scanned,
            counts.committed,
            counts.deleted,
            counts.unchanged,
            counts.failed,
            failed_batches,
            report.elapsed_ms
        );
        self.events.emit(IndexEvent::Progress(counts));
        self.events.emit(IndexEvent::Finished(report.clone()));
        Ok(report)
    }
}

fn drain(committer: &mut Committer<'_>, commit_rx: &Receiver<CommitItem>) -> Result<()> {
    for item in commit_rx.iter() {
        committer.push(item)?;
    }
    committer.flush()
}

fn spawn_walker(
    walker: Walker,
    mut detector: ChangeDetector,
    work_tx: Sender<WorkItem>,
    commit_tx: Sender<CommitItem>,
    progress: Arc<Progress>,
    cancel: CancelHandle,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("filedex-walk".to_string())
        .spawn(move || {
            for entry in walker {
                if cancel.is_cancelled() {
                    log::debug!("walk stopped by cancellation");
                    return;
                }
                if matches!(entry, WalkEntry::File(_)) {
                    progress.add_scanned(1);
                }
                let Some(change) = detector.classify(entry) else {
                    continue;
                };
                let sent = match change {
                    Change::New(stat) | Change::Modified { stat, .. } => work_tx
                        .send(WorkItem {
                            stat,
                            verify_against: None,
                        })
                        .is_ok(),
                    Change::Unverified { stat, checksum, .. } => work_tx
                        .send(WorkItem {
                            stat,
                            verify_against: Some(checksum),
                        })
                        .is_ok(),
                    Change::Unchanged { .. } => {
                        progress.add_unchanged(1);
                        true
                    }
                    Change::Deleted { previous, .. } => {
                        commit_tx.send(CommitItem::Delete(previous)).is_ok()
                    }
                };
                if !sent {
                    return;
                }
            }
            drop(work_tx);

            for change in detector.finish() {
                if let Change::Deleted { path, previous } = change {
                    log::debug!("{path} no longer exists");
                    if commit_tx.send(CommitItem::Delete(previous)).is_err() {
                        return;
                    }
                }
            }
        })?;
    Ok(handle)
}

fn spawn_worker(
    worker_id: usize,
    worker: Worker,
    work_rx: Receiver<WorkItem>,
    commit_tx: Sender<CommitItem>,
    progress: Arc<Progress>,
    events: Arc<EventBus>,
    cancel: CancelHandle,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name(format!("filedex-worker-{worker_id}"))
        .spawn(move || {
            for item in work_rx.iter() {
                if cancel.is_cancelled() {
                    break;
                }
                let document = match worker.process(item) {
                    WorkOutcome::Indexed(document) => {
                        progress.add_extracted(1);
                        document
                    }
                    WorkOutcome::Failed(document, err) => {
                        progress.add_failed(1);
                        log::warn!("{}: {err}", document.document.path);
                        events.emit(IndexEvent::FileFailed {
                            path: PathBuf::from(&document.document.path),
                            reason: worker::failure_reason(&err),
                        });
                        document
                    }
                    WorkOutcome::Unchanged => {
                        progress.add_unchanged(1);
                        continue;
                    }
                };
                if commit_tx
                    .send(CommitItem::Document(Box::new(document)))
                    .is_err()
                {
                    break;
                }
            }
        })?;
    Ok(handle)
}
