//! The single consumer of the commit queue.

use std::thread;
use std::time::Duration;

use crate::document::{AnalyzedDocument, DocId};
use crate::error::Result;
use crate::event::{EventBus, IndexEvent};
use crate::pipeline::Progress;
use crate::pipeline::cancel::CancelHandle;
use crate::store::{Batch, CommitOutcome, IndexStore};

/// Message on the commit queue.
#[derive(Debug)]
pub enum CommitItem {
    Document(Box<AnalyzedDocument>),
    Delete(DocId),
}

/// Batches commit items and writes them to the store.
pub struct Committer<'a> {
    store: &'a IndexStore,
    events: &'a EventBus,
    progress: &'a Progress,
    cancel: &'a CancelHandle,
    batch_size: usize,
    retries: u32,
    backoff: Duration,
    batch: Batch,
    segments_written: u64,
    failed_batches: u64,
}

impl<'a> Committer<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: &'a IndexStore,
        events: &'a EventBus,
        progress: &'a Progress,
        cancel: &'a CancelHandle,
        batch_size: usize,
        retries: u32,
        backoff: Duration,
    ) -> Self {
        Committer {
            store,
            events,
            progress,
            cancel,
            batch_size: batch_size.max(1),
            retries,
            backoff,
            batch: Batch::new(),
            segments_written: 0,
            failed_batches: 0,
        }
    }

    /// Add an item, committing the batch once it is full.
    pub fn push(&mut self, item: CommitItem) -> Result<()> {
        match item {
            CommitItem::Document(document) => self.batch.push_document(*document),
            CommitItem::Delete(id) => self.batch.push_deletion(id),
        }
        if self.batch.is_full(self.batch_size) {
            self.flush()?;
        }
        Ok(())
    }

    /// Commit whatever is pending. Nothing is written once cancellation has
    /// been requested.
    ///
    /// A batch that still fails after its retries is dropped and reported
    /// with a `BatchFailed` event; the build goes on with the next batch.
    /// Errors that are not scoped to the batch end the build.
    pub fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        self.cancel.check("index build cancelled between batches")?;

        let batch = std::mem::take(&mut self.batch);
        match self.commit_with_retry(&batch) {
            Ok(outcome) => {
                let documents = outcome.doc_ids.len();
                if outcome.segment.is_some() {
                    self.segments_written += 1;
                }
                self.progress.add_committed(documents as u64);
                self.progress.add_deleted(batch.deletions.len() as u64);
                self.events.emit(IndexEvent::BatchCommitted {
                    segment: outcome.segment.map(|s| s.id),
                    documents,
                    tombstones: outcome.tombstoned,
                });
            }
            Err(err) if err.is_batch_scoped() => {
                self.failed_batches += 1;
                self.events.emit(IndexEvent::BatchFailed {
                    documents: batch.documents.len(),
                    deletions: batch.deletions.len(),
                    reason: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
        self.events.emit(IndexEvent::Progress(self.progress.counts()));
        Ok(())
    }

    fn commit_with_retry(&self, batch: &Batch) -> Result<CommitOutcome> {
        let mut attempt = 0u32;
        loop {
            let result = self
                .store
                .writer()
                .and_then(|mut writer| writer.commit(batch));
            match result {
                Ok(outcome) => return Ok(outcome),
                Err(err) if err.is_retryable() && attempt < self.retries => {
                    let delay = self.backoff * 2u32.saturating_pow(attempt);
                    attempt += 1;
                    log::warn!(
                        "commit attempt {attempt} of {} failed: {err}; retrying in {delay:?}",
                        self.retries + 1
                    );
                    thread::sleep(delay);
                }
                Err(err) => {
                    log::error!("batch of {} items not committed: {err}", batch.len());
                    return Err(err);
                }
            }
        }
    }

    pub fn segments_written(&self) -> u64 {
        self.segments_written
    }

    pub fn failed_batches(&self) -> u64 {
        self.failed_batches
    }
}
