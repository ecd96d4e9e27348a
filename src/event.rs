//! Progress and event stream for index builds.
//!
//! The engine never renders anything; it publishes [`IndexEvent`]s to any
//! number of subscribers. Each subscriber gets its own bounded channel and a
//! subscriber that falls behind loses events instead of slowing the build.

use std::path::PathBuf;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::Mutex;
use serde::Serialize;

use crate::pipeline::BuildMode;

/// Default capacity of a subscriber channel.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 1024;

/// Phases of an index build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Walking roots and classifying paths.
    Scan,
    /// Extracting, tokenizing and committing documents.
    Ingest,
    /// Merging segments.
    Compact,
}

/// Running counters of a build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressCounts {
    /// Paths discovered by the walk.
    pub scanned: u64,

    /// Files whose text was extracted (or indexed metadata-only by policy).
    pub extracted: u64,

    /// Files whose extraction or hashing failed.
    pub failed: u64,

    /// Documents made visible by committed batches.
    pub committed: u64,

    /// Documents tombstoned because their path disappeared.
    pub deleted: u64,

    /// Files skipped because they did not change.
    pub unchanged: u64,
}

/// Summary of one `rebuild` or `update` run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexReport {
    pub mode: BuildMode,
    pub counts: ProgressCounts,
    /// Segments written by this run, compaction output included.
    pub segments_written: u64,
    /// Batches dropped after their commit retries ran out.
    pub failed_batches: u64,
    pub compacted: bool,
    /// Manifest generation after the run.
    pub generation: u64,
    pub elapsed_ms: u64,
}

/// Events published while the engine works.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum IndexEvent {
    PhaseStarted { phase: Phase, mode: BuildMode },
    Progress(ProgressCounts),
    FileFailed { path: PathBuf, reason: String },
    BatchCommitted { segment: Option<u64>, documents: usize, tombstones: usize },
    /// A batch ran out of commit retries and was dropped. Its files are
    /// picked up again by the next update.
    BatchFailed { documents: usize, deletions: usize, reason: String },
    Compacted { segments_before: usize, bytes_before: u64, bytes_after: u64 },
    Finished(IndexReport),
}

/// Fan-out of events to bounded subscriber channels.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<IndexEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber with a channel of the given capacity.
    pub fn subscribe(&self, capacity: usize) -> Receiver<IndexEvent> {
        let (tx, rx) = bounded(capacity.max(1));
        self.subscribers.lock().push(tx);
        rx
    }

    /// Publish an event without blocking. Full channels drop the event;
    /// disconnected subscribers are forgotten.
    pub fn emit(&self, event: IndexEvent) {
        let mut subscribers = self.subscribers.lock();
        if subscribers.is_empty() {
            return;
        }
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::trace!("event subscriber lagging, event dropped");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_subscriber_drops_events() {
        let bus = EventBus::new();
        let rx = bus.subscribe(1);

        bus.emit(IndexEvent::Progress(ProgressCounts::default()));
        bus.emit(IndexEvent::Progress(ProgressCounts {
            scanned: 5,
            ..Default::default()
        }));

        assert_eq!(
            rx.try_recv().unwrap(),
            IndexEvent::Progress(ProgressCounts::default())
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_disconnected_subscriber_removed() {
        let bus = EventBus::new();
        let rx = bus.subscribe(4);
        let _kept = bus.subscribe(4);
        drop(rx);

        bus.emit(IndexEvent::PhaseStarted {
            phase: Phase::Scan,
            mode: BuildMode::Update,
        });
        assert_eq!(bus.subscriber_count(), 1);
    }
}
