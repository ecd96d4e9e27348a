//! Engine configuration.
//!
//! [`IndexerConfig`] holds every value the indexing core consumes. How the
//! values are obtained is up to the caller; JSON files are supported out of
//! the box through [`IndexerConfig::from_json_file`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ignore::overrides::OverrideBuilder;
use serde::{Deserialize, Serialize};

use crate::error::{FiledexError, Result};

/// Configuration for an [`Engine`](crate::engine::Engine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Directory holding segment files and the manifest.
    pub index_dir: PathBuf,

    /// Root directories scanned by `rebuild`/`update` when no roots are given.
    pub roots: Vec<PathBuf>,

    /// Glob patterns excluded from the walk. Patterns without a `/` match
    /// file or directory names anywhere below a root.
    pub exclude_patterns: Vec<String>,

    /// Files larger than this (bytes) are indexed metadata-only.
    pub max_file_size: u64,

    /// Interval between scheduled incremental updates, in seconds.
    pub update_interval_secs: u64,

    /// Number of extraction worker threads.
    pub extraction_threads: usize,

    /// Time budget for one file's extraction, in seconds.
    pub extraction_timeout_secs: u64,

    /// Timed-out extractions allowed to keep running in the background.
    /// Once this many are stalled, further files fail extraction at once.
    pub max_stalled_extractions: usize,

    /// Documents accumulated before a segment is written.
    pub commit_batch_size: usize,

    /// Tombstone/live ratio above which a commit triggers compaction.
    pub compaction_ratio: f64,

    /// Upper bound on the number of results a search returns.
    pub result_cap: usize,

    /// Capacity of the walk -> worker queue.
    pub work_queue_capacity: usize,

    /// Capacity of the worker -> committer queue.
    pub commit_queue_capacity: usize,

    /// Attempts made for a failing batch commit before giving up.
    pub commit_retries: u32,

    /// Initial backoff between commit attempts, in milliseconds (doubles).
    pub commit_backoff_ms: u64,

    /// Budget for acquiring the single-writer lock, in milliseconds.
    pub lock_timeout_ms: u64,

    /// Edit distance used by `word~` without an explicit distance.
    pub fuzzy_distance: u32,

    /// Skip dot-files and dot-directories.
    pub ignore_hidden: bool,

    /// Always confirm unchanged files with a full content checksum.
    pub verify_checksums: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        IndexerConfig {
            index_dir: PathBuf::from(".filedex"),
            roots: Vec::new(),
            exclude_patterns: [
                "*.tmp",
                "*.log",
                "*.cache",
                "*.pyc",
                "__pycache__",
                ".git",
                ".DS_Store",
                "Thumbs.db",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
            max_file_size: 100 * 1024 * 1024,
            update_interval_secs: 300,
            extraction_threads: num_cpus::get().clamp(1, 4),
            extraction_timeout_secs: 30,
            max_stalled_extractions: 4,
            commit_batch_size: 256,
            compaction_ratio: 0.3,
            result_cap: 500,
            work_queue_capacity: 1024,
            commit_queue_capacity: 256,
            commit_retries: 3,
            commit_backoff_ms: 100,
            lock_timeout_ms: 5000,
            fuzzy_distance: 2,
            ignore_hidden: true,
            verify_checksums: false,
        }
    }
}

impl IndexerConfig {
    /// Create a configuration with defaults and the given index directory.
    pub fn new<P: Into<PathBuf>>(index_dir: P) -> Self {
        IndexerConfig {
            index_dir: index_dir.into(),
            ..Default::default()
        }
    }

    /// Load a configuration from a JSON file. Missing keys take defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref()).map_err(|e| {
            FiledexError::config(format!(
                "failed to read {}: {e}",
                path.as_ref().display()
            ))
        })?;
        let config: IndexerConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw)?;
        Ok(())
    }

    /// Check the values for consistency.
    pub fn validate(&self) -> Result<()> {
        if self.extraction_threads == 0 {
            return Err(FiledexError::config("extraction_threads must be positive"));
        }
        if self.commit_batch_size == 0 {
            return Err(FiledexError::config("commit_batch_size must be positive"));
        }
        if self.work_queue_capacity == 0 || self.commit_queue_capacity == 0 {
            return Err(FiledexError::config("queue capacities must be positive"));
        }
        if self.result_cap == 0 {
            return Err(FiledexError::config("result_cap must be positive"));
        }
        if !(self.compaction_ratio > 0.0 && self.compaction_ratio <= 1.0) {
            return Err(FiledexError::config(format!(
                "compaction_ratio must be in (0, 1], got {}",
                self.compaction_ratio
            )));
        }
        let mut builder = OverrideBuilder::new("/");
        for pattern in &self.exclude_patterns {
            builder.add(&format!("!{pattern}")).map_err(|e| {
                FiledexError::config(format!("invalid exclude pattern {pattern:?}: {e}"))
            })?;
        }
        Ok(())
    }

    pub fn with_roots<I, P>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.roots = roots.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_exclude_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn with_extraction_threads(mut self, threads: usize) -> Self {
        self.extraction_threads = threads;
        self
    }

    pub fn with_commit_batch_size(mut self, size: usize) -> Self {
        self.commit_batch_size = size;
        self
    }

    pub fn with_compaction_ratio(mut self, ratio: f64) -> Self {
        self.compaction_ratio = ratio;
        self
    }

    pub fn with_result_cap(mut self, cap: usize) -> Self {
        self.result_cap = cap;
        self
    }

    pub fn with_extraction_timeout(mut self, timeout: Duration) -> Self {
        self.extraction_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_ignore_hidden(mut self, ignore_hidden: bool) -> Self {
        self.ignore_hidden = ignore_hidden;
        self
    }

    pub fn with_verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    /// Extraction slots: one per worker plus the stalled allowance.
    pub fn extraction_slots(&self) -> usize {
        self.extraction_threads + self.max_stalled_extractions
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }

    pub fn commit_backoff(&self) -> Duration {
        Duration::from_millis(self.commit_backoff_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
