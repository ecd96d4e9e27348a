//! Content extraction registry.
//!
//! Extractors turn a file into plain text. They are registered per
//! extension; looking one up is a single hash lookup on the lower-cased
//! extension. A file whose extension has no extractor is not an error: the
//! registry answers [`ExtractOutcome::Unsupported`] and the caller indexes
//! the file metadata-only.
//!
//! Every extraction runs under a time budget on a fixed-size thread pool.
//! An extractor that does not answer in time yields
//! [`FiledexError::Extraction`] with the reason `"timed out"`; its job keeps
//! its slot until it finishes and its result is discarded. When every slot
//! is taken by such stalled jobs, new extractions are refused instead of
//! piling up threads.
//!
//! # Examples
//!
//! ```no_run
//! use std::path::Path;
//! use std::time::Duration;
//!
//! use filedex::extract::{ExtractOutcome, ExtractorRegistry};
//!
//! let registry = ExtractorRegistry::with_defaults(Duration::from_secs(30));
//! match registry.extract(Path::new("notes.md")).unwrap() {
//!     ExtractOutcome::Text(text) => println!("{text}"),
//!     ExtractOutcome::Unsupported => println!("metadata only"),
//! }
//! ```

pub mod markup;
pub mod text;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, bounded};
use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::document::normalize_extension;
use crate::error::{FiledexError, Result};

pub use markup::MarkupExtractor;
pub use text::PlainTextExtractor;

/// Converts files of some set of types to plain text.
pub trait Extractor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Lower-cased extensions (without dot) this extractor handles.
    fn extensions(&self) -> &[&'static str];

    /// Whether this extractor can handle the given extension.
    fn supports(&self, extension: &str) -> bool {
        let extension = extension.to_ascii_lowercase();
        self.extensions().iter().any(|e| *e == extension)
    }

    /// Extract plain text from the file.
    fn extract(&self, path: &Path) -> Result<String>;
}

/// Result of asking the registry to extract a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractOutcome {
    /// Extracted plain text (may be empty).
    Text(String),
    /// No extractor handles this file type.
    Unsupported,
}

/// Extractions that may run at once, stalled ones included, unless
/// configured otherwise.
pub const DEFAULT_EXTRACTION_SLOTS: usize = 8;

/// Bounded pool running extractions. Clones of a registry share it.
struct ExtractionSlots {
    capacity: usize,
    in_flight: AtomicUsize,
    pool: Mutex<Option<Arc<ThreadPool>>>,
}

impl ExtractionSlots {
    fn new(capacity: usize) -> Self {
        ExtractionSlots {
            capacity: capacity.max(1),
            in_flight: AtomicUsize::new(0),
            pool: Mutex::new(None),
        }
    }

    /// Take a slot if one is free.
    fn acquire(self: &Arc<Self>) -> Option<SlotGuard> {
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .ok()
            .map(|_| SlotGuard(Arc::clone(self)))
    }

    /// The pool, built on first use with one thread per slot.
    fn pool(&self) -> std::result::Result<Arc<ThreadPool>, String> {
        let mut pool = self.pool.lock();
        if let Some(pool) = pool.as_ref() {
            return Ok(Arc::clone(pool));
        }
        let built = ThreadPoolBuilder::new()
            .num_threads(self.capacity)
            .thread_name(|i| format!("filedex-extract-{i}"))
            .panic_handler(|_| log::error!("extractor panicked"))
            .build()
            .map_err(|e| format!("failed to start extraction threads: {e}"))?;
        let built = Arc::new(built);
        *pool = Some(Arc::clone(&built));
        Ok(built)
    }

    fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Releases its slot when the job holding it ends, panics included.
struct SlotGuard(Arc<ExtractionSlots>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Maps extensions to extractors.
#[derive(Clone)]
pub struct ExtractorRegistry {
    by_extension: HashMap<String, Arc<dyn Extractor>>,
    timeout: Duration,
    slots: Arc<ExtractionSlots>,
}

impl fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut extensions: Vec<&String> = self.by_extension.keys().collect();
        extensions.sort();
        f.debug_struct("ExtractorRegistry")
            .field("extensions", &extensions)
            .field("timeout", &self.timeout)
            .field("slots", &self.slots.capacity)
            .finish()
    }
}

impl ExtractorRegistry {
    /// An empty registry.
    pub fn new(timeout: Duration) -> Self {
        ExtractorRegistry {
            by_extension: HashMap::new(),
            timeout,
            slots: Arc::new(ExtractionSlots::new(DEFAULT_EXTRACTION_SLOTS)),
        }
    }

    /// Limit the extractions running at once, stalled ones included.
    pub fn with_slots(mut self, slots: usize) -> Self {
        self.set_slots(slots);
        self
    }

    /// Like [`with_slots`](Self::with_slots) on an existing registry.
    /// Extractions already running keep their old slots.
    pub fn set_slots(&mut self, slots: usize) {
        self.slots = Arc::new(ExtractionSlots::new(slots));
    }

    pub fn slots(&self) -> usize {
        self.slots.capacity
    }

    /// Extractions currently holding a slot, timed-out ones included.
    pub fn extractions_in_flight(&self) -> usize {
        self.slots.in_flight()
    }

    /// A registry with the built-in text and markup extractors.
    pub fn with_defaults(timeout: Duration) -> Self {
        let mut registry = Self::new(timeout);
        registry.register(Arc::new(PlainTextExtractor::new()));
        registry.register(Arc::new(MarkupExtractor::new()));
        registry
    }

    /// Register an extractor for every extension it declares. A later
    /// registration for the same extension replaces the earlier one.
    pub fn register(&mut self, extractor: Arc<dyn Extractor>) {
        for extension in extractor.extensions() {
            if let Some(previous) = self
                .by_extension
                .insert(extension.to_ascii_lowercase(), extractor.clone())
            {
                log::debug!(
                    "extractor {} replaces {} for .{extension}",
                    extractor.name(),
                    previous.name()
                );
            }
        }
    }

    /// Find the extractor for an extension (case-insensitive, dot optional).
    pub fn lookup(&self, extension: &str) -> Option<&Arc<dyn Extractor>> {
        let key = extension.trim_start_matches('.').to_ascii_lowercase();
        self.by_extension.get(&key)
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        self.lookup(&normalize_extension(path)).is_some()
    }

    /// Sorted list of registered extensions.
    pub fn supported_extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = self.by_extension.keys().cloned().collect();
        extensions.sort();
        extensions
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Extract a file's text within the time budget.
    pub fn extract(&self, path: &Path) -> Result<ExtractOutcome> {
        let Some(extractor) = self.lookup(&normalize_extension(path)).cloned() else {
            return Ok(ExtractOutcome::Unsupported);
        };

        let Some(slot) = self.slots.acquire() else {
            log::warn!(
                "all {} extraction slots held by stalled extractors, skipping {}",
                self.slots.capacity,
                path.display()
            );
            return Err(FiledexError::extraction(path, "no free extraction slot"));
        };
        let pool = self
            .slots
            .pool()
            .map_err(|reason| FiledexError::extraction(path, reason))?;

        let (tx, rx) = bounded(1);
        let owned_path = path.to_path_buf();
        pool.spawn(move || {
            let _slot = slot;
            let result = extractor.extract(&owned_path);
            // The receiver is gone if the budget already expired.
            let _ = tx.send(result);
        });

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result.map(ExtractOutcome::Text),
            Err(RecvTimeoutError::Timeout) => Err(FiledexError::extraction(path, "timed out")),
            Err(RecvTimeoutError::Disconnected) => {
                Err(FiledexError::extraction(path, "extractor panicked"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::thread;
    use tempfile::TempDir;

    struct SlowExtractor;

    impl Extractor for SlowExtractor {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn extensions(&self) -> &[&'static str] {
            &["slow"]
        }

        fn extract(&self, _path: &Path) -> Result<String> {
            thread::sleep(Duration::from_millis(500));
            Ok("late".to_string())
        }
    }

    #[test]
    fn test_unsupported_is_not_an_error() {
        let registry = ExtractorRegistry::with_defaults(Duration::from_secs(5));
        let outcome = registry.extract(Path::new("/nonexistent/file.docx")).unwrap();
        assert_eq!(outcome, ExtractOutcome::Unsupported);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = ExtractorRegistry::with_defaults(Duration::from_secs(5));
        assert!(registry.lookup("TXT").is_some());
        assert!(registry.lookup(".Md").is_some());
        assert_eq!(registry.lookup("html").unwrap().name(), "markup");
        assert!(registry.is_supported(Path::new("/a/B.JSON")));
    }

    #[test]
    fn test_extract_text_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Notes.TXT");
        fs::write(&path, "hello\tworld").unwrap();

        let registry = ExtractorRegistry::with_defaults(Duration::from_secs(5));
        assert_eq!(
            registry.extract(&path).unwrap(),
            ExtractOutcome::Text("hello world".to_string())
        );
    }

    #[test]
    fn test_timeout_yields_extraction_error() {
        let mut registry = ExtractorRegistry::new(Duration::from_millis(50));
        registry.register(Arc::new(SlowExtractor));

        match registry.extract(Path::new("/tmp/x.slow")) {
            Err(FiledexError::Extraction { reason, .. }) => assert_eq!(reason, "timed out"),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn test_stalled_extractions_are_bounded() {
        let dir = TempDir::new().unwrap();
        let text = dir.path().join("a.txt");
        fs::write(&text, "ready").unwrap();

        let mut registry = ExtractorRegistry::with_defaults(Duration::from_millis(50)).with_slots(1);
        registry.register(Arc::new(SlowExtractor));

        assert!(registry.extract(Path::new("/tmp/x.slow")).is_err());
        assert_eq!(registry.extractions_in_flight(), 1);
        match registry.extract(&text) {
            Err(FiledexError::Extraction { reason, .. }) => {
                assert_eq!(reason, "no free extraction slot")
            }
            other => panic!("expected refusal, got {other:?}"),
        }

        // The stalled job finishes and frees its slot.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while registry.extractions_in_flight() > 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(
            registry.extract(&text).unwrap(),
            ExtractOutcome::Text("ready".to_string())
        );
    }

    #[test]
    fn test_clones_share_slots() {
        let registry = ExtractorRegistry::with_defaults(Duration::from_secs(5)).with_slots(3);
        let clone = registry.clone();
        assert_eq!(clone.slots(), 3);
        assert!(Arc::ptr_eq(&registry.slots, &clone.slots));
    }
}
