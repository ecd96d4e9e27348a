//! The indexing engine.
//!
//! An [`Engine`] owns one index directory and everything needed to build and
//! query it. There is no global state: tests and embedders may open as many
//! independent engines as they like.
//!
//! # Examples
//!
//! ```no_run
//! use filedex::config::IndexerConfig;
//! use filedex::engine::Engine;
//! use filedex::query::SearchFilters;
//!
//! # fn main() -> filedex::error::Result<()> {
//! let config = IndexerConfig::new("/tmp/filedex-index").with_roots(["/home/me/docs"]);
//! let engine = Engine::open(config)?;
//! engine.update(&[])?;
//!
//! for hit in engine.search("quarterly NOT draft", &SearchFilters::default(), Some(10))? {
//!     println!("{:.2} {}", hit.score, hit.document.path);
//! }
//! # Ok(())
//! # }
//! ```

pub mod scheduler;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::Receiver;
use parking_lot::Mutex;

use crate::analysis::Analyzer;
use crate::config::IndexerConfig;
use crate::error::{FiledexError, Result};
use crate::event::{DEFAULT_SUBSCRIBER_CAPACITY, EventBus, IndexEvent, IndexReport};
use crate::extract::ExtractorRegistry;
use crate::pipeline::{BuildMode, CancelHandle, Pipeline};
use crate::query::{QueryEngine, SearchFilters, SearchHit};
use crate::store::{CompactionOutcome, IndexStats, IndexStore, Snapshot};
use crate::translate::{QueryTranslator, Translation, fallback_translation};

pub use scheduler::{Scheduler, SchedulerHandle};

/// Indexing and search over one index directory.
pub struct Engine {
    config: IndexerConfig,
    store: IndexStore,
    registry: Arc<ExtractorRegistry>,
    analyzer: Analyzer,
    query: QueryEngine,
    events: Arc<EventBus>,
    cancel: CancelHandle,
    /// Serializes rebuild/update runs.
    build_lock: Mutex<()>,
    needs_rebuild: AtomicBool,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("index_dir", &self.config.index_dir)
            .field("needs_rebuild", &self.needs_rebuild())
            .finish()
    }
}

impl Engine {
    /// Open (or create) the index with the default extractors.
    pub fn open(config: IndexerConfig) -> Result<Engine> {
        let registry = ExtractorRegistry::with_defaults(config.extraction_timeout());
        Self::open_with_registry(config, registry)
    }

    /// Open (or create) the index with a caller-supplied extractor registry.
    ///
    /// A damaged index is reset to empty and the next [`update`](Self::update)
    /// runs as a full rebuild. The registry's extraction slots are sized from
    /// the configuration.
    pub fn open_with_registry(
        config: IndexerConfig,
        mut registry: ExtractorRegistry,
    ) -> Result<Engine> {
        config.validate()?;
        registry.set_slots(config.extraction_slots());
        let (store, needs_rebuild) = match IndexStore::open(&config.index_dir, config.lock_timeout())
        {
            Ok(store) => (store, false),
            Err(FiledexError::CorruptIndex(reason)) => {
                log::error!(
                    "index at {} is damaged ({reason}); it will be rebuilt",
                    config.index_dir.display()
                );
                (
                    IndexStore::recover(&config.index_dir, config.lock_timeout())?,
                    true,
                )
            }
            Err(err) => return Err(err),
        };

        let analyzer = Analyzer::new();
        let query = QueryEngine::new(analyzer.clone(), config.fuzzy_distance, config.result_cap);
        log::info!(
            "opened index {} ({} documents)",
            config.index_dir.display(),
            store.snapshot().live_count()
        );

        Ok(Engine {
            config,
            store,
            registry: Arc::new(registry),
            analyzer,
            query,
            events: Arc::new(EventBus::new()),
            cancel: CancelHandle::new(),
            build_lock: Mutex::new(()),
            needs_rebuild: AtomicBool::new(needs_rebuild),
        })
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn registry(&self) -> &ExtractorRegistry {
        &self.registry
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.store.snapshot()
    }

    /// Whether the index was found damaged and has not been rebuilt yet.
    pub fn needs_rebuild(&self) -> bool {
        self.needs_rebuild.load(Ordering::Acquire)
    }

    /// Re-index everything below `roots` (the configured roots when empty)
    /// and drop every document not found.
    pub fn rebuild(&self, roots: &[PathBuf]) -> Result<IndexReport> {
        self.build(BuildMode::Rebuild, roots)
    }

    /// Index what changed below `roots` (the configured roots when empty)
    /// since the last build.
    pub fn update(&self, roots: &[PathBuf]) -> Result<IndexReport> {
        let mode = if self.needs_rebuild() {
            log::info!("running a full rebuild in place of the update");
            BuildMode::Rebuild
        } else {
            BuildMode::Update
        };
        self.build(mode, roots)
    }

    fn build(&self, mode: BuildMode, roots: &[PathBuf]) -> Result<IndexReport> {
        let roots = if roots.is_empty() {
            self.config.roots.clone()
        } else {
            roots.to_vec()
        };
        if roots.is_empty() {
            return Err(FiledexError::config("no roots to index"));
        }

        let _guard = self.build_lock.lock();
        self.cancel.reset();
        let pipeline = Pipeline::new(
            &self.config,
            &self.store,
            Arc::clone(&self.registry),
            self.analyzer.clone(),
            Arc::clone(&self.events),
            self.cancel.clone(),
        );
        let report = pipeline.run(mode, &roots)?;
        if mode == BuildMode::Rebuild {
            self.needs_rebuild.store(false, Ordering::Release);
        }
        Ok(report)
    }

    /// Run a query expression with structured filters.
    ///
    /// `limit` defaults to, and is capped by, the configured result cap.
    pub fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: Option<usize>,
    ) -> Result<Vec<SearchHit>> {
        let snapshot = self.store.snapshot();
        self.query.search(&snapshot, query, filters, limit)
    }

    /// Search with free text, asking `translator` for a query first.
    ///
    /// Without a translator, or when it fails or returns nothing usable, the
    /// text is searched as an OR of its words (or as a phrase when quoted).
    pub fn search_natural(
        &self,
        text: &str,
        translator: Option<&dyn QueryTranslator>,
        limit: Option<usize>,
    ) -> Result<Vec<SearchHit>> {
        if let Some(translation) = translator.and_then(|t| self.translate(t, text)) {
            match self.search(&translation.query, &translation.filters, limit) {
                Err(FiledexError::QuerySyntax { message, position }) => {
                    log::warn!(
                        "translated query {:?} rejected at {position}: {message}",
                        translation.query
                    );
                }
                result => return result,
            }
        }
        let fallback = fallback_translation(&self.analyzer, text);
        self.search(&fallback.query, &fallback.filters, limit)
    }

    fn translate(&self, translator: &dyn QueryTranslator, text: &str) -> Option<Translation> {
        match translator.translate(text) {
            Ok(Some(translation)) if !translation.is_empty() => {
                log::debug!("{} translated {text:?} to {:?}", translator.name(), translation.query);
                Some(translation)
            }
            Ok(_) => None,
            Err(err) => {
                log::warn!("{} failed: {err}", translator.name());
                None
            }
        }
    }

    /// Merge all segments and drop tombstoned documents.
    pub fn compact(&self) -> Result<Option<CompactionOutcome>> {
        let outcome = self.store.writer()?.compact()?;
        if let Some(outcome) = &outcome {
            self.events.emit(IndexEvent::Compacted {
                segments_before: outcome.segments_before,
                bytes_before: outcome.bytes_before,
                bytes_after: outcome.bytes_after,
            });
        }
        Ok(outcome)
    }

    /// Drop every document from the index. Id counters keep increasing.
    pub fn clear(&self) -> Result<()> {
        let _guard = self.build_lock.lock();
        self.store.writer()?.clear()
    }

    pub fn stats(&self) -> IndexStats {
        self.store.stats()
    }

    /// Receive build events. Slow receivers lose events instead of stalling
    /// the build.
    pub fn subscribe(&self) -> Receiver<IndexEvent> {
        self.events.subscribe(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    pub fn subscribe_with_capacity(&self, capacity: usize) -> Receiver<IndexEvent> {
        self.events.subscribe(capacity)
    }

    /// Handle that cancels the build currently running.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }
}
