use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use filedex::config::IndexerConfig;
use filedex::engine::{Engine, Scheduler};
use filedex::error::{FiledexError, Result};
use filedex::event::{IndexEvent, Phase};
use filedex::extract::{Extractor, ExtractorRegistry};
use filedex::query::SearchFilters;

struct BrokenExtractor;

impl Extractor for BrokenExtractor {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn extensions(&self) -> &[&'static str] {
        &["bad"]
    }

    fn extract(&self, path: &Path) -> Result<String> {
        Err(FiledexError::extraction(path, "unsupported encoding"))
    }
}

struct SlowExtractor(Duration);

impl Extractor for SlowExtractor {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn extensions(&self) -> &[&'static str] {
        &["slow"]
    }

    fn extract(&self, path: &Path) -> Result<String> {
        thread::sleep(self.0);
        Ok(fs::read_to_string(path)?)
    }
}

/// Fails its first extraction, then reads files as text.
#[derive(Default)]
struct FlakyExtractor {
    calls: AtomicUsize,
}

impl Extractor for FlakyExtractor {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn extensions(&self) -> &[&'static str] {
        &["flaky"]
    }

    fn extract(&self, path: &Path) -> Result<String> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(FiledexError::extraction(path, "device busy"));
        }
        Ok(fs::read_to_string(path)?)
    }
}

fn registry_with(extractor: Arc<dyn Extractor>) -> ExtractorRegistry {
    let mut registry = ExtractorRegistry::with_defaults(Duration::from_secs(10));
    registry.register(extractor);
    registry
}

#[test]
fn test_event_sequence_and_failed_files() -> Result<()> {
    let dir = TempDir::new()?;
    let root = dir.path().join("files");
    fs::create_dir_all(&root)?;
    fs::write(root.join("good.txt"), "good text")?;
    fs::write(root.join("broken.bad"), "whatever")?;

    let config = IndexerConfig::new(dir.path().join("index")).with_roots([&root]);
    let engine = Engine::open_with_registry(config, registry_with(Arc::new(BrokenExtractor)))?;
    let events = engine.subscribe();

    let report = engine.rebuild(&[])?;
    assert_eq!(report.counts.failed, 1);
    assert_eq!(report.counts.committed, 2);

    let events: Vec<IndexEvent> = events.try_iter().collect();
    assert!(matches!(
        events.first(),
        Some(IndexEvent::PhaseStarted { phase: Phase::Scan, .. })
    ));
    assert!(matches!(events.last(), Some(IndexEvent::Finished(r)) if *r == report));

    let failed: Vec<&IndexEvent> = events
        .iter()
        .filter(|e| matches!(e, IndexEvent::FileFailed { .. }))
        .collect();
    assert_eq!(failed.len(), 1);
    if let IndexEvent::FileFailed { path, reason } = failed[0] {
        assert!(path.ends_with("broken.bad"));
        assert!(reason.contains("unsupported encoding"));
    }

    let committed: usize = events
        .iter()
        .map(|e| match e {
            IndexEvent::BatchCommitted { documents, .. } => *documents,
            _ => 0,
        })
        .sum();
    assert_eq!(committed, 2);
    assert!(events.iter().any(|e| matches!(e, IndexEvent::PhaseStarted { phase: Phase::Compact, .. })));

    // The failed file is still findable by name, metadata-only.
    let hits = engine.search("broken", &SearchFilters::default(), None)?;
    assert_eq!(hits.len(), 1);
    assert!(hits[0].document.content.is_empty());
    Ok(())
}

#[test]
fn test_cancellation_keeps_committed_batches() -> Result<()> {
    let dir = TempDir::new()?;
    let root = dir.path().join("files");
    fs::create_dir_all(&root)?;
    for i in 0..8 {
        fs::write(root.join(format!("part{i}.slow")), format!("slow part {i}"))?;
    }

    let config = IndexerConfig::new(dir.path().join("index"))
        .with_roots([&root])
        .with_extraction_threads(1)
        .with_commit_batch_size(1);
    let registry = registry_with(Arc::new(SlowExtractor(Duration::from_millis(100))));
    let engine = Arc::new(Engine::open_with_registry(config, registry)?);
    let events = engine.subscribe();

    let builder = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.rebuild(&[]))
    };

    let mut committed = 0usize;
    for event in events.iter() {
        if let IndexEvent::BatchCommitted { documents, .. } = event {
            committed += documents;
            engine.cancel_handle().cancel();
            break;
        }
    }
    let result = builder.join().expect("build thread panicked");
    assert!(matches!(result, Err(FiledexError::Cancelled(_))), "{result:?}");

    committed += events
        .try_iter()
        .map(|e| match e {
            IndexEvent::BatchCommitted { documents, .. } => documents,
            _ => 0,
        })
        .sum::<usize>();
    let stats = engine.stats();
    assert!(stats.documents >= 1);
    assert!(stats.documents < 8);
    assert_eq!(stats.documents, committed as u64);

    // The next update finishes the job.
    let report = engine.update(&[])?;
    assert_eq!(report.counts.committed + stats.documents, 8);
    assert_eq!(engine.stats().documents, 8);
    Ok(())
}

#[test]
fn test_extraction_timeout_is_a_file_failure() -> Result<()> {
    let dir = TempDir::new()?;
    let root = dir.path().join("files");
    fs::create_dir_all(&root)?;
    fs::write(root.join("stuck.slow"), "never read")?;

    let config = IndexerConfig::new(dir.path().join("index")).with_roots([&root]);
    let mut registry = ExtractorRegistry::with_defaults(Duration::from_millis(50));
    registry.register(Arc::new(SlowExtractor(Duration::from_secs(2))));
    let engine = Engine::open_with_registry(config, registry)?;

    let report = engine.rebuild(&[])?;
    assert_eq!(report.counts.failed, 1);
    assert_eq!(engine.stats().documents, 1);
    assert_eq!(engine.search("stuck", &SearchFilters::default(), None)?.len(), 1);
    Ok(())
}

#[test]
fn test_failed_file_is_retried_on_next_update() -> Result<()> {
    let dir = TempDir::new()?;
    let root = dir.path().join("files");
    fs::create_dir_all(&root)?;
    fs::write(root.join("scan.flaky"), "zebra crossing")?;

    let flaky = Arc::new(FlakyExtractor::default());
    let config = IndexerConfig::new(dir.path().join("index")).with_roots([&root]);
    let engine = Engine::open_with_registry(config, registry_with(flaky.clone()))?;

    let first = engine.update(&[])?;
    assert_eq!(first.counts.failed, 1);
    assert_eq!(first.counts.committed, 1);
    assert!(engine.search("zebra", &SearchFilters::default(), None)?.is_empty());

    let second = engine.update(&[])?;
    assert_eq!(second.counts.failed, 0);
    assert_eq!(second.counts.unchanged, 0);
    assert_eq!(second.counts.committed, 1);
    assert_eq!(engine.search("zebra", &SearchFilters::default(), None)?.len(), 1);
    assert_eq!(engine.stats().documents, 1);

    let third = engine.update(&[])?;
    assert_eq!(third.counts.unchanged, 1);
    assert_eq!(third.counts.committed, 0);
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn test_build_without_roots_is_a_config_error() -> Result<()> {
    let dir = TempDir::new()?;
    let engine = Engine::open(IndexerConfig::new(dir.path().join("index")))?;
    assert!(matches!(engine.update(&[]), Err(FiledexError::Config(_))));
    Ok(())
}

fn wait_for(engine: &Engine, documents: u64) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if engine.stats().documents == documents {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    false
}

#[test]
fn test_scheduler_runs_triggered_updates() -> Result<()> {
    let dir = TempDir::new()?;
    let root = dir.path().join("files");
    fs::create_dir_all(&root)?;
    fs::write(root.join("first.txt"), "first")?;

    let config = IndexerConfig::new(dir.path().join("index")).with_roots([&root]);
    let engine = Arc::new(Engine::open(config)?);
    let scheduler = Scheduler::start(Arc::clone(&engine), Vec::new(), Duration::from_secs(3600))?;

    scheduler.trigger();
    assert!(wait_for(&engine, 1));

    let second = root.join("second.txt");
    fs::write(&second, "second")?;
    scheduler.hint(vec![second]);
    assert!(wait_for(&engine, 2));

    scheduler.stop();
    assert!(Scheduler::start(engine, Vec::new(), Duration::ZERO).is_err());
    Ok(())
}
