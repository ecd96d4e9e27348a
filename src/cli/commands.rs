//! Command implementations for the filedex CLI.

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use notify_debouncer_full::notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_full::{
    DebounceEventResult, DebouncedEvent, Debouncer, FileIdMap, new_debouncer,
};

use crate::cli::args::*;
use crate::cli::output::*;
use crate::config::IndexerConfig;
use crate::engine::{Engine, Scheduler, SchedulerHandle};
use crate::error::{FiledexError, Result};
use crate::event::{IndexEvent, IndexReport};
use crate::query::SearchFilters;
use crate::query::parser::{day_start, parse_date, parse_size};

/// Execute a CLI command.
pub fn execute_command(args: FiledexArgs) -> Result<()> {
    let config = load_config(&args)?;
    match &args.command {
        Command::Rebuild(build_args) => build(config, build_args, &args, true),
        Command::Update(build_args) => build(config, build_args, &args, false),
        Command::Search(search_args) => search(config, search_args, &args),
        Command::Compact => compact(config, &args),
        Command::Stats => {
            let engine = Engine::open(config)?;
            output_result(&engine.stats(), &args)
        }
        Command::Watch(watch_args) => watch(config, watch_args),
    }
}

/// Configuration file (if any) with command line overrides applied.
pub fn load_config(args: &FiledexArgs) -> Result<IndexerConfig> {
    let mut config = match &args.config {
        Some(path) => IndexerConfig::from_json_file(path)?,
        None => IndexerConfig::default(),
    };
    if let Some(dir) = &args.index_dir {
        config.index_dir = dir.clone();
    }
    config.validate()?;
    Ok(config)
}

fn build(
    config: IndexerConfig,
    build_args: &BuildArgs,
    cli_args: &FiledexArgs,
    rebuild: bool,
) -> Result<()> {
    let engine = Engine::open(config)?;
    let progress = build_args.progress.then(|| ProgressPrinter::start(engine.subscribe()));

    let result = if rebuild {
        engine.rebuild(&build_args.roots)
    } else {
        engine.update(&build_args.roots)
    };

    if let Some(printer) = progress {
        printer.finish();
    }
    let report: IndexReport = result?;
    output_result(&report, cli_args)
}

fn search(config: IndexerConfig, search_args: &SearchArgs, cli_args: &FiledexArgs) -> Result<()> {
    let engine = Engine::open(config)?;
    let query = search_args.query.join(" ");
    let start = Instant::now();

    let hits = if search_args.natural {
        engine.search_natural(&query, None, search_args.limit)?
    } else {
        let filters = search_filters(search_args)?;
        engine.search(&query, &filters, search_args.limit)?
    };

    let results = SearchResults {
        query,
        total_hits: hits.len(),
        duration_ms: start.elapsed().as_millis() as u64,
        hits,
    };
    output_result(&results, cli_args)
}

/// Structured filters from the search flags.
pub fn search_filters(search_args: &SearchArgs) -> Result<SearchFilters> {
    let mut filters = SearchFilters::new().with_extensions(&search_args.ext);
    if let Some(size) = &search_args.min_size {
        filters = filters.with_min_size(parse_size(size, 0)?);
    }
    if let Some(size) = &search_args.max_size {
        filters = filters.with_max_size(parse_size(size, 0)?);
    }
    if let Some(date) = &search_args.after {
        filters = filters.with_modified_after(day_start(parse_date(date, 0)?));
    }
    if let Some(date) = &search_args.before {
        filters = filters.with_modified_before(day_start(parse_date(date, 0)?));
    }
    Ok(filters)
}

fn compact(config: IndexerConfig, cli_args: &FiledexArgs) -> Result<()> {
    let engine = Engine::open(config)?;
    let start = Instant::now();
    let outcome = engine.compact()?;
    let result = CompactionResult {
        compacted: outcome.is_some(),
        outcome,
        duration_ms: start.elapsed().as_millis() as u64,
    };
    output_result(&result, cli_args)
}

fn watch(config: IndexerConfig, watch_args: &WatchArgs) -> Result<()> {
    let roots = if watch_args.roots.is_empty() {
        config.roots.clone()
    } else {
        watch_args.roots.clone()
    };
    if roots.is_empty() {
        return Err(FiledexError::config("no roots to watch"));
    }
    let interval = watch_args
        .interval
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.update_interval());

    let engine = Arc::new(Engine::open(config)?);
    let index_dir = engine.store().dir().to_path_buf();
    let scheduler = Scheduler::start(Arc::clone(&engine), roots.clone(), interval)?;
    scheduler.trigger();

    let _watcher = if watch_args.no_notify {
        None
    } else {
        match start_watcher(&roots, index_dir, scheduler.handle()) {
            Ok(watcher) => Some(watcher),
            Err(err) => {
                log::warn!("filesystem notifications unavailable, using the timer only: {err}");
                None
            }
        }
    };

    eprintln!("watching {} root(s); press Enter to update now, Ctrl-D to stop", roots.len());
    for line in io::stdin().lock().lines() {
        match line {
            Ok(line) if line.trim() == "q" => break,
            Ok(_) => scheduler.trigger(),
            Err(_) => break,
        }
    }
    scheduler.stop();
    Ok(())
}

/// Quiet period before a burst of filesystem events becomes one hint.
const WATCH_DEBOUNCE: Duration = Duration::from_millis(500);

/// Forward debounced filesystem notifications below `roots` to the
/// scheduler as hints.
fn start_watcher(
    roots: &[PathBuf],
    index_dir: PathBuf,
    scheduler: SchedulerHandle,
) -> Result<Debouncer<RecommendedWatcher, FileIdMap>> {
    let mut debouncer = new_debouncer(WATCH_DEBOUNCE, None, move |result: DebounceEventResult| {
        match result {
            Ok(events) => {
                let paths = changed_paths(&events, &index_dir);
                if !paths.is_empty() {
                    scheduler.hint(paths);
                }
            }
            Err(errors) => {
                for err in errors {
                    log::debug!("watch error: {err}");
                }
            }
        }
    })
    .map_err(|e| FiledexError::other(format!("failed to create filesystem watcher: {e}")))?;

    for root in roots {
        debouncer
            .watcher()
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| FiledexError::other(format!("failed to watch {}: {e}", root.display())))?;
    }
    Ok(debouncer)
}

/// Paths touched by non-access events, outside the index directory.
fn changed_paths(events: &[DebouncedEvent], index_dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = events
        .iter()
        .filter(|event| !matches!(event.kind, EventKind::Access(_)))
        .flat_map(|event| event.paths.iter())
        .filter(|path| !path.starts_with(index_dir))
        .cloned()
        .collect();
    paths.sort();
    paths.dedup();
    paths
}

/// Prints build events to stderr while a build runs.
struct ProgressPrinter {
    done: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

impl ProgressPrinter {
    fn start(events: Receiver<IndexEvent>) -> Self {
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        let handle = thread::spawn(move || {
            loop {
                match events.recv_timeout(Duration::from_millis(100)) {
                    Ok(event) => eprintln!("{}", describe_event(&event)),
                    Err(RecvTimeoutError::Timeout) if flag.load(Ordering::Acquire) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => return,
                }
            }
            for event in events.try_iter() {
                eprintln!("{}", describe_event(&event));
            }
        });
        ProgressPrinter { done, handle }
    }

    fn finish(self) {
        self.done.store(true, Ordering::Release);
        let _ = self.handle.join();
    }
}
