//! Output formatting for CLI commands.

use std::fmt::Write as _;

use serde::Serialize;

use crate::cli::args::{FiledexArgs, OutputFormat};
use crate::error::Result;
use crate::event::{IndexEvent, IndexReport};
use crate::query::SearchHit;
use crate::store::{CompactionOutcome, IndexStats};

/// Result structure for search operations.
#[derive(Debug, Serialize)]
pub struct SearchResults {
    pub query: String,
    pub total_hits: usize,
    pub duration_ms: u64,
    pub hits: Vec<SearchHit>,
}

/// Result structure for compaction.
#[derive(Debug, Serialize)]
pub struct CompactionResult {
    pub compacted: bool,
    pub outcome: Option<CompactionOutcome>,
    pub duration_ms: u64,
}

/// Values the CLI can print for people.
pub trait HumanOutput {
    fn render_human(&self, verbosity: u8) -> String;
}

/// Output a result in the selected format.
pub fn output_result<T: Serialize + HumanOutput>(result: &T, args: &FiledexArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => print!("{}", result.render_human(args.verbosity())),
        OutputFormat::Json => {
            let json = if args.pretty {
                serde_json::to_string_pretty(result)?
            } else {
                serde_json::to_string(result)?
            };
            println!("{json}");
        }
    }
    Ok(())
}

impl HumanOutput for SearchResults {
    fn render_human(&self, verbosity: u8) -> String {
        let mut out = String::new();
        if self.hits.is_empty() {
            let _ = writeln!(out, "No results for {:?}", self.query);
            return out;
        }
        for (i, hit) in self.hits.iter().enumerate() {
            let doc = &hit.document;
            let _ = writeln!(out, "{:>3}. {}", i + 1, doc.path);
            let _ = writeln!(
                out,
                "     {}  modified {}  score {:.3}",
                format_size(doc.size),
                doc.modified.format("%Y-%m-%d %H:%M"),
                hit.score
            );
            if verbosity > 1 && !hit.preview.is_empty() {
                for line in hit.preview.lines() {
                    let _ = writeln!(out, "     | {line}");
                }
            }
        }
        let _ = writeln!(
            out,
            "\n{} result(s) in {} ms",
            self.total_hits, self.duration_ms
        );
        out
    }
}

impl HumanOutput for IndexReport {
    fn render_human(&self, _verbosity: u8) -> String {
        let c = &self.counts;
        let mut out = String::new();
        let _ = writeln!(out, "{} finished in {} ms", self.mode, self.elapsed_ms);
        let _ = writeln!(out, "  scanned:   {}", c.scanned);
        let _ = writeln!(out, "  extracted: {}", c.extracted);
        let _ = writeln!(out, "  failed:    {}", c.failed);
        let _ = writeln!(out, "  committed: {}", c.committed);
        let _ = writeln!(out, "  deleted:   {}", c.deleted);
        let _ = writeln!(out, "  unchanged: {}", c.unchanged);
        let _ = writeln!(
            out,
            "  segments written: {}{}",
            self.segments_written,
            if self.compacted { " (compacted)" } else { "" }
        );
        if self.failed_batches > 0 {
            let _ = writeln!(
                out,
                "  failed batches: {} (retried on the next update)",
                self.failed_batches
            );
        }
        out
    }
}

impl HumanOutput for IndexStats {
    fn render_human(&self, _verbosity: u8) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "documents:      {}", self.documents);
        let _ = writeln!(out, "tombstones:     {}", self.tombstones);
        let _ = writeln!(out, "segments:       {}", self.segments);
        let _ = writeln!(out, "size:           {}", format_size(self.bytes));
        let _ = writeln!(out, "generation:     {}", self.generation);
        let _ = writeln!(out, "deletion ratio: {:.3}", self.deletion_ratio);
        out
    }
}

impl HumanOutput for CompactionResult {
    fn render_human(&self, _verbosity: u8) -> String {
        match &self.outcome {
            Some(outcome) => format!(
                "compacted {} segment(s): {} -> {} ({} documents kept, {} reclaimed) in {} ms\n",
                outcome.segments_before,
                format_size(outcome.bytes_before),
                format_size(outcome.bytes_after),
                outcome.documents,
                outcome.reclaimed,
                self.duration_ms
            ),
            None => "nothing to compact\n".to_string(),
        }
    }
}

/// One line describing a build event, for `--progress`.
pub fn describe_event(event: &IndexEvent) -> String {
    match event {
        IndexEvent::PhaseStarted { phase, mode } => format!("[{mode}] {phase:?} started"),
        IndexEvent::Progress(c) => format!(
            "scanned {} extracted {} failed {} committed {} deleted {} unchanged {}",
            c.scanned, c.extracted, c.failed, c.committed, c.deleted, c.unchanged
        ),
        IndexEvent::FileFailed { path, reason } => format!("failed {}: {reason}", path.display()),
        IndexEvent::BatchCommitted {
            segment,
            documents,
            tombstones,
        } => match segment {
            Some(id) => format!("segment {id}: {documents} documents, {tombstones} tombstones"),
            None => format!("{tombstones} tombstones"),
        },
        IndexEvent::BatchFailed {
            documents,
            deletions,
            reason,
        } => format!("batch of {documents} documents, {deletions} deletions dropped: {reason}"),
        IndexEvent::Compacted {
            segments_before,
            bytes_before,
            bytes_after,
        } => format!(
            "compacted {segments_before} segment(s): {} -> {}",
            format_size(*bytes_before),
            format_size(*bytes_after)
        ),
        IndexEvent::Finished(report) => format!(
            "[{}] finished: {} committed in {} ms",
            report.mode, report.counts.committed, report.elapsed_ms
        ),
    }
}

/// Binary-unit size, e.g. `1.5 MB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
