//! Command line argument parsing for the filedex CLI using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// filedex - incremental full-text search for local files
#[derive(Parser, Debug, Clone)]
#[command(name = "filedex")]
#[command(about = "Index local files and search them by content, name, size and date")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct FiledexArgs {
    /// Increase log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human", global = true)]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Index directory (overrides the configuration file)
    #[arg(long, env = "FILEDEX_INDEX_DIR", value_name = "DIR", global = true)]
    pub index_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long, env = "FILEDEX_CONFIG", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl FiledexArgs {
    /// 0 = errors only, 1 = warnings (default), 2 = info, 3+ = debug.
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose.saturating_add(1)
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Re-index everything below the roots
    Rebuild(BuildArgs),

    /// Index what changed below the roots since the last build
    Update(BuildArgs),

    /// Search the index
    Search(SearchArgs),

    /// Merge segments and reclaim deleted documents
    Compact,

    /// Show index statistics
    Stats,

    /// Keep the index up to date until stdin is closed
    Watch(WatchArgs),
}

/// Arguments for rebuild and update
#[derive(Parser, Debug, Clone)]
pub struct BuildArgs {
    /// Root directories (defaults to the configured roots)
    #[arg(value_name = "ROOT")]
    pub roots: Vec<PathBuf>,

    /// Print progress events to stderr
    #[arg(long)]
    pub progress: bool,
}

/// Arguments for searching
#[derive(Parser, Debug, Clone)]
pub struct SearchArgs {
    /// Query expression, e.g. `quarterly NOT draft`, `"exact phrase"`,
    /// `repo*`, `qurterly~2`, `size>10MB`, `modified:>2024-01-31`, `ext:pdf`
    #[arg(value_name = "QUERY", required = true, num_args = 1..)]
    pub query: Vec<String>,

    /// Only these extensions (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub ext: Vec<String>,

    /// Minimum size, e.g. 10KB
    #[arg(long, value_name = "SIZE")]
    pub min_size: Option<String>,

    /// Maximum size, e.g. 2MB
    #[arg(long, value_name = "SIZE")]
    pub max_size: Option<String>,

    /// Modified on or after this day (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub after: Option<String>,

    /// Modified before this day (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub before: Option<String>,

    /// Maximum number of results (capped by the configured result cap)
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Treat the query as free text instead of an expression
    #[arg(long)]
    pub natural: bool,
}

/// Arguments for watching
#[derive(Parser, Debug, Clone)]
pub struct WatchArgs {
    /// Root directories (defaults to the configured roots)
    #[arg(value_name = "ROOT")]
    pub roots: Vec<PathBuf>,

    /// Seconds between updates (defaults to the configured interval)
    #[arg(long, value_name = "SECONDS")]
    pub interval: Option<u64>,

    /// Rely on the timer only, without filesystem notifications
    #[arg(long)]
    pub no_notify: bool,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable format
    Human,
    /// JSON format
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        let args = FiledexArgs::parse_from(["filedex", "stats"]);
        assert_eq!(args.verbosity(), 1);
        let args = FiledexArgs::parse_from(["filedex", "-vv", "stats"]);
        assert_eq!(args.verbosity(), 3);
        let args = FiledexArgs::parse_from(["filedex", "stats", "-q", "-v"]);
        assert_eq!(args.verbosity(), 0);
    }

    #[test]
    fn test_search_args() {
        let args = FiledexArgs::parse_from([
            "filedex", "search", "quarterly", "NOT", "draft", "--ext", "pdf,docx", "--limit", "5",
        ]);
        match args.command {
            Command::Search(search) => {
                assert_eq!(search.query.join(" "), "quarterly NOT draft");
                assert_eq!(search.ext, vec!["pdf", "docx"]);
                assert_eq!(search.limit, Some(5));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
