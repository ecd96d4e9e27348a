//! Lazy directory walk over the configured roots.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use ignore::overrides::{Override, OverrideBuilder};
use ignore::{Walk, WalkBuilder};

use crate::config::IndexerConfig;
use crate::document::FileStat;
use crate::error::{FiledexError, Result};

/// Options controlling which paths a walk yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkOptions {
    pub exclude_patterns: Vec<String>,
    pub ignore_hidden: bool,
    /// Directories never descended into (the index directory).
    pub skip_dirs: Vec<PathBuf>,
}

impl WalkOptions {
    pub fn from_config(config: &IndexerConfig) -> Self {
        WalkOptions {
            exclude_patterns: config.exclude_patterns.clone(),
            ignore_hidden: config.ignore_hidden,
            skip_dirs: normalize_roots(std::slice::from_ref(&config.index_dir)),
        }
    }

    fn overrides(&self) -> Result<Override> {
        let mut builder = OverrideBuilder::new("/");
        for pattern in &self.exclude_patterns {
            builder.add(&format!("!{pattern}")).map_err(|e| {
                FiledexError::config(format!("invalid exclude pattern {pattern:?}: {e}"))
            })?;
        }
        builder
            .build()
            .map_err(|e| FiledexError::config(format!("invalid exclude patterns: {e}")))
    }
}

/// One item produced by a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkEntry {
    /// A regular file and its metadata.
    File(FileStat),
    /// A path that could not be read. `path` is absent when the error did
    /// not name one.
    Unreadable {
        path: Option<PathBuf>,
        reason: String,
    },
}

/// Make roots absolute, resolving symlinks where possible.
pub fn normalize_roots(roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut normalized: Vec<PathBuf> = roots
        .iter()
        .map(|root| {
            fs::canonicalize(root)
                .or_else(|_| std::path::absolute(root))
                .unwrap_or_else(|_| root.clone())
        })
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized
}

/// Whether `path` lies under one of `roots`.
pub fn in_scope(roots: &[PathBuf], path: &Path) -> bool {
    roots.iter().any(|root| path.starts_with(root))
}

/// Iterator over the regular files below a set of roots.
///
/// Symlinks are never followed. Excluded and (optionally) hidden entries
/// are pruned together with everything below them. Files come out in a
/// deterministic order, so constructing a new walker restarts the same
/// sequence.
pub struct Walker {
    inner: Option<Walk>,
    pending: VecDeque<WalkEntry>,
}

impl Walker {
    /// Create a walker over already-normalized roots.
    pub fn new(roots: &[PathBuf], options: &WalkOptions) -> Result<Walker> {
        let mut pending = VecDeque::new();
        let existing: Vec<&PathBuf> = roots
            .iter()
            .filter(|root| {
                let ok = root.is_dir();
                if !ok {
                    pending.push_back(WalkEntry::Unreadable {
                        path: Some((*root).clone()),
                        reason: "root is not a readable directory".to_string(),
                    });
                }
                ok
            })
            .collect();

        let inner = match existing.split_first() {
            None => None,
            Some((first, rest)) => {
                let mut builder = WalkBuilder::new(first);
                for root in rest {
                    builder.add(root);
                }
                builder
                    .standard_filters(false)
                    .hidden(options.ignore_hidden)
                    .follow_links(false)
                    .overrides(options.overrides()?)
                    .sort_by_file_name(|a, b| a.cmp(b));
                if !options.skip_dirs.is_empty() {
                    let skip = options.skip_dirs.clone();
                    builder.filter_entry(move |entry| {
                        !skip.iter().any(|dir| entry.path().starts_with(dir))
                    });
                }
                Some(builder.build())
            }
        };

        Ok(Walker { inner, pending })
    }
}

impl Iterator for Walker {
    type Item = WalkEntry;

    fn next(&mut self) -> Option<WalkEntry> {
        if let Some(entry) = self.pending.pop_front() {
            return Some(entry);
        }
        let walk = self.inner.as_mut()?;

        for result in walk.by_ref() {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    log::warn!("walk error: {err}");
                    return Some(WalkEntry::Unreadable {
                        path: error_path(&err),
                        reason: err.to_string(),
                    });
                }
            };

            let Some(file_type) = entry.file_type() else {
                continue;
            };
            if !file_type.is_file() {
                // Directories are descended into; symlinks and special files
                // are skipped.
                continue;
            }

            return Some(match entry.metadata() {
                Ok(metadata) => WalkEntry::File(FileStat::from_metadata(entry.path(), &metadata)),
                Err(err) => WalkEntry::Unreadable {
                    path: Some(entry.path().to_path_buf()),
                    reason: err.to_string(),
                },
            });
        }

        self.inner = None;
        None
    }
}

fn error_path(err: &ignore::Error) -> Option<PathBuf> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.clone()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            error_path(err)
        }
        ignore::Error::Loop { child, .. } => Some(child.clone()),
        ignore::Error::Partial(errs) => errs.iter().find_map(error_path),
        _ => None,
    }
}
