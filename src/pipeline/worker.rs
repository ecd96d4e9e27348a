//! Per-file ingestion: checksum, extraction and analysis.

use std::sync::Arc;

use crate::analysis::Analyzer;
use crate::change::{failed_checksum, file_checksum, metadata_checksum};
use crate::document::{AnalyzedDocument, Document, FileStat};
use crate::error::FiledexError;
use crate::extract::{ExtractOutcome, ExtractorRegistry};

/// A file handed to the worker pool.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub stat: FileStat,
    /// Checksum of the committed version when only a content change
    /// should lead to a new document.
    pub verify_against: Option<String>,
}

/// Result of processing one file.
#[derive(Debug)]
pub enum WorkOutcome {
    /// Document ready for commit.
    Indexed(AnalyzedDocument),
    /// Extraction or hashing failed; the document is metadata-only and
    /// carries a failed checksum so the next update retries it.
    Failed(AnalyzedDocument, FiledexError),
    /// Content checksum equals the committed one.
    Unchanged,
}

/// Turns files into analyzed documents. Shared by all worker threads.
#[derive(Debug, Clone)]
pub struct Worker {
    registry: Arc<ExtractorRegistry>,
    analyzer: Analyzer,
    max_file_size: u64,
}

impl Worker {
    pub fn new(registry: Arc<ExtractorRegistry>, analyzer: Analyzer, max_file_size: u64) -> Self {
        Worker {
            registry,
            analyzer,
            max_file_size,
        }
    }

    pub fn process(&self, item: WorkItem) -> WorkOutcome {
        let stat = item.stat;
        let mut document = Document::from_stat(&stat);

        if stat.size > self.max_file_size {
            log::debug!(
                "{} exceeds {} bytes, indexing metadata only",
                document.path,
                self.max_file_size
            );
            document.checksum = metadata_checksum(&stat);
            return WorkOutcome::Indexed(self.finish(document));
        }

        let checksum = match file_checksum(&stat.path) {
            Ok(checksum) => checksum,
            Err(err) => {
                document.checksum = failed_checksum(&metadata_checksum(&stat));
                return WorkOutcome::Failed(self.finish(document), err);
            }
        };
        if item.verify_against.as_deref() == Some(checksum.as_str()) {
            log::debug!("{}: content unchanged", document.path);
            return WorkOutcome::Unchanged;
        }
        document.checksum = checksum;

        match self.registry.extract(&stat.path) {
            Ok(ExtractOutcome::Text(text)) => {
                document.content = text;
                WorkOutcome::Indexed(self.finish(document))
            }
            Ok(ExtractOutcome::Unsupported) => WorkOutcome::Indexed(self.finish(document)),
            Err(err) => {
                document.checksum = failed_checksum(&document.checksum);
                WorkOutcome::Failed(self.finish(document), err)
            }
        }
    }

    fn finish(&self, document: Document) -> AnalyzedDocument {
        let terms = self.analyzer.analyze(&document, &document.content);
        AnalyzedDocument { document, terms }
    }
}

/// Human-readable reason of a per-file failure.
pub fn failure_reason(err: &FiledexError) -> String {
    match err {
        FiledexError::Extraction { reason, .. } => reason.clone(),
        FiledexError::Checksum { source, .. } => source.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Field;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn worker(max_file_size: u64) -> Worker {
        Worker::new(
            Arc::new(ExtractorRegistry::with_defaults(Duration::from_secs(5))),
            Analyzer::new(),
            max_file_size,
        )
    }

    fn item(path: &std::path::Path, verify_against: Option<String>) -> WorkItem {
        WorkItem {
            stat: FileStat::read(path).unwrap(),
            verify_against,
        }
    }

    #[test]
    fn test_text_file_is_indexed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("draft.txt");
        fs::write(&path, "quarterly plan").unwrap();

        match worker(1024).process(item(&path, None)) {
            WorkOutcome::Indexed(analyzed) => {
                assert_eq!(analyzed.document.content, "quarterly plan");
                assert_eq!(analyzed.document.checksum.len(), 64);
                assert!(
                    analyzed
                        .terms
                        .iter()
                        .any(|t| t.field == Field::Content && t.term == "plan")
                );
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_oversized_file_is_metadata_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.txt");
        fs::write(&path, "0123456789").unwrap();

        match worker(5).process(item(&path, None)) {
            WorkOutcome::Indexed(analyzed) => {
                assert!(analyzed.document.content.is_empty());
                assert!(analyzed.document.checksum.starts_with("meta:"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_type_keeps_filename_terms() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report_2024.docx");
        fs::write(&path, "binary").unwrap();

        match worker(1024).process(item(&path, None)) {
            WorkOutcome::Indexed(analyzed) => {
                assert!(analyzed.document.content.is_empty());
                assert!(analyzed.terms.iter().any(|t| t.term == "report"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_matching_checksum_is_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "same").unwrap();
        let checksum = file_checksum(&path).unwrap();

        assert!(matches!(
            worker(1024).process(item(&path, Some(checksum))),
            WorkOutcome::Unchanged
        ));
    }

    #[test]
    fn test_vanished_file_fails_but_yields_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone.txt");
        fs::write(&path, "x").unwrap();
        let work = item(&path, None);
        fs::remove_file(&path).unwrap();

        match worker(1024).process(work) {
            WorkOutcome::Failed(analyzed, err) => {
                assert!(err.is_per_file());
                assert_eq!(analyzed.document.filename, "gone.txt");
                assert!(analyzed.document.checksum.starts_with("failed:meta:"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
