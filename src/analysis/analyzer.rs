//! Per-field analysis of documents and query terms.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::analysis::tokenizer::{FilenameTokenizer, Tokenizer, UnicodeWordTokenizer};
use crate::document::{Document, Field, TermEntry};

/// Applies the right tokenizer to each [`Field`].
///
/// Cloning is cheap; the tokenizers are shared.
#[derive(Clone)]
pub struct Analyzer {
    content: Arc<dyn Tokenizer>,
    filename: Arc<dyn Tokenizer>,
}

impl Default for Analyzer {
    fn default() -> Self {
        Analyzer {
            content: Arc::new(UnicodeWordTokenizer::new()),
            filename: Arc::new(FilenameTokenizer::new()),
        }
    }
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("content", &self.content.name())
            .field("filename", &self.filename.name())
            .finish()
    }
}

impl Analyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the tokenizer used for one field.
    pub fn with_tokenizer(mut self, field: Field, tokenizer: Arc<dyn Tokenizer>) -> Self {
        match field {
            Field::Filename => self.filename = tokenizer,
            Field::Content => self.content = tokenizer,
        }
        self
    }

    fn tokenizer(&self, field: Field) -> &dyn Tokenizer {
        match field {
            Field::Filename => self.filename.as_ref(),
            Field::Content => self.content.as_ref(),
        }
    }

    /// Normalized terms of `text` as they would be indexed in `field`, in
    /// order, duplicates kept.
    pub fn terms(&self, field: Field, text: &str) -> Vec<String> {
        self.tokenizer(field).tokenize(text).map(|t| t.text).collect()
    }

    /// Build the term entries of a document. `content` is the full extracted
    /// text, which may be longer than what the document itself stores.
    pub fn analyze(&self, document: &Document, content: &str) -> Vec<TermEntry> {
        let mut entries = Vec::new();
        for (field, text) in [
            (Field::Filename, document.filename.as_str()),
            (Field::Content, content),
        ] {
            let mut by_term: BTreeMap<String, Vec<u32>> = BTreeMap::new();
            for token in self.tokenizer(field).tokenize(text) {
                by_term.entry(token.text).or_default().push(token.position);
            }
            entries.extend(by_term.into_iter().map(|(term, positions)| TermEntry {
                term,
                field,
                positions,
            }));
        }
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::FileStat;
    use chrono::Utc;
    use std::path::PathBuf;

    #[test]
    fn test_analyze_document() {
        let stat = FileStat {
            path: PathBuf::from("/docs/report_2024.docx"),
            size: 10,
            modified: Utc::now(),
            created: Utc::now(),
        };
        let document = Document::from_stat(&stat);
        let entries = Analyzer::new().analyze(&document, "Quarterly results, quarterly plan");

        let filename_terms: Vec<&str> = entries
            .iter()
            .filter(|e| e.field == Field::Filename)
            .map(|e| e.term.as_str())
            .collect();
        assert_eq!(filename_terms, vec!["2024", "docx", "report"]);

        let quarterly = entries
            .iter()
            .find(|e| e.field == Field::Content && e.term == "quarterly")
            .unwrap();
        assert_eq!(quarterly.positions, vec![0, 2]);
    }

    #[test]
    fn test_query_terms_match_index_terms() {
        let analyzer = Analyzer::new();
        assert_eq!(analyzer.terms(Field::Content, "Quarterly"), vec!["quarterly"]);
        assert_eq!(
            analyzer.terms(Field::Filename, "report_2024"),
            vec!["report", "2024"]
        );
    }
}
