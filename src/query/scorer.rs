//! Relevance scoring and result ordering.

use std::cmp::Ordering;

use crate::document::{Document, Field};

/// Log-scaled tf-idf with a per-field weight.
#[derive(Debug, Clone, Copy)]
pub struct TermScorer {
    /// Live documents in the snapshot.
    total_docs: u64,
}

impl TermScorer {
    pub fn new(total_docs: u64) -> Self {
        TermScorer { total_docs }
    }

    /// `ln(1 + N / df)`; zero when nothing matches.
    pub fn idf(&self, doc_freq: u64) -> f32 {
        if doc_freq == 0 || self.total_docs == 0 {
            return 0.0;
        }
        (1.0 + self.total_docs as f32 / doc_freq as f32).ln()
    }

    /// Score of `term_freq` occurrences in `field` of a term with
    /// document frequency `doc_freq`.
    pub fn score(&self, field: Field, term_freq: usize, doc_freq: u64) -> f32 {
        if term_freq == 0 {
            return 0.0;
        }
        (1.0 + (term_freq as f32).ln()) * self.idf(doc_freq) * field.weight()
    }
}

/// Damping applied to terms reached through an edit distance.
pub fn fuzzy_boost(distance: usize) -> f32 {
    1.0 / (1.0 + distance as f32)
}

/// Score descending, then most recently modified, then path.
pub fn compare_hits(a: (f32, &Document), b: (f32, &Document)) -> Ordering {
    b.0.partial_cmp(&a.0)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.1.modified.cmp(&a.1.modified))
        .then_with(|| a.1.path.cmp(&b.1.path))
}
