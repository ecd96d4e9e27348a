//! Immutable read view of the index.
//!
//! A [`Snapshot`] pairs a manifest with the segment readers it references.
//! Queries take one at start and keep using it; commits and compactions
//! publish a new snapshot instead of changing an existing one.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::document::{DocId, Document};
use crate::error::Result;
use crate::store::manifest::Manifest;
use crate::store::segment::{Posting, SegmentReader};

#[derive(Debug, Default)]
pub struct Snapshot {
    manifest: Manifest,
    segments: Vec<Arc<SegmentReader>>,
    /// Live document id -> (segment index, document index).
    live: HashMap<DocId, (usize, usize)>,
    by_path: HashMap<String, DocId>,
}

impl Snapshot {
    pub fn new(manifest: Manifest, segments: Vec<Arc<SegmentReader>>) -> Self {
        let mut live = HashMap::new();
        let mut by_path = HashMap::new();
        for (seg_idx, segment) in segments.iter().enumerate() {
            for (doc_idx, document) in segment.documents().iter().enumerate() {
                if manifest.tombstones.contains(&document.id) {
                    continue;
                }
                live.insert(document.id, (seg_idx, doc_idx));
                if let Some(previous) = by_path.insert(document.path.clone(), document.id) {
                    log::warn!(
                        "path {} live twice (documents {previous} and {})",
                        document.path,
                        document.id
                    );
                }
            }
        }
        Snapshot {
            manifest,
            segments,
            live,
            by_path,
        }
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn generation(&self) -> u64 {
        self.manifest.generation
    }

    pub fn segments(&self) -> &[Arc<SegmentReader>] {
        &self.segments
    }

    pub fn tombstones(&self) -> &BTreeSet<DocId> {
        &self.manifest.tombstones
    }

    pub fn is_live(&self, id: DocId) -> bool {
        self.live.contains_key(&id)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn document(&self, id: DocId) -> Option<&Document> {
        let &(seg_idx, doc_idx) = self.live.get(&id)?;
        self.segments[seg_idx].documents().get(doc_idx)
    }

    pub fn document_by_path(&self, path: &str) -> Option<&Document> {
        self.by_path.get(path).and_then(|id| self.document(*id))
    }

    /// Live documents, in no particular order.
    pub fn live_documents(&self) -> impl Iterator<Item = &Document> + '_ {
        self.live
            .values()
            .filter_map(|&(seg_idx, doc_idx)| self.segments[seg_idx].documents().get(doc_idx))
    }

    /// Sorted ids of all live documents.
    pub fn live_ids(&self) -> Vec<DocId> {
        let mut ids: Vec<DocId> = self.live.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Postings of `term` across all segments, tombstones removed, sorted by
    /// document id.
    pub fn postings(&self, term: &str) -> Result<Vec<Posting>> {
        let mut merged = Vec::new();
        for segment in &self.segments {
            merged.extend(
                segment
                    .postings(term)?
                    .into_iter()
                    .filter(|p| self.is_live(p.doc)),
            );
        }
        merged.sort_by(|a, b| (a.doc, a.field).cmp(&(b.doc, b.field)));
        Ok(merged)
    }

    /// Distinct dictionary terms accepted by `predicate`, sorted.
    pub fn terms_matching<F>(&self, mut predicate: F) -> Vec<String>
    where
        F: FnMut(&str) -> bool,
    {
        let mut terms = BTreeSet::new();
        for segment in &self.segments {
            for term in segment.terms() {
                if !terms.contains(term) && predicate(term) {
                    terms.insert(term.to_string());
                }
            }
        }
        terms.into_iter().collect()
    }

    /// Distinct dictionary terms starting with `prefix` and accepted by
    /// `predicate`, sorted.
    pub fn terms_with_prefix<F>(&self, prefix: &str, mut predicate: F) -> Vec<String>
    where
        F: FnMut(&str) -> bool,
    {
        let mut terms = BTreeSet::new();
        for segment in &self.segments {
            for term in segment.terms_with_prefix(prefix) {
                if !terms.contains(term) && predicate(term) {
                    terms.insert(term.to_string());
                }
            }
        }
        terms.into_iter().collect()
    }
}
