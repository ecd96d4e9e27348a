//! Query language and execution.
//!
//! A query string is parsed into a [`QueryNode`] tree by [`QueryParser`],
//! combined with any [`SearchFilters`], evaluated by [`QueryExecutor`]
//! against a store snapshot and ranked into [`SearchHit`]s.
//!
//! ```text
//! quarterly NOT draft            boolean, AND is implicit
//! "quarterly results"            phrase
//! repo*  *port*  c?t             wildcards over the term dictionary
//! qurterly~2  word~              fuzzy term (default distance 2)
//! size>10MB  size:1KB..2KB       size filters
//! modified:>2024-01-31  ext:pdf  metadata filters
//! name:report  content:report    single-field terms
//! ```

pub mod ast;
pub mod executor;
pub mod filter;
pub mod parser;
pub mod scorer;

use serde::Serialize;

use crate::analysis::Analyzer;
use crate::document::Document;
use crate::error::Result;
use crate::store::Snapshot;

pub use ast::{DateRange, FieldFilter, QueryNode, SizeRange};
pub use executor::{Matches, QueryExecutor};
pub use filter::SearchFilters;
pub use parser::QueryParser;

/// Lines and characters of content shown with each hit.
pub const PREVIEW_LINES: usize = 5;
pub const PREVIEW_CHARS: usize = 200;

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub document: Document,
    pub score: f32,
    pub preview: String,
}

/// Parses, plans and runs searches.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    parser: QueryParser,
    analyzer: Analyzer,
    result_cap: usize,
}

impl QueryEngine {
    pub fn new(analyzer: Analyzer, fuzzy_distance: u32, result_cap: usize) -> Self {
        QueryEngine {
            parser: QueryParser::new().with_fuzzy_distance(fuzzy_distance),
            analyzer,
            result_cap: result_cap.max(1),
        }
    }

    pub fn parser(&self) -> &QueryParser {
        &self.parser
    }

    pub fn result_cap(&self) -> usize {
        self.result_cap
    }

    /// The tree that will be evaluated for `query` and `filters`, or `None`
    /// when both are empty.
    pub fn plan(&self, query: &str, filters: &SearchFilters) -> Result<Option<QueryNode>> {
        let parsed = self.parser.parse(query)?;
        let mut filter_nodes = filters.to_nodes();
        Ok(match parsed {
            None if filter_nodes.is_empty() => None,
            None => Some(QueryNode::and(filter_nodes)),
            Some(node) if filter_nodes.is_empty() => Some(node),
            Some(node) => {
                filter_nodes.insert(0, node);
                Some(QueryNode::And(filter_nodes))
            }
        })
    }

    /// Run a query string with filters. `limit` is clamped to the result cap.
    pub fn search(
        &self,
        snapshot: &Snapshot,
        query: &str,
        filters: &SearchFilters,
        limit: Option<usize>,
    ) -> Result<Vec<SearchHit>> {
        match self.plan(query, filters)? {
            Some(node) => self.execute(snapshot, &node, limit),
            None => Ok(Vec::new()),
        }
    }

    /// Evaluate and rank an already-built tree.
    pub fn execute(
        &self,
        snapshot: &Snapshot,
        node: &QueryNode,
        limit: Option<usize>,
    ) -> Result<Vec<SearchHit>> {
        let limit = limit.unwrap_or(self.result_cap).min(self.result_cap);
        let matches = QueryExecutor::new(snapshot, &self.analyzer).execute(node)?;
        log::debug!("{node} matched {} documents", matches.len());

        let mut ranked: Vec<(f32, &Document)> = matches
            .into_iter()
            .filter_map(|(id, score)| snapshot.document(id).map(|doc| (score, doc)))
            .collect();
        ranked.sort_by(|a, b| scorer::compare_hits(*a, *b));
        ranked.truncate(limit);

        Ok(ranked
            .into_iter()
            .map(|(score, doc)| SearchHit {
                preview: doc.preview(PREVIEW_LINES, PREVIEW_CHARS),
                document: doc.clone(),
                score,
            })
            .collect())
    }
}
