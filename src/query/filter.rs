//! Structured filters supplied next to a query string.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::query::ast::{DateRange, FieldFilter, QueryNode, SizeRange};

/// Metadata constraints AND-ed with the parsed query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilters {
    /// Accepted extensions (any of), without the dot.
    pub extensions: Vec<String>,
    /// Minimum size in bytes, inclusive.
    pub min_size: Option<u64>,
    /// Maximum size in bytes, inclusive.
    pub max_size: Option<u64>,
    /// Modified at or after this instant.
    pub modified_after: Option<DateTime<Utc>>,
    /// Modified strictly before this instant.
    pub modified_before: Option<DateTime<Utc>>,
}

impl SearchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    pub fn with_min_size(mut self, bytes: u64) -> Self {
        self.min_size = Some(bytes);
        self
    }

    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size = Some(bytes);
        self
    }

    pub fn with_modified_after(mut self, time: DateTime<Utc>) -> Self {
        self.modified_after = Some(time);
        self
    }

    pub fn with_modified_before(mut self, time: DateTime<Utc>) -> Self {
        self.modified_before = Some(time);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.to_nodes().is_empty()
    }

    /// The filters as query nodes.
    pub fn to_nodes(&self) -> Vec<QueryNode> {
        let mut nodes = Vec::new();
        if !self.extensions.is_empty() {
            nodes.push(QueryNode::Filter(FieldFilter::Extension(
                self.extensions.clone(),
            )));
        }
        if self.min_size.is_some() || self.max_size.is_some() {
            nodes.push(QueryNode::Filter(FieldFilter::Size(SizeRange {
                min: self.min_size,
                max: self.max_size,
            })));
        }
        if self.modified_after.is_some() || self.modified_before.is_some() {
            nodes.push(QueryNode::Filter(FieldFilter::Modified(DateRange {
                start: self.modified_after,
                end: self.modified_before,
            })));
        }
        nodes
    }
}
