//! Parsed query representation.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::document::{Document, Field};

/// A parsed query expression.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    /// A bare word matched against one or both fields.
    Term { text: String, field: Option<Field> },
    /// Words that must appear at consecutive positions.
    Phrase { text: String, field: Option<Field> },
    /// A term pattern with `*` and `?`.
    Wildcard { pattern: String, field: Option<Field> },
    /// A term matched within an edit distance.
    Fuzzy {
        term: String,
        distance: u32,
        field: Option<Field>,
    },
    /// A metadata predicate.
    Filter(FieldFilter),
    And(Vec<QueryNode>),
    Or(Vec<QueryNode>),
    Not(Box<QueryNode>),
}

impl QueryNode {
    pub fn is_filter(&self) -> bool {
        matches!(self, QueryNode::Filter(_))
    }

    /// Combine nodes with AND, flattening single children.
    pub fn and(mut nodes: Vec<QueryNode>) -> QueryNode {
        if nodes.len() == 1 {
            nodes.remove(0)
        } else {
            QueryNode::And(nodes)
        }
    }

    /// Combine nodes with OR, flattening single children.
    pub fn or(mut nodes: Vec<QueryNode>) -> QueryNode {
        if nodes.len() == 1 {
            nodes.remove(0)
        } else {
            QueryNode::Or(nodes)
        }
    }
}

impl fmt::Display for QueryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn prefix(field: &Option<Field>) -> &'static str {
            match field {
                Some(Field::Filename) => "name:",
                Some(Field::Content) => "content:",
                None => "",
            }
        }
        fn join(f: &mut fmt::Formatter<'_>, nodes: &[QueryNode], op: &str) -> fmt::Result {
            write!(f, "(")?;
            for (i, node) in nodes.iter().enumerate() {
                if i > 0 {
                    write!(f, " {op} ")?;
                }
                write!(f, "{node}")?;
            }
            write!(f, ")")
        }

        match self {
            QueryNode::Term { text, field } => write!(f, "{}{text}", prefix(field)),
            QueryNode::Phrase { text, field } => write!(f, "{}\"{text}\"", prefix(field)),
            QueryNode::Wildcard { pattern, field } => write!(f, "{}{pattern}", prefix(field)),
            QueryNode::Fuzzy {
                term,
                distance,
                field,
            } => write!(f, "{}{term}~{distance}", prefix(field)),
            QueryNode::Filter(filter) => write!(f, "{filter}"),
            QueryNode::And(nodes) => join(f, nodes, "AND"),
            QueryNode::Or(nodes) => join(f, nodes, "OR"),
            QueryNode::Not(node) => write!(f, "NOT {node}"),
        }
    }
}

/// Inclusive byte-size bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SizeRange {
    pub min: Option<u64>,
    pub max: Option<u64>,
}

impl SizeRange {
    pub fn contains(&self, size: u64) -> bool {
        self.min.is_none_or(|min| size >= min) && self.max.is_none_or(|max| size <= max)
    }
}

/// Half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn contains(&self, time: &DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| *time >= start) && self.end.is_none_or(|end| *time < end)
    }
}

/// Predicate over document metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldFilter {
    Size(SizeRange),
    Modified(DateRange),
    Created(DateRange),
    /// Lower-cased extensions without the dot; an empty string matches files
    /// without an extension.
    Extension(Vec<String>),
}

impl FieldFilter {
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            FieldFilter::Size(range) => range.contains(document.size),
            FieldFilter::Modified(range) => range.contains(&document.modified),
            FieldFilter::Created(range) => range.contains(&document.created),
            FieldFilter::Extension(extensions) => {
                extensions.iter().any(|ext| *ext == document.extension)
            }
        }
    }
}

impl fmt::Display for FieldFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn range(f: &mut fmt::Formatter<'_>, name: &str, range: &DateRange) -> fmt::Result {
            let show = |t: Option<DateTime<Utc>>| {
                t.map(|t| t.format("%Y-%m-%d").to_string())
                    .unwrap_or_default()
            };
            write!(f, "{name}:{}..{}", show(range.start), show(range.end))
        }

        match self {
            FieldFilter::Size(size) => match (size.min, size.max) {
                (Some(min), Some(max)) => write!(f, "size:{min}..{max}"),
                (Some(min), None) => write!(f, "size>={min}"),
                (None, Some(max)) => write!(f, "size<={max}"),
                (None, None) => write!(f, "size:*"),
            },
            FieldFilter::Modified(r) => range(f, "modified", r),
            FieldFilter::Created(r) => range(f, "created", r),
            FieldFilter::Extension(extensions) => write!(f, "ext:{}", extensions.join(",")),
        }
    }
}
