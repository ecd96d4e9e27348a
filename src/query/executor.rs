//! Evaluation of a [`QueryNode`] against a [`Snapshot`].
//!
//! Every clause resolves to a map of document id to score, ordered by id.
//! `AND` intersects (stopping as soon as the intersection is empty), `OR`
//! unions and `NOT` subtracts. Metadata filters inside an `AND` only look at
//! the documents the other clauses already selected. Wildcard and fuzzy
//! clauses are expanded against the term dictionary, never against content.

use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;
use regex::Regex;

use crate::analysis::Analyzer;
use crate::document::{DocId, Field};
use crate::error::{FiledexError, Result};
use crate::query::ast::{FieldFilter, QueryNode};
use crate::query::scorer::{TermScorer, fuzzy_boost};
use crate::store::{Posting, Snapshot};
use crate::util::levenshtein::LevenshteinMatcher;

/// Matching documents and their accumulated scores.
pub type Matches = BTreeMap<DocId, f32>;

/// Evaluates query trees over one snapshot.
pub struct QueryExecutor<'a> {
    snapshot: &'a Snapshot,
    analyzer: &'a Analyzer,
    scorer: TermScorer,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(snapshot: &'a Snapshot, analyzer: &'a Analyzer) -> Self {
        QueryExecutor {
            snapshot,
            analyzer,
            scorer: TermScorer::new(snapshot.live_count() as u64),
        }
    }

    pub fn execute(&self, node: &QueryNode) -> Result<Matches> {
        match node {
            QueryNode::Term { text, field } => self.term(text, *field),
            QueryNode::Phrase { text, field } => self.term(text, *field),
            QueryNode::Wildcard { pattern, field } => self.wildcard(pattern, *field),
            QueryNode::Fuzzy {
                term,
                distance,
                field,
            } => self.fuzzy(term, *distance, *field),
            QueryNode::Filter(filter) => Ok(self.scan(filter)),
            QueryNode::And(nodes) => self.and(nodes),
            QueryNode::Or(nodes) => {
                let mut matches = Matches::new();
                for node in nodes {
                    union_into(&mut matches, self.execute(node)?);
                }
                Ok(matches)
            }
            QueryNode::Not(inner) => {
                let excluded = self.execute(inner)?;
                Ok(self
                    .snapshot
                    .live_ids()
                    .into_iter()
                    .filter(|id| !excluded.contains_key(id))
                    .map(|id| (id, 0.0))
                    .collect())
            }
        }
    }

    fn and(&self, nodes: &[QueryNode]) -> Result<Matches> {
        let mut positives = Vec::new();
        let mut filters = Vec::new();
        let mut negatives = Vec::new();
        for node in nodes {
            match node {
                QueryNode::Filter(filter) => filters.push(filter),
                QueryNode::Not(inner) => negatives.push(inner.as_ref()),
                other => positives.push(other),
            }
        }

        let mut current: Option<Matches> = None;
        for node in positives {
            let matches = self.execute(node)?;
            let next = match current {
                Some(acc) => intersect(acc, matches),
                None => matches,
            };
            if next.is_empty() {
                return Ok(Matches::new());
            }
            current = Some(next);
        }
        let mut current = current.unwrap_or_else(|| self.live_matches());

        if !filters.is_empty() {
            current.retain(|id, _| {
                self.snapshot
                    .document(*id)
                    .is_some_and(|doc| filters.iter().all(|f| f.matches(doc)))
            });
        }
        for node in negatives {
            if current.is_empty() {
                break;
            }
            let excluded = self.execute(node)?;
            current.retain(|id, _| !excluded.contains_key(id));
        }
        Ok(current)
    }

    /// Bare words and phrases: per field, one token is a term lookup and
    /// several tokens must be adjacent.
    fn term(&self, text: &str, field: Option<Field>) -> Result<Matches> {
        let mut matches = Matches::new();
        for field in fields(field) {
            let terms = self.analyzer.terms(*field, text);
            match terms.as_slice() {
                [] => {}
                [single] => self.add_term(&mut matches, single, &[*field], 1.0)?,
                many => union_into(&mut matches, self.phrase(many, *field)?),
            }
        }
        Ok(matches)
    }

    fn phrase(&self, terms: &[String], field: Field) -> Result<Matches> {
        let mut positions: Vec<HashMap<DocId, Vec<u32>>> = Vec::with_capacity(terms.len());
        for term in terms {
            let by_doc: HashMap<DocId, Vec<u32>> = self
                .field_postings(term, field)?
                .into_iter()
                .map(|p| (p.doc, p.positions))
                .collect();
            if by_doc.is_empty() {
                return Ok(Matches::new());
            }
            positions.push(by_doc);
        }

        let (first, rest) = positions.split_at(1);
        let mut occurrences: Vec<(DocId, usize)> = Vec::new();
        for (doc, starts) in &first[0] {
            let Some(following) = rest
                .iter()
                .map(|by_doc| by_doc.get(doc))
                .collect::<Option<Vec<_>>>()
            else {
                continue;
            };
            let count = starts
                .iter()
                .filter(|&&start| {
                    following.iter().enumerate().all(|(offset, positions)| {
                        let expected = start.saturating_add(offset as u32 + 1);
                        positions.binary_search(&expected).is_ok()
                    })
                })
                .count();
            if count > 0 {
                occurrences.push((*doc, count));
            }
        }

        let doc_freq = occurrences.len() as u64;
        Ok(occurrences
            .into_iter()
            .map(|(doc, count)| (doc, self.scorer.score(field, count, doc_freq)))
            .collect())
    }

    fn wildcard(&self, pattern: &str, field: Option<Field>) -> Result<Matches> {
        let regex = wildcard_regex(pattern)?;
        let prefix: String = pattern
            .chars()
            .take_while(|c| !matches!(c, '*' | '?'))
            .collect();
        let terms = if prefix.is_empty() {
            self.snapshot.terms_matching(|t| regex.is_match(t))
        } else {
            self.snapshot.terms_with_prefix(&prefix, |t| regex.is_match(t))
        };
        log::debug!("{pattern} expands to {} terms", terms.len());

        let mut matches = Matches::new();
        for term in &terms {
            self.add_term(&mut matches, term, fields(field), 1.0)?;
        }
        Ok(matches)
    }

    fn fuzzy(&self, term: &str, distance: u32, field: Option<Field>) -> Result<Matches> {
        let matcher = LevenshteinMatcher::new(term, distance as usize);
        let mut candidates: Vec<(usize, String)> = self
            .snapshot
            .segments()
            .par_iter()
            .flat_map_iter(|segment| {
                segment
                    .terms()
                    .filter_map(|candidate| {
                        matcher
                            .distance(candidate)
                            .map(|d| (d, candidate.to_string()))
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        candidates.sort();
        candidates.dedup();
        log::debug!("{term}~{distance} expands to {} terms", candidates.len());

        let mut matches = Matches::new();
        for (d, candidate) in &candidates {
            self.add_term(&mut matches, candidate, fields(field), fuzzy_boost(*d))?;
        }
        Ok(matches)
    }

    fn scan(&self, filter: &FieldFilter) -> Matches {
        self.snapshot
            .live_documents()
            .filter(|doc| filter.matches(doc))
            .map(|doc| (doc.id, 0.0))
            .collect()
    }

    fn live_matches(&self) -> Matches {
        self.snapshot
            .live_ids()
            .into_iter()
            .map(|id| (id, 0.0))
            .collect()
    }

    fn add_term(
        &self,
        matches: &mut Matches,
        term: &str,
        fields: &[Field],
        boost: f32,
    ) -> Result<()> {
        let postings = self.snapshot.postings(term)?;
        for field in fields {
            let in_field: Vec<&Posting> = postings.iter().filter(|p| p.field == *field).collect();
            let doc_freq = in_field.len() as u64;
            for posting in in_field {
                *matches.entry(posting.doc).or_insert(0.0) +=
                    self.scorer.score(*field, posting.frequency(), doc_freq) * boost;
            }
        }
        Ok(())
    }

    fn field_postings(&self, term: &str, field: Field) -> Result<Vec<Posting>> {
        Ok(self
            .snapshot
            .postings(term)?
            .into_iter()
            .filter(|p| p.field == field)
            .collect())
    }
}

fn fields(field: Option<Field>) -> &'static [Field] {
    match field {
        Some(Field::Filename) => &[Field::Filename],
        Some(Field::Content) => &[Field::Content],
        None => &Field::ALL,
    }
}

fn union_into(acc: &mut Matches, other: Matches) {
    for (doc, score) in other {
        *acc.entry(doc).or_insert(0.0) += score;
    }
}

fn intersect(left: Matches, right: Matches) -> Matches {
    let (small, large) = if left.len() <= right.len() {
        (left, right)
    } else {
        (right, left)
    };
    small
        .into_iter()
        .filter_map(|(doc, score)| large.get(&doc).map(|other| (doc, score + other)))
        .collect()
}

/// Anchored regex for a `*`/`?` pattern; every other character is literal.
pub fn wildcard_regex(pattern: &str) -> Result<Regex> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push('^');
    let mut literal = [0u8; 4];
    for ch in pattern.chars() {
        match ch {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            c => source.push_str(&regex::escape(c.encode_utf8(&mut literal))),
        }
    }
    source.push('$');
    Regex::new(&source)
        .map_err(|e| FiledexError::other(format!("invalid wildcard pattern {pattern:?}: {e}")))
}
