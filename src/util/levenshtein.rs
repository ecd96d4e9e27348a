//! Levenshtein edit distance.
//!
//! Fuzzy terms (`word~N`) are resolved by scanning the term dictionary, so the
//! per-candidate check has to be cheap: [`LevenshteinMatcher`] keeps the query
//! decoded once and gives up as soon as a row of the distance matrix exceeds
//! the allowed distance.

use std::cmp::min;

fn bounded_distance(a: &[char], b: &[char], threshold: usize) -> Option<usize> {
    // Early termination if length difference exceeds threshold
    if a.len().abs_diff(b.len()) > threshold {
        return None;
    }
    if a.is_empty() || b.is_empty() {
        return Some(a.len().max(b.len()));
    }

    // Use only two rows for space optimization
    let mut prev_row: Vec<usize> = (0..=b.len()).collect();
    let mut curr_row = vec![0; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        curr_row[0] = i + 1;
        let mut min_in_row = curr_row[0];

        for (j, &cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr_row[j + 1] = min(
                min(
                    prev_row[j + 1] + 1, // deletion
                    curr_row[j] + 1,     // insertion
                ),
                prev_row[j] + cost, // substitution
            );
            min_in_row = min(min_in_row, curr_row[j + 1]);
        }

        if min_in_row > threshold {
            return None;
        }

        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    let distance = prev_row[b.len()];
    (distance <= threshold).then_some(distance)
}

/// Matches many candidate terms against one query term within a fixed
/// edit distance.
#[derive(Debug, Clone)]
pub struct LevenshteinMatcher {
    query_chars: Vec<char>,
    max_distance: usize,
}

impl LevenshteinMatcher {
    /// Create a new matcher for the given query term and distance.
    pub fn new(query: &str, max_distance: usize) -> Self {
        LevenshteinMatcher {
            query_chars: query.chars().collect(),
            max_distance,
        }
    }

    /// Distance to `candidate` if it is within the allowed distance.
    pub fn distance(&self, candidate: &str) -> Option<usize> {
        // Byte length bounds char count from above; cheap rejection first.
        if candidate.len() + self.max_distance < self.query_chars.len() {
            return None;
        }
        let chars: Vec<char> = candidate.chars().collect();
        bounded_distance(&self.query_chars, &chars, self.max_distance)
    }
}
