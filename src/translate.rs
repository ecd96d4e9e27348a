//! Natural-language query translation.
//!
//! A [`QueryTranslator`] turns free text into a query expression plus
//! [`SearchFilters`]. Translators are optional collaborators (typically a
//! language model); when none is configured, or it returns nothing usable,
//! [`fallback_translation`] gives a deterministic result.

use serde::Deserialize;

use crate::analysis::Analyzer;
use crate::document::Field;
use crate::error::{FiledexError, Result};
use crate::query::SearchFilters;

/// A query expression in the filedex grammar plus structured filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Translation {
    pub query: String,
    pub filters: SearchFilters,
}

impl Translation {
    pub fn is_empty(&self) -> bool {
        self.query.trim().is_empty() && self.filters.is_empty()
    }
}

/// Turns free text into a [`Translation`].
pub trait QueryTranslator: Send + Sync {
    /// Best-effort translation. `Ok(None)` means "no opinion".
    fn translate(&self, text: &str) -> Result<Option<Translation>>;

    fn name(&self) -> &'static str;
}

/// Deterministic translation of free text.
///
/// Text wrapped in double quotes becomes a phrase; anything else becomes an
/// OR of its words, each quoted so that no word is read as an operator or a
/// filter.
pub fn fallback_translation(analyzer: &Analyzer, text: &str) -> Translation {
    let trimmed = text.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        let inner = trimmed[1..trimmed.len() - 1].replace('"', " ");
        if !inner.trim().is_empty() {
            return Translation {
                query: format!("\"{}\"", inner.trim()),
                filters: SearchFilters::default(),
            };
        }
    }

    let mut words: Vec<String> = Vec::new();
    for word in analyzer.terms(Field::Content, trimmed) {
        if !words.contains(&word) {
            words.push(word);
        }
    }
    Translation {
        query: words
            .iter()
            .map(|w| format!("\"{}\"", w.replace('"', "")))
            .collect::<Vec<_>>()
            .join(" OR "),
        filters: SearchFilters::default(),
    }
}

/// Wire shape of a model's JSON answer.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TranslationPayload {
    keywords: Vec<String>,
    query: Option<String>,
    filters: SearchFilters,
}

/// Parse a translator's raw text answer: the first `{...}` block is decoded
/// as `{"query": "...", "keywords": [...], "filters": {...}}`. Keywords are
/// OR-ed when no query is given.
pub fn parse_translation_json(raw: &str) -> Result<Translation> {
    let start = raw.find('{');
    let end = raw.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &raw[start..=end],
        _ => {
            return Err(FiledexError::other(
                "translator answer contains no JSON object",
            ));
        }
    };
    let payload: TranslationPayload = serde_json::from_str(json)?;
    let query = match payload.query {
        Some(query) if !query.trim().is_empty() => query,
        _ => payload
            .keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(|k| format!("\"{}\"", k.replace('"', "")))
            .collect::<Vec<_>>()
            .join(" OR "),
    };
    Ok(Translation {
        query,
        filters: payload.filters,
    })
}
