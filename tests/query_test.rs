use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use filedex::config::IndexerConfig;
use filedex::engine::Engine;
use filedex::error::{FiledexError, Result};
use filedex::extract::{Extractor, ExtractorRegistry};
use filedex::query::{SearchFilters, SearchHit};
use filedex::translate::{QueryTranslator, Translation};

/// Stands in for a real DOCX parser: the test files are plain UTF-8.
struct FakeDocxExtractor;

impl Extractor for FakeDocxExtractor {
    fn name(&self) -> &'static str {
        "fake-docx"
    }

    fn extensions(&self) -> &[&'static str] {
        &["docx"]
    }

    fn extract(&self, path: &Path) -> Result<String> {
        Ok(fs::read_to_string(path)?)
    }
}

fn open_engine(root: &Path, index: &Path) -> Result<Engine> {
    let config = IndexerConfig::new(index)
        .with_roots([root])
        .with_extraction_threads(2);
    let mut registry = ExtractorRegistry::with_defaults(Duration::from_secs(10));
    registry.register(Arc::new(FakeDocxExtractor));
    Engine::open_with_registry(config, registry)
}

fn corpus() -> Result<(TempDir, Engine)> {
    let dir = TempDir::new()?;
    let root = dir.path().join("files");
    fs::create_dir_all(&root)?;
    fs::write(root.join("report_2024.docx"), "quarterly results")?;
    fs::write(root.join("draft.txt"), "quarterly plan")?;
    let engine = open_engine(&root, &dir.path().join("index"))?;
    engine.rebuild(&[])?;
    Ok((dir, engine))
}

fn names(hits: &[SearchHit]) -> Vec<String> {
    hits.iter().map(|h| h.document.filename.clone()).collect()
}

fn search(engine: &Engine, query: &str) -> Result<Vec<String>> {
    Ok(names(&engine.search(query, &SearchFilters::default(), None)?))
}

#[test]
fn test_boolean_not_excludes_by_filename() -> Result<()> {
    let (_dir, engine) = corpus()?;
    assert_eq!(search(&engine, "quarterly NOT draft")?, vec!["report_2024.docx"]);
    assert_eq!(search(&engine, "quarterly -draft")?, vec!["report_2024.docx"]);

    let mut both = search(&engine, "quarterly")?;
    both.sort();
    assert_eq!(both, vec!["draft.txt", "report_2024.docx"]);
    Ok(())
}

#[test]
fn test_wildcard_matches_filename_terms() -> Result<()> {
    let (_dir, engine) = corpus()?;
    assert_eq!(search(&engine, "repo*")?, vec!["report_2024.docx"]);
    assert_eq!(search(&engine, "*sult*")?, vec!["report_2024.docx"]);
    assert_eq!(search(&engine, "pl?n")?, vec!["draft.txt"]);
    Ok(())
}

#[test]
fn test_phrase_requires_adjacency() -> Result<()> {
    let (_dir, engine) = corpus()?;
    assert_eq!(search(&engine, "\"quarterly results\"")?, vec!["report_2024.docx"]);
    assert!(search(&engine, "\"results quarterly\"")?.is_empty());
    Ok(())
}

#[test]
fn test_fuzzy_distance_bound() -> Result<()> {
    let (_dir, engine) = corpus()?;
    let mut hits = search(&engine, "qurterly~2")?;
    hits.sort();
    assert_eq!(hits, vec!["draft.txt", "report_2024.docx"]);
    assert!(search(&engine, "qurterly~0")?.is_empty());
    assert_eq!(search(&engine, "resluts~2")?, vec!["report_2024.docx"]);
    Ok(())
}

#[test]
fn test_or_and_grouping() -> Result<()> {
    let (_dir, engine) = corpus()?;
    let mut hits = search(&engine, "results OR plan")?;
    hits.sort();
    assert_eq!(hits, vec!["draft.txt", "report_2024.docx"]);
    assert_eq!(search(&engine, "quarterly AND (plan OR nothing)")?, vec!["draft.txt"]);
    assert!(search(&engine, "results AND plan")?.is_empty());
    Ok(())
}

#[test]
fn test_field_restricted_terms() -> Result<()> {
    let (_dir, engine) = corpus()?;
    assert_eq!(search(&engine, "name:draft")?, vec!["draft.txt"]);
    assert!(search(&engine, "content:draft")?.is_empty());
    Ok(())
}

#[test]
fn test_size_filter_ignores_content() -> Result<()> {
    let dir = TempDir::new()?;
    let root = dir.path().join("files");
    fs::create_dir_all(&root)?;
    fs::write(root.join("small.txt"), "quarterly")?;
    fs::write(root.join("big.txt"), "word ".repeat(250_000))?;
    let engine = open_engine(&root, &dir.path().join("index"))?;
    engine.rebuild(&[])?;

    assert_eq!(search(&engine, "size>1000000")?, vec!["big.txt"]);
    assert_eq!(search(&engine, "size<1KB")?, vec!["small.txt"]);
    assert!(search(&engine, "quarterly size>1000000")?.is_empty());

    let filters = SearchFilters::new().with_min_size(1_000_001);
    assert_eq!(names(&engine.search("", &filters, None)?), vec!["big.txt"]);
    Ok(())
}

#[test]
fn test_extension_and_date_filters() -> Result<()> {
    let (_dir, engine) = corpus()?;
    assert_eq!(search(&engine, "quarterly ext:docx")?, vec!["report_2024.docx"]);
    assert_eq!(search(&engine, "ext:.TXT")?, vec!["draft.txt"]);
    assert!(search(&engine, "modified:<1990-01-01")?.is_empty());
    assert_eq!(search(&engine, "modified:>1990-01-01 ext:txt")?, vec!["draft.txt"]);

    let filters = SearchFilters::new().with_extensions(["docx"]);
    assert_eq!(
        names(&engine.search("quarterly", &filters, None)?),
        vec!["report_2024.docx"]
    );
    Ok(())
}

#[test]
fn test_empty_query() -> Result<()> {
    let (_dir, engine) = corpus()?;
    assert!(search(&engine, "   ")?.is_empty());
    let filters = SearchFilters::new().with_extensions(["txt"]);
    assert_eq!(names(&engine.search("", &filters, None)?), vec!["draft.txt"]);
    Ok(())
}

#[test]
fn test_syntax_errors_are_reported() -> Result<()> {
    let (_dir, engine) = corpus()?;
    match engine.search("quarterly AND (plan", &SearchFilters::default(), None) {
        Err(FiledexError::QuerySyntax { position, .. }) => assert_eq!(position, 14),
        other => panic!("expected a syntax error, got {other:?}"),
    }
    // The engine keeps working.
    assert_eq!(search(&engine, "plan")?, vec!["draft.txt"]);
    Ok(())
}

#[test]
fn test_filename_matches_rank_first() -> Result<()> {
    let dir = TempDir::new()?;
    let root = dir.path().join("files");
    fs::create_dir_all(&root)?;
    fs::write(root.join("budget.txt"), "misc notes")?;
    fs::write(root.join("notes.txt"), "the budget")?;
    let engine = open_engine(&root, &dir.path().join("index"))?;
    engine.rebuild(&[])?;

    let hits = engine.search("budget", &SearchFilters::default(), None)?;
    assert_eq!(names(&hits), vec!["budget.txt", "notes.txt"]);
    assert!(hits[0].score > hits[1].score);
    assert_eq!(hits[1].preview, "the budget");
    Ok(())
}

#[test]
fn test_limit_and_result_cap() -> Result<()> {
    let dir = TempDir::new()?;
    let root = dir.path().join("files");
    fs::create_dir_all(&root)?;
    for i in 0..10 {
        fs::write(root.join(format!("file{i}.txt")), "common")?;
    }
    let config = IndexerConfig::new(dir.path().join("index"))
        .with_roots([&root])
        .with_result_cap(4);
    let engine = Engine::open(config)?;
    engine.rebuild(&[])?;

    assert_eq!(engine.search("common", &SearchFilters::default(), None)?.len(), 4);
    assert_eq!(engine.search("common", &SearchFilters::default(), Some(2))?.len(), 2);
    assert_eq!(engine.search("common", &SearchFilters::default(), Some(100))?.len(), 4);
    Ok(())
}

struct FixedTranslator(Option<Translation>);

impl QueryTranslator for FixedTranslator {
    fn translate(&self, _text: &str) -> Result<Option<Translation>> {
        Ok(self.0.clone())
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

#[test]
fn test_natural_language_search() -> Result<()> {
    let (_dir, engine) = corpus()?;

    // No translator: OR of the words, best match first.
    let hits = engine.search_natural("quarterly results", None, None)?;
    assert_eq!(names(&hits), vec!["report_2024.docx", "draft.txt"]);

    let translator = FixedTranslator(Some(Translation {
        query: "quarterly".to_string(),
        filters: SearchFilters::new().with_extensions(["txt"]),
    }));
    let hits = engine.search_natural("anything", Some(&translator), None)?;
    assert_eq!(names(&hits), vec!["draft.txt"]);

    // Unusable answers fall back to the free text.
    let broken = FixedTranslator(Some(Translation {
        query: "(((".to_string(),
        filters: SearchFilters::default(),
    }));
    let hits = engine.search_natural("plan", Some(&broken), None)?;
    assert_eq!(names(&hits), vec!["draft.txt"]);

    let silent = FixedTranslator(None);
    let hits = engine.search_natural("\"quarterly plan\"", Some(&silent), None)?;
    assert_eq!(names(&hits), vec!["draft.txt"]);
    Ok(())
}

/// One file with every `aa??` term over `[0-9a-z]`, more terms than any
/// single expansion used to keep.
fn large_dictionary() -> Result<(TempDir, Engine)> {
    let dir = TempDir::new()?;
    let root = dir.path().join("files");
    fs::create_dir_all(&root)?;
    let symbols: Vec<char> = ('0'..='9').chain('a'..='z').collect();
    let mut words = Vec::with_capacity(symbols.len() * symbols.len());
    for x in &symbols {
        for y in &symbols {
            words.push(format!("aa{x}{y}"));
        }
    }
    fs::write(root.join("many.txt"), words.join(" "))?;
    fs::write(root.join("target.txt"), "aazzzz zzaa")?;
    let engine = open_engine(&root, &dir.path().join("index"))?;
    engine.rebuild(&[])?;
    Ok((dir, engine))
}

#[test]
fn test_wildcard_expands_every_matching_term() -> Result<()> {
    let (_dir, engine) = large_dictionary()?;
    let mut hits = search(&engine, "aa*")?;
    hits.sort();
    assert_eq!(hits, vec!["many.txt", "target.txt"]);
    assert_eq!(search(&engine, "*zzzz")?, vec!["target.txt"]);
    Ok(())
}

#[test]
fn test_fuzzy_expands_every_candidate() -> Result<()> {
    let (_dir, engine) = large_dictionary()?;
    // All 1296 `aa??` terms are within two edits of `aaaa`, and so is `zzaa`.
    let mut hits = search(&engine, "aaaa~2")?;
    hits.sort();
    assert_eq!(hits, vec!["many.txt", "target.txt"]);
    Ok(())
}
