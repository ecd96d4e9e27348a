//! Criterion benchmarks for filedex.
//!
//! Covers the hot paths of a build and of a search:
//! - tokenization and analysis of extracted text
//! - committing batches to the segment store
//! - query parsing and execution against a committed index

use std::hint::black_box;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use tempfile::TempDir;

use filedex::analysis::Analyzer;
use filedex::document::{AnalyzedDocument, Document, FileStat};
use filedex::query::{QueryEngine, QueryParser, SearchFilters};
use filedex::store::{Batch, IndexStore};

/// Generate test documents for benchmarking.
fn generate_test_documents(count: usize) -> Vec<String> {
    let words = [
        "quarterly", "results", "budget", "invoice", "meeting", "minutes", "draft",
        "report", "contract", "schedule", "project", "summary", "review", "notes",
        "customer", "supplier", "payment", "forecast", "revenue", "expense",
    ];

    let mut documents = Vec::with_capacity(count);
    for i in 0..count {
        let doc_length = 50 + (i % 100);
        let mut doc_words = Vec::with_capacity(doc_length);
        for j in 0..doc_length {
            doc_words.push(words[(i * 7 + j * 13) % words.len()]);
        }
        documents.push(doc_words.join(" "));
    }
    documents
}

fn analyzed(analyzer: &Analyzer, index: usize, content: &str) -> AnalyzedDocument {
    let stat = FileStat {
        path: PathBuf::from(format!("/bench/docs/file_{index}.txt")),
        size: content.len() as u64,
        modified: Utc::now(),
        created: Utc::now(),
    };
    let mut document = Document::from_stat(&stat);
    document.content = content.to_string();
    let terms = analyzer.analyze(&document, content);
    AnalyzedDocument { document, terms }
}

fn bench_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("analysis");
    let analyzer = Analyzer::new();
    let documents = generate_test_documents(100);

    group.bench_function("analyze_single_document", |b| {
        b.iter(|| black_box(analyzed(&analyzer, 0, &documents[0])))
    });

    group.throughput(Throughput::Elements(documents.len() as u64));
    group.bench_function("analyze_batch_documents", |b| {
        b.iter(|| {
            for (i, doc) in documents.iter().enumerate() {
                black_box(analyzed(&analyzer, i, doc));
            }
        })
    });
    group.finish();
}

fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit");
    group.sample_size(20);
    let analyzer = Analyzer::new();
    let documents: Vec<AnalyzedDocument> = generate_test_documents(256)
        .iter()
        .enumerate()
        .map(|(i, doc)| analyzed(&analyzer, i, doc))
        .collect();

    group.throughput(Throughput::Elements(documents.len() as u64));
    group.bench_function("commit_batch_256", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let store = IndexStore::open(dir.path(), Duration::from_secs(1)).unwrap();
                let mut batch = Batch::new();
                for doc in &documents {
                    batch.push_document(doc.clone());
                }
                (dir, store, batch)
            },
            |(dir, store, batch)| {
                black_box(store.writer().unwrap().commit(&batch).unwrap());
                dir
            },
            BatchSize::PerIteration,
        )
    });
    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");
    let analyzer = Analyzer::new();
    let dir = TempDir::new().unwrap();
    let store = IndexStore::open(dir.path(), Duration::from_secs(1)).unwrap();
    let documents = generate_test_documents(2_000);
    for (n, docs) in documents.chunks(500).enumerate() {
        let mut batch = Batch::new();
        for (i, doc) in docs.iter().enumerate() {
            batch.push_document(analyzed(&analyzer, n * 500 + i, doc));
        }
        store.writer().unwrap().commit(&batch).unwrap();
    }
    let snapshot = store.snapshot();
    let engine = QueryEngine::new(analyzer, 2, 500);
    let filters = SearchFilters::default();

    group.bench_function("parse_complex_query", |b| {
        let parser = QueryParser::new();
        b.iter(|| {
            black_box(
                parser
                    .parse("(budget OR forecast) AND \"quarterly results\" -draft size>1KB ext:txt")
                    .unwrap(),
            )
        })
    });

    for (name, query) in [
        ("term", "invoice"),
        ("boolean", "budget AND revenue NOT draft"),
        ("phrase", "\"quarterly results\""),
        ("wildcard", "rev*"),
        ("fuzzy", "forcast~2"),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| black_box(engine.search(&snapshot, query, &filters, Some(20)).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_analysis, bench_commit, bench_query);
criterion_main!(benches);
