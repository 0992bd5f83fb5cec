use criterion::{criterion_group, criterion_main, Criterion};
use searchcore::tokenizer::{Analyzer, AnalyzerConfig};
use searchcore::{IndexBuilder, IndexReader, OpenMode, QueryParser, Searcher, StoredFields};

const WORDS: &[&str] = &[
    "index", "query", "posting", "term", "score", "rank", "document", "field", "phrase", "token",
    "merge", "heap", "snapshot", "commit", "reader", "writer", "lock", "analyzer", "stem", "corpus",
];

fn bench_search(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut builder = IndexBuilder::open(dir.path(), OpenMode::Create, Analyzer::default()).expect("open");
    let batch: Vec<(StoredFields, String)> = (0..5_000)
        .map(|i| {
            let body: Vec<&str> = (0..50).map(|j| WORDS[(i * 7 + j * 13) % WORDS.len()]).collect();
            let mut fields = StoredFields::new();
            fields.insert("title".into(), format!("doc {i}"));
            (fields, body.join(" "))
        })
        .collect();
    builder.add_documents(batch);
    builder.commit().expect("commit");
    drop(builder);

    let reader = IndexReader::open(dir.path(), &AnalyzerConfig::default()).expect("reader");
    let parser = QueryParser::for_index(Analyzer::default(), &reader);
    let or_query = parser.parse("index query posting").expect("parse");
    let and_query = parser.parse("merge AND heap AND NOT lock").expect("parse");
    let phrase = parser.parse("\"term score\"").expect("parse");
    let searcher = Searcher::new(&reader);

    c.bench_function("search_or", |b| b.iter(|| searcher.search(&or_query, 10)));
    c.bench_function("search_and_not", |b| b.iter(|| searcher.search(&and_query, 10)));
    c.bench_function("search_phrase", |b| b.iter(|| searcher.search(&phrase, 10)));
}

criterion_group!(benches, bench_search);
criterion_main!(benches);
