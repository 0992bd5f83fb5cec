use indexer::{build_index, load_document};
use searchcore::{Analyzer, IndexBuilder, IndexReader, OpenMode, QueryParser, SearchConfig, SearchError, Searcher};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn write_corpus(dir: &Path) {
    fs::create_dir_all(dir.join("nested")).unwrap();
    fs::write(
        dir.join("a.html"),
        "<html><head><title>Cats</title></head><body><p>The cat sat on the mat.</p></body></html>",
    )
    .unwrap();
    fs::write(
        dir.join("b.html"),
        "<html><head><title>Dogs</title></head><body><p>A dog chased the cat.</p></body></html>",
    )
    .unwrap();
    fs::write(dir.join("nested/c.html"), "<html><body>Birds sing; no title here.</body></html>").unwrap();
    // not UTF-8: must be skipped without aborting the build
    fs::write(dir.join("broken.html"), [0xff, 0xfe, 0x00, 0xc3]).unwrap();
}

#[test]
fn builds_a_searchable_index_and_skips_bad_documents() {
    let docs = tempdir().unwrap();
    let out = tempdir().unwrap();
    write_corpus(docs.path());

    let report = build_index(docs.path(), out.path(), &SearchConfig::default()).unwrap();
    assert_eq!(report.indexed, 3);
    assert_eq!(report.failed, 1);
    assert_eq!(report.commit.total_docs, 3);

    let config = SearchConfig::default();
    let reader = IndexReader::open(out.path(), &config.analyzer).unwrap();
    let parser = QueryParser::for_index(Analyzer::new(config.analyzer.clone()), &reader);
    let searcher = Searcher::new(&reader);

    let top = searcher.search(&parser.parse("cat").unwrap(), 10).unwrap();
    let titles: Vec<String> = top
        .hits
        .iter()
        .map(|h| searcher.resolve(h).unwrap().title().to_string())
        .collect();
    assert_eq!(titles.len(), 2);
    assert!(titles.contains(&"Cats".to_string()));
    assert!(titles.contains(&"Dogs".to_string()));

    let top = searcher.search(&parser.parse("title:dogs").unwrap(), 10).unwrap();
    assert_eq!(top.hits.len(), 1);

    let birds = searcher.search(&parser.parse("birds").unwrap(), 10).unwrap();
    let doc = searcher.resolve(&birds.hits[0]).unwrap();
    assert_eq!(doc.title(), "c");
    assert!(doc.path().ends_with("c.html"));
}

#[test]
fn missing_document_directory_is_fatal() {
    let out = tempdir().unwrap();
    let missing = out.path().join("does-not-exist");
    assert!(build_index(&missing, &out.path().join("idx"), &SearchConfig::default()).is_err());
}

#[test]
fn locked_index_is_fatal() {
    let docs = tempdir().unwrap();
    let out = tempdir().unwrap();
    write_corpus(docs.path());
    let _writer = IndexBuilder::open(out.path(), OpenMode::Create, Analyzer::default()).unwrap();
    let err = build_index(docs.path(), out.path(), &SearchConfig::default()).unwrap_err();
    let cause = err.downcast_ref::<SearchError>().unwrap();
    assert!(matches!(cause, SearchError::LockContention { .. }));
}

#[test]
fn undecodable_file_is_a_document_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.html");
    fs::write(&path, [0xc3, 0x28]).unwrap();
    let err = load_document(&path).unwrap_err();
    assert!(err.is_per_document());
}
