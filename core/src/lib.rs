//! Full-text search core: analyzer, inverted index builder, on-disk index store,
//! query parser and TF-IDF query executor.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod builder;
pub mod config;
pub mod error;
pub mod index;
pub mod lock;
pub mod persist;
pub mod query;
pub mod reader;
pub mod tokenizer;

pub use builder::{CommitStats, IndexBuilder, OpenMode};
pub use config::SearchConfig;
pub use error::{ErrorKind, Result, SearchError};
pub use query::executor::{ScoredDoc, Searcher, TopDocs};
pub use query::parser::QueryParser;
pub use query::Query;
pub use reader::IndexReader;
pub use tokenizer::{Analyzer, AnalyzerConfig, StopWords};

pub type DocId = u32;

/// Field holding the analyzed document body; the default field for queries.
pub const BODY_FIELD: &str = "text";
pub const TITLE_FIELD: &str = "title";
pub const PATH_FIELD: &str = "path";

/// Stored (not analyzed) field values of a document, keyed by field name.
pub type StoredFields = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub term_freq: u32,
    /// Token positions of the term inside the field, ascending.
    pub positions: Vec<u32>,
}

/// A committed document as persisted in the stored-field store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub doc_id: DocId,
    pub fields: StoredFields,
    /// Number of indexed tokens across all analyzed fields.
    pub length: u32,
}

impl StoredDocument {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn title(&self) -> &str {
        self.get(TITLE_FIELD).unwrap_or("")
    }

    pub fn path(&self) -> &str {
        self.get(PATH_FIELD).unwrap_or("")
    }
}
