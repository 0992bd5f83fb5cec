use crate::error::{Result, SearchError};
use crate::index::{merge_postings, InvertedIndex};
use crate::lock::WriterLock;
use crate::persist::{list_generations, publish, read_current, remove_stale_generations, GenerationWriter, IndexPaths};
use crate::reader::IndexReader;
use crate::tokenizer::Analyzer;
use crate::{DocId, StoredFields, BODY_FIELD, TITLE_FIELD};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::fs::create_dir_all;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Start an empty index; the first commit supersedes whatever was there.
    Create,
    /// Continue the published snapshot, if any.
    Append,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitStats {
    pub generation: u64,
    pub added_docs: u32,
    pub total_docs: u32,
    pub num_terms: u64,
    pub average_doc_length: f64,
}

/// Single writer over an index directory. Holds the writer lock until dropped.
pub struct IndexBuilder {
    root: PathBuf,
    paths: IndexPaths,
    analyzer: Analyzer,
    searchable: Vec<String>,
    base: Option<IndexReader>,
    buffer: InvertedIndex,
    next_doc_id: DocId,
    _lock: WriterLock,
}

impl IndexBuilder {
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode, analyzer: Analyzer) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        create_dir_all(&root).map_err(|e| SearchError::io(&root, e))?;
        let lock = WriterLock::acquire(&root)?;
        let paths = IndexPaths::new(&root);

        let base = match mode {
            OpenMode::Create => None,
            OpenMode::Append => match read_current(&paths)? {
                Some(_) => Some(IndexReader::open(&root, analyzer.config())?),
                None => None,
            },
        };
        let next_doc_id = base.as_ref().map_or(0, |b| b.total_docs());
        tracing::info!(path = %root.display(), ?mode, next_doc_id, analyzer = %analyzer.id(), "opened index for writing");

        Ok(IndexBuilder {
            root,
            paths,
            analyzer,
            searchable: vec![TITLE_FIELD.to_string()],
            base,
            buffer: InvertedIndex::new(),
            next_doc_id,
            _lock: lock,
        })
    }

    /// Stored fields that are also analyzed into their own searchable field.
    pub fn with_searchable_fields(mut self, fields: Vec<String>) -> Self {
        self.searchable = fields;
        self
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn next_doc_id(&self) -> DocId {
        self.next_doc_id
    }

    /// Documents added since the last commit.
    pub fn pending_docs(&self) -> usize {
        self.buffer.num_docs()
    }

    pub fn add_document(&mut self, fields: StoredFields, body: &str) -> DocId {
        let doc_id = self.next_doc_id;
        self.next_doc_id += 1;
        self.buffer.add_document(&self.analyzer, doc_id, fields, body, &self.searchable);
        doc_id
    }

    /// Analyze a batch on the rayon pool. Ids are reserved as one contiguous
    /// range in batch order; each worker fills its own partial index and the
    /// partials are sort-merged into the buffer.
    pub fn add_documents(&mut self, batch: Vec<(StoredFields, String)>) -> Vec<DocId> {
        let start = self.next_doc_id;
        let count = batch.len() as DocId;
        self.next_doc_id += count;

        let analyzer = &self.analyzer;
        let searchable = &self.searchable;
        let partial = batch
            .into_par_iter()
            .enumerate()
            .fold(InvertedIndex::new, |mut acc, (i, (fields, body))| {
                acc.add_document(analyzer, start + i as DocId, fields, &body, searchable);
                acc
            })
            .reduce(InvertedIndex::new, |mut a, b| {
                a.merge(b);
                a
            });
        self.buffer.merge(partial);
        (start..start + count).collect()
    }

    /// Write base snapshot + buffer as a new generation and publish it.
    pub fn commit(&mut self) -> Result<CommitStats> {
        let generation = list_generations(&self.paths)?.last().copied().unwrap_or(0) + 1;
        let mut writer = GenerationWriter::create(&self.paths, generation)?;

        let base_terms = self.base.as_ref().map_or(&[][..], |b| b.terms());
        let mut base_iter = base_terms.iter().peekable();
        let mut buf_iter = self.buffer.postings.iter().peekable();
        loop {
            let order = match (base_iter.peek(), buf_iter.peek()) {
                (Some(b), Some(((field, term), _))) => {
                    (b.field.as_str(), b.term.as_str()).cmp(&(field.as_str(), term.as_str()))
                }
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => break,
            };
            match order {
                Ordering::Less => {
                    if let (Some(entry), Some(base)) = (base_iter.next(), self.base.as_ref()) {
                        let postings = base.read_postings(entry)?;
                        writer.add_term(&entry.field, &entry.term, &postings)?;
                    }
                }
                Ordering::Greater => {
                    if let Some(((field, term), postings)) = buf_iter.next() {
                        writer.add_term(field, term, postings)?;
                    }
                }
                Ordering::Equal => {
                    if let (Some(entry), Some(((field, term), fresh)), Some(base)) =
                        (base_iter.next(), buf_iter.next(), self.base.as_ref())
                    {
                        let merged = merge_postings(base.read_postings(entry)?, fresh.clone());
                        writer.add_term(field, term, &merged)?;
                    }
                }
            }
        }

        let base_docs = self.base.as_ref().map_or(0, |b| b.total_docs());
        if let Some(base) = self.base.as_ref() {
            for doc_id in 0..base_docs {
                writer.add_document(&base.document(doc_id)?)?;
            }
        }
        for doc in &self.buffer.docs {
            writer.add_document(doc)?;
        }

        let mut fields: Vec<String> = self.base.as_ref().map_or_else(Vec::new, |b| b.fields().to_vec());
        fields.push(BODY_FIELD.to_string());
        fields.extend(self.searchable.iter().cloned());
        fields.sort();
        fields.dedup();

        let meta = writer.finish(&self.analyzer.id(), fields)?;
        publish(&self.paths, generation)?;

        let added_docs = self.adopt_snapshot(IndexReader::open(&self.root, self.analyzer.config()))?;
        remove_stale_generations(&self.paths, generation);

        tracing::info!(
            generation,
            added_docs,
            total_docs = meta.total_docs,
            num_terms = meta.num_terms,
            "committed index"
        );
        Ok(CommitStats {
            generation,
            added_docs,
            total_docs: meta.total_docs,
            num_terms: meta.num_terms,
            average_doc_length: meta.average_doc_length,
        })
    }

    /// Swap in the freshly published snapshot. On error the buffer and the
    /// old base stay as they were, so a retried commit still carries the
    /// buffered documents.
    fn adopt_snapshot(&mut self, reopened: Result<IndexReader>) -> Result<u32> {
        let reader = reopened?;
        let added_docs = self.buffer.num_docs() as u32;
        self.buffer = InvertedIndex::new();
        self.base = Some(reader);
        Ok(added_docs)
    }
}
