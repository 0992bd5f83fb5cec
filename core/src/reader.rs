use crate::error::{Result, SearchError};
use crate::persist::{
    load_meta, read_current, GenerationPaths, IndexPaths, MetaFile, TermEntry, DOCS_FILE,
    DOCS_INDEX_FILE, POSTINGS_FILE, TERMS_FILE,
};
use crate::tokenizer::AnalyzerConfig;
use crate::{DocId, Posting, StoredDocument};
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// How often to re-read `CURRENT` when a commit removed the generation we
/// were about to open.
const OPEN_RETRIES: usize = 3;

/// Read-only file contents; mapped unless the file is empty.
struct MappedFile(Option<Mmap>);

impl MappedFile {
    fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| SearchError::io(path, e))?;
        let len = file.metadata().map_err(|e| SearchError::io(path, e))?.len();
        if len == 0 {
            return Ok(MappedFile(None));
        }
        // SAFETY: generation files are never modified after publication.
        let map = unsafe { Mmap::map(&file) }.map_err(|e| SearchError::io(path, e))?;
        Ok(MappedFile(Some(map)))
    }

    fn as_slice(&self) -> &[u8] {
        self.0.as_deref().unwrap_or(&[])
    }
}

/// Immutable snapshot of one committed generation.
///
/// Safe to share across threads; nothing in it changes after open.
pub struct IndexReader {
    root: PathBuf,
    paths: GenerationPaths,
    meta: MetaFile,
    terms: Vec<TermEntry>,
    postings: MappedFile,
    docs: MappedFile,
    doc_offsets: MappedFile,
}

impl IndexReader {
    /// Open the published snapshot, refusing it if it was built with a
    /// different analyzer configuration.
    pub fn open<P: AsRef<Path>>(root: P, analyzer: &AnalyzerConfig) -> Result<Self> {
        let reader = Self::open_unchecked(root)?;
        let expected = analyzer.id();
        if reader.meta.analyzer_id != expected {
            return Err(SearchError::ConfigMismatch { expected, found: reader.meta.analyzer_id.clone() });
        }
        Ok(reader)
    }

    /// Open the published snapshot without checking the analyzer id.
    pub fn open_unchecked<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        let paths = IndexPaths::new(root);
        if !root.is_dir() {
            return Err(SearchError::io(
                root,
                std::io::Error::new(std::io::ErrorKind::NotFound, "index directory does not exist"),
            ));
        }
        let mut attempt = 0;
        loop {
            attempt += 1;
            let generation = read_current(&paths)?
                .ok_or_else(|| SearchError::corrupt(root, "no committed snapshot"))?;
            match Self::open_generation(root, paths.generation(generation)) {
                Err(SearchError::IndexIo { source, .. })
                    if source.kind() == std::io::ErrorKind::NotFound && attempt < OPEN_RETRIES =>
                {
                    tracing::debug!(generation, attempt, "generation vanished during open, retrying");
                    continue;
                }
                other => return other,
            }
        }
    }

    fn open_generation(root: &Path, paths: GenerationPaths) -> Result<Self> {
        let meta = load_meta(&paths)?;
        let postings = MappedFile::open(&paths.postings())?;
        let docs = MappedFile::open(&paths.docs())?;
        let doc_offsets = MappedFile::open(&paths.docs_index())?;
        let terms_file = MappedFile::open(&paths.terms())?;

        verify_checksum(&meta, &paths.postings(), POSTINGS_FILE, postings.as_slice())?;
        verify_checksum(&meta, &paths.docs(), DOCS_FILE, docs.as_slice())?;
        verify_checksum(&meta, &paths.docs_index(), DOCS_INDEX_FILE, doc_offsets.as_slice())?;
        verify_checksum(&meta, &paths.terms(), TERMS_FILE, terms_file.as_slice())?;

        let terms: Vec<TermEntry> = bincode::deserialize(terms_file.as_slice())
            .map_err(|e| SearchError::corrupt(paths.terms(), e.to_string()))?;
        if terms.len() as u64 != meta.num_terms {
            return Err(SearchError::corrupt(paths.terms(), "term count disagrees with header"));
        }
        let expected_idx = (meta.total_docs as usize + 1) * 8;
        if doc_offsets.as_slice().len() != expected_idx {
            return Err(SearchError::corrupt(paths.docs_index(), "document offset table has wrong size"));
        }

        tracing::debug!(
            generation = meta.generation,
            total_docs = meta.total_docs,
            num_terms = meta.num_terms,
            "opened index snapshot"
        );
        Ok(IndexReader { root: root.to_path_buf(), paths, meta, terms, postings, docs, doc_offsets })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn meta(&self) -> &MetaFile {
        &self.meta
    }

    pub fn generation(&self) -> u64 {
        self.meta.generation
    }

    pub fn total_docs(&self) -> u32 {
        self.meta.total_docs
    }

    pub fn average_doc_length(&self) -> f64 {
        self.meta.average_doc_length
    }

    pub fn analyzer_id(&self) -> &str {
        &self.meta.analyzer_id
    }

    pub fn fields(&self) -> &[String] {
        &self.meta.fields
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.meta.fields.iter().any(|f| f == field)
    }

    /// Sorted term table.
    pub fn terms(&self) -> &[TermEntry] {
        &self.terms
    }

    pub fn term_entry(&self, field: &str, term: &str) -> Option<&TermEntry> {
        self.terms
            .binary_search_by(|e| (e.field.as_str(), e.term.as_str()).cmp(&(field, term)))
            .ok()
            .map(|i| &self.terms[i])
    }

    pub fn doc_freq(&self, field: &str, term: &str) -> u32 {
        self.term_entry(field, term).map_or(0, |e| e.doc_freq)
    }

    /// Postings of a term; an unknown term has an empty list.
    pub fn postings(&self, field: &str, term: &str) -> Result<Vec<Posting>> {
        match self.term_entry(field, term) {
            Some(entry) => self.read_postings(entry),
            None => Ok(Vec::new()),
        }
    }

    pub fn read_postings(&self, entry: &TermEntry) -> Result<Vec<Posting>> {
        let bytes = self.postings.as_slice();
        let start = entry.offset as usize;
        let end = start + entry.len as usize;
        let slice = bytes
            .get(start..end)
            .ok_or_else(|| SearchError::corrupt(self.paths.postings(), "postings block out of bounds"))?;
        bincode::deserialize(slice).map_err(|e| SearchError::corrupt(self.paths.postings(), e.to_string()))
    }

    /// Stored fields of a document, located through the offset table.
    pub fn document(&self, doc_id: DocId) -> Result<StoredDocument> {
        if doc_id >= self.meta.total_docs {
            return Err(SearchError::corrupt(self.paths.docs(), format!("no document {doc_id}")));
        }
        let start = self.doc_offset(doc_id as usize);
        let end = self.doc_offset(doc_id as usize + 1);
        let slice = self
            .docs
            .as_slice()
            .get(start..end)
            .ok_or_else(|| SearchError::corrupt(self.paths.docs(), "document block out of bounds"))?;
        bincode::deserialize(slice).map_err(|e| SearchError::corrupt(self.paths.docs(), e.to_string()))
    }

    fn doc_offset(&self, i: usize) -> usize {
        let raw = &self.doc_offsets.as_slice()[i * 8..i * 8 + 8];
        let mut buf = [0u8; 8];
        buf.copy_from_slice(raw);
        u64::from_le_bytes(buf) as usize
    }
}

fn verify_checksum(meta: &MetaFile, path: &Path, name: &str, bytes: &[u8]) -> Result<()> {
    let expected = meta
        .checksums
        .get(name)
        .ok_or_else(|| SearchError::corrupt(path, "missing checksum in header"))?;
    let actual = crc32fast::hash(bytes);
    if actual != *expected {
        return Err(SearchError::corrupt(path, format!("checksum mismatch ({actual:08x} != {expected:08x})")));
    }
    Ok(())
}
