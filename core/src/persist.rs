//! On-disk layout of an index directory.
//!
//! ```text
//! <root>/write.lock         writer lock
//! <root>/CURRENT            name of the published generation
//! <root>/gen-NNNNNN/        one immutable committed snapshot
//!     meta.json             header: format, analyzer id, corpus statistics, checksums
//!     terms.bin             bincode Vec<TermEntry>, sorted by (field, term)
//!     postings.bin          concatenated bincode Vec<Posting> blocks
//!     docs.bin              concatenated bincode StoredDocument blocks
//!     docs.idx              (total_docs + 1) little-endian u64 offsets into docs.bin
//! ```
//!
//! A commit writes a fresh generation directory, fsyncs it and then renames
//! `CURRENT.tmp` over `CURRENT`. Readers only ever follow `CURRENT`.

use crate::error::{Result, SearchError};
use crate::{Posting, StoredDocument};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, create_dir_all, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub const FORMAT_MAGIC: &str = "searchcore-index";
pub const FORMAT_VERSION: u32 = 1;

const CURRENT: &str = "CURRENT";
const CURRENT_TMP: &str = "CURRENT.tmp";
const GENERATION_PREFIX: &str = "gen-";

pub const TERMS_FILE: &str = "terms.bin";
pub const POSTINGS_FILE: &str = "postings.bin";
pub const DOCS_FILE: &str = "docs.bin";
pub const DOCS_INDEX_FILE: &str = "docs.idx";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFile {
    pub format: String,
    pub format_version: u32,
    pub analyzer_id: String,
    pub generation: u64,
    pub total_docs: u32,
    pub total_tokens: u64,
    pub average_doc_length: f64,
    pub num_terms: u64,
    /// Names of the analyzed fields, i.e. the fields a query may name.
    pub fields: Vec<String>,
    pub created_at: String,
    /// CRC32 of each data file, keyed by file name.
    pub checksums: BTreeMap<String, u32>,
}

/// One row of the sorted term table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermEntry {
    pub field: String,
    pub term: String,
    pub doc_freq: u32,
    pub offset: u64,
    pub len: u64,
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn current(&self) -> PathBuf { self.root.join(CURRENT) }
    fn current_tmp(&self) -> PathBuf { self.root.join(CURRENT_TMP) }
    pub fn generation(&self, generation: u64) -> GenerationPaths {
        GenerationPaths { dir: self.root.join(generation_name(generation)) }
    }
}

pub struct GenerationPaths {
    pub dir: PathBuf,
}

impl GenerationPaths {
    pub fn meta(&self) -> PathBuf { self.dir.join("meta.json") }
    pub fn terms(&self) -> PathBuf { self.dir.join(TERMS_FILE) }
    pub fn postings(&self) -> PathBuf { self.dir.join(POSTINGS_FILE) }
    pub fn docs(&self) -> PathBuf { self.dir.join(DOCS_FILE) }
    pub fn docs_index(&self) -> PathBuf { self.dir.join(DOCS_INDEX_FILE) }
}

fn generation_name(generation: u64) -> String {
    format!("{GENERATION_PREFIX}{generation:06}")
}

fn parse_generation_name(name: &str) -> Option<u64> {
    name.strip_prefix(GENERATION_PREFIX)?.parse().ok()
}

/// The published generation, or `None` if nothing was ever committed.
pub fn read_current(paths: &IndexPaths) -> Result<Option<u64>> {
    let path = paths.current();
    let mut buf = String::new();
    match File::open(&path) {
        Ok(mut f) => {
            f.read_to_string(&mut buf).map_err(|e| SearchError::io(&path, e))?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SearchError::io(&path, e)),
    }
    parse_generation_name(buf.trim())
        .map(Some)
        .ok_or_else(|| SearchError::corrupt(&path, format!("unrecognized generation name `{}`", buf.trim())))
}

/// Atomically point `CURRENT` at `generation`.
pub fn publish(paths: &IndexPaths, generation: u64) -> Result<()> {
    let tmp = paths.current_tmp();
    {
        let mut f = File::create(&tmp).map_err(|e| SearchError::io(&tmp, e))?;
        f.write_all(generation_name(generation).as_bytes())
            .and_then(|_| f.sync_all())
            .map_err(|e| SearchError::io(&tmp, e))?;
    }
    let current = paths.current();
    fs::rename(&tmp, &current).map_err(|e| SearchError::io(&current, e))?;
    sync_dir(&paths.root)?;
    Ok(())
}

/// Generation numbers of every generation directory present, ascending.
pub fn list_generations(paths: &IndexPaths) -> Result<Vec<u64>> {
    let entries = match fs::read_dir(&paths.root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(SearchError::io(&paths.root, e)),
    };
    let mut gens: Vec<u64> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().to_str().and_then(parse_generation_name))
        .collect();
    gens.sort_unstable();
    Ok(gens)
}

/// Best-effort removal of every generation other than `keep`. Readers that
/// already mapped an old generation keep their view on unix.
pub fn remove_stale_generations(paths: &IndexPaths, keep: u64) {
    let gens = match list_generations(paths) {
        Ok(g) => g,
        Err(e) => {
            tracing::warn!(error = %e, "could not list generations for cleanup");
            return;
        }
    };
    for generation in gens.into_iter().filter(|g| *g != keep) {
        let dir = paths.generation(generation).dir;
        if let Err(e) = fs::remove_dir_all(&dir) {
            tracing::warn!(dir = %dir.display(), error = %e, "could not remove stale generation");
        }
    }
}

pub fn save_meta(paths: &GenerationPaths, meta: &MetaFile) -> Result<()> {
    let path = paths.meta();
    let json = serde_json::to_string_pretty(meta)
        .map_err(|e| SearchError::corrupt(&path, e.to_string()))?;
    let mut f = File::create(&path).map_err(|e| SearchError::io(&path, e))?;
    f.write_all(json.as_bytes())
        .and_then(|_| f.sync_all())
        .map_err(|e| SearchError::io(&path, e))?;
    Ok(())
}

pub fn load_meta(paths: &GenerationPaths) -> Result<MetaFile> {
    let path = paths.meta();
    let mut f = File::open(&path).map_err(|e| SearchError::io(&path, e))?;
    let mut buf = String::new();
    f.read_to_string(&mut buf).map_err(|e| SearchError::io(&path, e))?;
    let meta: MetaFile = serde_json::from_str(&buf)
        .map_err(|e| SearchError::corrupt(&path, format!("unreadable header: {e}")))?;
    if meta.format != FORMAT_MAGIC {
        return Err(SearchError::corrupt(&path, format!("not an index header (format `{}`)", meta.format)));
    }
    if meta.format_version != FORMAT_VERSION {
        return Err(SearchError::corrupt(
            &path,
            format!("incompatible format version {}, expected {}", meta.format_version, FORMAT_VERSION),
        ));
    }
    Ok(meta)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| SearchError::io(dir, e))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

/// Buffered file writer that tracks its length and CRC32.
struct ChecksumWriter {
    path: PathBuf,
    inner: BufWriter<File>,
    hasher: crc32fast::Hasher,
    written: u64,
}

impl ChecksumWriter {
    fn create(path: PathBuf) -> Result<Self> {
        let f = File::create(&path).map_err(|e| SearchError::io(&path, e))?;
        Ok(Self { path, inner: BufWriter::new(f), hasher: crc32fast::Hasher::new(), written: 0 })
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes).map_err(|e| SearchError::io(&self.path, e))?;
        self.hasher.update(bytes);
        self.written += bytes.len() as u64;
        Ok(())
    }

    fn finish(self) -> Result<(String, u32)> {
        let path = self.path;
        let file = self.inner.into_inner().map_err(|e| SearchError::io(&path, e.into_error()))?;
        file.sync_all().map_err(|e| SearchError::io(&path, e))?;
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string();
        Ok((name, self.hasher.finalize()))
    }
}

/// Streams one generation to disk. Terms must arrive in (field, term) order
/// and documents in dense doc id order starting at 0.
pub struct GenerationWriter {
    paths: GenerationPaths,
    generation: u64,
    postings: ChecksumWriter,
    docs: ChecksumWriter,
    terms: Vec<TermEntry>,
    doc_offsets: Vec<u64>,
    total_tokens: u64,
}

impl GenerationWriter {
    pub fn create(index: &IndexPaths, generation: u64) -> Result<Self> {
        let paths = index.generation(generation);
        if paths.dir.exists() {
            // leftover from an interrupted commit; never published
            fs::remove_dir_all(&paths.dir).map_err(|e| SearchError::io(&paths.dir, e))?;
        }
        create_dir_all(&paths.dir).map_err(|e| SearchError::io(&paths.dir, e))?;
        let postings = ChecksumWriter::create(paths.postings())?;
        let docs = ChecksumWriter::create(paths.docs())?;
        Ok(Self {
            paths,
            generation,
            postings,
            docs,
            terms: Vec::new(),
            doc_offsets: vec![0],
            total_tokens: 0,
        })
    }

    pub fn add_term(&mut self, field: &str, term: &str, postings: &[Posting]) -> Result<()> {
        if let Some(last) = self.terms.last() {
            if (last.field.as_str(), last.term.as_str()) >= (field, term) {
                return Err(SearchError::corrupt(
                    self.paths.terms(),
                    format!("term {field}:{term} written out of order"),
                ));
            }
        }
        let bytes = bincode::serialize(postings)
            .map_err(|e| SearchError::corrupt(self.paths.postings(), e.to_string()))?;
        let offset = self.postings.written;
        self.postings.write(&bytes)?;
        self.terms.push(TermEntry {
            field: field.to_string(),
            term: term.to_string(),
            doc_freq: postings.len() as u32,
            offset,
            len: bytes.len() as u64,
        });
        Ok(())
    }

    pub fn add_document(&mut self, doc: &StoredDocument) -> Result<()> {
        let expected = (self.doc_offsets.len() - 1) as u32;
        if doc.doc_id != expected {
            return Err(SearchError::corrupt(
                self.paths.docs(),
                format!("document {} written where {} was expected", doc.doc_id, expected),
            ));
        }
        let bytes = bincode::serialize(doc)
            .map_err(|e| SearchError::corrupt(self.paths.docs(), e.to_string()))?;
        self.docs.write(&bytes)?;
        self.doc_offsets.push(self.docs.written);
        self.total_tokens += doc.length as u64;
        Ok(())
    }

    /// Write the remaining files and the header, fsync, and return the header.
    /// The generation is not visible to readers until [`publish`]ed.
    pub fn finish(self, analyzer_id: &str, fields: Vec<String>) -> Result<MetaFile> {
        let mut checksums = BTreeMap::new();
        let (name, crc) = self.postings.finish()?;
        checksums.insert(name, crc);
        let (name, crc) = self.docs.finish()?;
        checksums.insert(name, crc);

        let mut terms = ChecksumWriter::create(self.paths.terms())?;
        let bytes = bincode::serialize(&self.terms)
            .map_err(|e| SearchError::corrupt(self.paths.terms(), e.to_string()))?;
        terms.write(&bytes)?;
        let (name, crc) = terms.finish()?;
        checksums.insert(name, crc);

        let mut idx = ChecksumWriter::create(self.paths.docs_index())?;
        for off in &self.doc_offsets {
            idx.write(&off.to_le_bytes())?;
        }
        let (name, crc) = idx.finish()?;
        checksums.insert(name, crc);

        let total_docs = (self.doc_offsets.len() - 1) as u32;
        let average_doc_length = if total_docs > 0 {
            self.total_tokens as f64 / total_docs as f64
        } else {
            0.0
        };
        let meta = MetaFile {
            format: FORMAT_MAGIC.to_string(),
            format_version: FORMAT_VERSION,
            analyzer_id: analyzer_id.to_string(),
            generation: self.generation,
            total_docs,
            total_tokens: self.total_tokens,
            average_doc_length,
            num_terms: self.terms.len() as u64,
            fields,
            created_at: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "".into()),
            checksums,
        };
        save_meta(&self.paths, &meta)?;
        sync_dir(&self.paths.dir)?;
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_switches_current_generation() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        assert_eq!(read_current(&paths).unwrap(), None);
        publish(&paths, 3).unwrap();
        assert_eq!(read_current(&paths).unwrap(), Some(3));
        publish(&paths, 4).unwrap();
        assert_eq!(read_current(&paths).unwrap(), Some(4));
    }

    #[test]
    fn header_round_trips_and_rejects_other_formats() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let writer = GenerationWriter::create(&paths, 1).unwrap();
        let meta = writer.finish("std-v1;stop=english;stem=off;fold=off", vec!["text".into()]).unwrap();
        assert_eq!(meta.total_docs, 0);
        assert_eq!(meta.checksums.len(), 4);
        let gen = paths.generation(1);
        assert_eq!(load_meta(&gen).unwrap(), meta);

        let mut bad = meta.clone();
        bad.format_version = FORMAT_VERSION + 1;
        save_meta(&gen, &bad).unwrap();
        assert!(matches!(load_meta(&gen), Err(SearchError::Corrupt { .. })));
    }

    #[test]
    fn out_of_order_terms_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = GenerationWriter::create(&IndexPaths::new(dir.path()), 1).unwrap();
        let p = vec![Posting { doc_id: 0, term_freq: 1, positions: vec![0] }];
        writer.add_term("text", "dog", &p).unwrap();
        assert!(writer.add_term("text", "cat", &p).is_err());
        assert!(writer.add_term("title", "cat", &p).is_ok());
    }

    #[test]
    fn stale_generations_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        for g in 1..=3 {
            GenerationWriter::create(&paths, g).unwrap().finish("id", vec![]).unwrap();
        }
        remove_stale_generations(&paths, 3);
        assert_eq!(list_generations(&paths).unwrap(), vec![3]);
    }
}
