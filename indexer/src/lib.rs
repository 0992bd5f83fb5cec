use anyhow::{Context, Result};
use clap::Parser;
use rayon::prelude::*;
use searchcore::{
    Analyzer, CommitStats, IndexBuilder, OpenMode, SearchConfig, SearchError, StoredFields, PATH_FIELD,
    TITLE_FIELD,
};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub mod extract;

#[derive(Parser, Debug)]
#[command(name = "indexer")]
#[command(about = "Build a full-text index from a directory of HTML files", long_about = None)]
pub struct Cli {
    /// Index directory to save to (aka. output)
    #[arg(short = 'i', long = "index")]
    pub index: PathBuf,
    /// Directory containing the html files to index (aka. input)
    #[arg(short = 'd', long = "docs")]
    pub docs: PathBuf,
}

const LONG_OPTIONS: &[&str] = &["index", "docs", "help"];

/// Options whose next argument is a value and must be passed through as is.
const VALUE_OPTIONS: &[&str] = &["i", "d", "index", "docs"];

/// Accept the single-dash long options (`-index`, `-docs`, `-help`) next to
/// clap's `--index` style. Option values are never rewritten.
pub fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut value_next = false;
    args.into_iter()
        .map(|arg| {
            if std::mem::take(&mut value_next) {
                return arg;
            }
            let rewritten = arg.to_str().and_then(|s| {
                let name = s.strip_prefix("--").or_else(|| s.strip_prefix('-'))?;
                value_next = VALUE_OPTIONS.contains(&name);
                (!s.starts_with("--") && LONG_OPTIONS.contains(&name)).then(|| OsString::from(format!("-{s}")))
            });
            rewritten.unwrap_or(arg)
        })
        .collect()
}

/// A document read from disk, ready for analysis.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub path: PathBuf,
    pub title: String,
    pub body: String,
}

impl SourceDocument {
    fn into_fields(self) -> (StoredFields, String) {
        let mut fields = StoredFields::new();
        fields.insert(TITLE_FIELD.to_string(), self.title);
        fields.insert(PATH_FIELD.to_string(), self.path.to_string_lossy().into_owned());
        (fields, self.body)
    }
}

#[derive(Debug)]
pub struct BuildReport {
    pub indexed: usize,
    pub failed: usize,
    pub commit: CommitStats,
}

/// Every regular file below `docs_dir`, sorted for a stable doc id order.
/// Unreadable entries below the root are returned as per-document errors.
pub fn collect_files(docs_dir: &Path) -> Result<(Vec<PathBuf>, Vec<SearchError>)> {
    fs::read_dir(docs_dir).with_context(|| format!("cannot open document directory {}", docs_dir.display()))?;
    let mut files = Vec::new();
    let mut errors = Vec::new();
    for entry in WalkDir::new(docs_dir).sort_by_file_name() {
        match entry {
            Ok(e) if e.file_type().is_file() => files.push(e.into_path()),
            Ok(_) => {}
            Err(e) => errors.push(SearchError::DocumentIo {
                path: e.path().map(Path::to_path_buf).unwrap_or_else(|| docs_dir.to_path_buf()),
                reason: e.to_string(),
            }),
        }
    }
    Ok((files, errors))
}

/// Read one file and extract its title and text. Failures concern only this
/// document.
pub fn load_document(path: &Path) -> searchcore::Result<SourceDocument> {
    let bytes = fs::read(path).map_err(|e| SearchError::DocumentIo {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let raw = String::from_utf8(bytes).map_err(|e| SearchError::DocumentIo {
        path: path.to_path_buf(),
        reason: format!("not valid UTF-8: {e}"),
    })?;
    let extracted = extract::extract_html(&raw);
    let title = extracted.title.unwrap_or_else(|| {
        path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
    });
    Ok(SourceDocument { path: path.to_path_buf(), title, body: extracted.text })
}

/// Rebuild the index at `index_dir` from every file under `docs_dir`.
pub fn build_index(docs_dir: &Path, index_dir: &Path, config: &SearchConfig) -> Result<BuildReport> {
    let (files, walk_errors) = collect_files(docs_dir)?;
    let mut builder = IndexBuilder::open(index_dir, OpenMode::Create, Analyzer::new(config.analyzer.clone()))
        .with_context(|| format!("cannot open index {}", index_dir.display()))?;
    tracing::info!(files = files.len(), docs = %docs_dir.display(), "reading documents");

    let loaded: Vec<searchcore::Result<SourceDocument>> = files.par_iter().map(|p| load_document(p)).collect();

    let mut failed = 0usize;
    for err in &walk_errors {
        tracing::warn!(error = %err, "skipping unreadable entry");
        failed += 1;
    }
    let mut batch = Vec::with_capacity(loaded.len());
    for result in loaded {
        match result {
            Ok(doc) => batch.push(doc.into_fields()),
            Err(err) => {
                tracing::warn!(error = %err, "skipping document");
                failed += 1;
            }
        }
    }

    let indexed = batch.len();
    builder.add_documents(batch);
    let commit = builder.commit().context("commit failed")?;
    tracing::info!(indexed, failed, total_docs = commit.total_docs, output = %index_dir.display(), "index build complete");
    Ok(BuildReport { indexed, failed, commit })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn single_dash_long_options_are_accepted() {
        let args = normalize_args(os(&["indexer", "-index", "out", "-d", "in", "--docs", "x", "-docsx"]));
        assert_eq!(args, os(&["indexer", "--index", "out", "-d", "in", "--docs", "x", "-docsx"]));
        let cli = Cli::try_parse_from(normalize_args(os(&["indexer", "-index", "out", "-docs", "in"]))).unwrap();
        assert_eq!(cli.index, PathBuf::from("out"));
        assert_eq!(cli.docs, PathBuf::from("in"));
    }

    #[test]
    fn option_values_are_not_rewritten() {
        let args = normalize_args(os(&["indexer", "-i", "-docs", "-docs", "-help"]));
        assert_eq!(args, os(&["indexer", "-i", "-docs", "--docs", "-help"]));
    }

    #[test]
    fn help_exits_zero() {
        let err = Cli::try_parse_from(normalize_args(os(&["indexer", "-help"]))).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
        assert_eq!(err.exit_code(), 0);
    }

    #[test]
    fn missing_required_option_is_an_argument_error() {
        let err = Cli::try_parse_from(os(&["indexer", "-i", "out"])).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
