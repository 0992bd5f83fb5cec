use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("cannot read document {path}: {reason}")]
    DocumentIo { path: PathBuf, reason: String },

    #[error("index I/O error at {path}: {source}")]
    IndexIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt or incompatible index at {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("analyzer configuration mismatch: index was built with `{found}`, current is `{expected}`")]
    ConfigMismatch { expected: String, found: String },

    #[error("query syntax error at position {position}: {message}")]
    QuerySyntax { position: usize, message: String },

    #[error("the index contains no documents")]
    EmptyIndex,

    #[error("index at {path} is locked by another writer")]
    LockContention { path: PathBuf },

    #[error("search cancelled")]
    Cancelled,
}

/// Coarse classification of a [`SearchError`], used by callers to decide
/// between skipping and aborting and to pick process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    DocumentIo,
    IndexIo,
    ConfigMismatch,
    QuerySyntax,
    EmptyIndex,
    LockContention,
    Cancelled,
}

pub type Result<T> = std::result::Result<T, SearchError>;

impl SearchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SearchError::DocumentIo { .. } => ErrorKind::DocumentIo,
            SearchError::IndexIo { .. } | SearchError::Corrupt { .. } => ErrorKind::IndexIo,
            SearchError::ConfigMismatch { .. } => ErrorKind::ConfigMismatch,
            SearchError::QuerySyntax { .. } => ErrorKind::QuerySyntax,
            SearchError::EmptyIndex => ErrorKind::EmptyIndex,
            SearchError::LockContention { .. } => ErrorKind::LockContention,
            SearchError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether a batch build may skip past this error and continue.
    pub fn is_per_document(&self) -> bool {
        matches!(self, SearchError::DocumentIo { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SearchError::IndexIo { path: path.into(), source }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        SearchError::Corrupt { path: path.into(), reason: reason.into() }
    }

    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        SearchError::QuerySyntax { position, message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_error_reports_position() {
        let err = SearchError::syntax(7, "unbalanced quote");
        assert_eq!(err.to_string(), "query syntax error at position 7: unbalanced quote");
        assert_eq!(err.kind(), ErrorKind::QuerySyntax);
    }

    #[test]
    fn only_document_errors_are_skippable() {
        let doc = SearchError::DocumentIo { path: "a.html".into(), reason: "bad utf-8".into() };
        assert!(doc.is_per_document());
        assert!(!SearchError::EmptyIndex.is_per_document());
        assert!(!SearchError::LockContention { path: "idx".into() }.is_per_document());
    }
}
