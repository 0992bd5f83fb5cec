use crate::tokenizer::{AnalyzerConfig, StopWords};

pub const DEFAULT_HITS_PER_PAGE: usize = 10;

/// Runtime configuration shared by the build and query programs.
///
/// Both programs must see the same analyzer settings; a mismatch is caught
/// when the index is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    pub analyzer: AnalyzerConfig,
    pub hits_per_page: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { analyzer: AnalyzerConfig::default(), hits_per_page: DEFAULT_HITS_PER_PAGE }
    }
}

impl SearchConfig {
    /// Read `SEARCH_STOPWORDS`, `SEARCH_STEMMING`, `SEARCH_FOLD_ACCENTS` and
    /// `SEARCH_HITS_PER_PAGE`; unset or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(v) = lookup("SEARCH_STOPWORDS") {
            match v.trim().to_ascii_lowercase().as_str() {
                "english" => cfg.analyzer.stopwords = StopWords::English,
                "none" | "" => cfg.analyzer.stopwords = StopWords::None,
                other => tracing::warn!(value = other, "unknown SEARCH_STOPWORDS, keeping default"),
            }
        }
        if let Some(v) = lookup("SEARCH_STEMMING") {
            cfg.analyzer.stemming = parse_flag(&v);
        }
        if let Some(v) = lookup("SEARCH_FOLD_ACCENTS") {
            cfg.analyzer.fold_accents = parse_flag(&v);
        }
        if let Some(v) = lookup("SEARCH_HITS_PER_PAGE") {
            match v.trim().parse::<usize>() {
                Ok(n) if n > 0 => cfg.hits_per_page = n,
                _ => tracing::warn!(value = %v, "invalid SEARCH_HITS_PER_PAGE, keeping default"),
            }
        }
        cfg
    }
}

fn parse_flag(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
