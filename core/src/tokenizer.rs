use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Bumped whenever tokenization output changes for an unchanged configuration.
pub const ANALYZER_VERSION: u32 = 1;

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)[\p{L}\p{N}][\p{L}\p{N}_']*").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref ENGLISH_STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","an","and","are","as","at","be","but","by","for","if","in","into","is","it",
            "no","not","of","on","or","such","that","the","their","then","there","these",
            "they","this","to","was","will","with",
        ];
        words.iter().copied().collect()
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopWords {
    English,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    pub stopwords: StopWords,
    pub stemming: bool,
    pub fold_accents: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self { stopwords: StopWords::English, stemming: false, fold_accents: false }
    }
}

impl AnalyzerConfig {
    /// Stable identifier persisted in the index header; two configurations
    /// produce identical term streams iff their ids are equal.
    pub fn id(&self) -> String {
        let stop = match self.stopwords {
            StopWords::English => "english",
            StopWords::None => "none",
        };
        format!(
            "std-v{};stop={};stem={};fold={}",
            ANALYZER_VERSION,
            stop,
            on_off(self.stemming),
            on_off(self.fold_accents)
        )
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}

/// Turns raw text into normalized terms. Pure function of its configuration.
#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    config: AnalyzerConfig,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn id(&self) -> String {
        self.config.id()
    }

    fn is_stopword(&self, token: &str) -> bool {
        match self.config.stopwords {
            StopWords::English => ENGLISH_STOPWORDS.contains(token),
            StopWords::None => false,
        }
    }

    /// Tokenize text into (term, position). Removed stop-words keep their
    /// position slot so phrase matching sees the gap.
    pub fn tokenize(&self, text: &str) -> Vec<(String, usize)> {
        let normalized = if self.config.fold_accents {
            text.nfkd().filter(|c| !is_combining_mark(*c)).nfkc().collect::<String>()
        } else {
            text.nfkc().collect::<String>()
        };
        let normalized = normalized.to_lowercase();
        let mut tokens = Vec::new();
        for (pos, mat) in RE.find_iter(&normalized).enumerate() {
            let token = mat.as_str().trim_end_matches('\'');
            if self.is_stopword(token) { continue; }
            let term = if self.config.stemming {
                STEMMER.stem(token).to_string()
            } else {
                token.to_string()
            };
            tokens.push((term, pos));
        }
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokenize() {
        let analyzer = Analyzer::new(AnalyzerConfig { stemming: true, ..Default::default() });
        let t = analyzer.tokenize("Running, runner's run!");
        assert!(t.iter().any(|(w, _)| w == "run"));
    }

    #[test]
    fn stopwords_leave_position_gaps() {
        let t = Analyzer::default().tokenize("the cat and the dog");
        assert_eq!(t, vec![("cat".to_string(), 1), ("dog".to_string(), 4)]);
    }

    #[test]
    fn config_id_reflects_every_switch() {
        let base = AnalyzerConfig::default();
        assert_eq!(base.id(), "std-v1;stop=english;stem=off;fold=off");
        let stemmed = AnalyzerConfig { stemming: true, ..base.clone() };
        assert_ne!(base.id(), stemmed.id());
        let no_stop = AnalyzerConfig { stopwords: StopWords::None, ..base.clone() };
        assert_ne!(base.id(), no_stop.id());
    }
}
