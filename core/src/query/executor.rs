//! Query evaluation over an [`IndexReader`] snapshot.
//!
//! Every node evaluates to a list of `(doc_id, score)` sorted by doc id;
//! boolean nodes combine their children's lists with sorted merges, so cost is
//! linear in the postings touched. Scores are summed TF-IDF contributions:
//! `tf = 1 + ln(freq)`, `idf = ln(N / (df + 1) + 1)`.

use super::Query;
use crate::error::{Result, SearchError};
use crate::reader::IndexReader;
use crate::{DocId, Posting, StoredDocument};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredDoc {
    pub doc_id: DocId,
    pub score: f32,
}

/// Ranked result page: descending score, ties by ascending doc id.
#[derive(Debug, Clone, PartialEq)]
pub struct TopDocs {
    /// Number of matching documents before truncation to the page size.
    pub total_hits: usize,
    pub hits: Vec<ScoredDoc>,
}

pub fn idf(total_docs: u32, doc_freq: u32) -> f32 {
    ((total_docs as f32) / (doc_freq as f32 + 1.0) + 1.0).ln()
}

pub fn tf(freq: u32) -> f32 {
    if freq > 0 { 1.0 + (freq as f32).ln() } else { 0.0 }
}

/// Runs queries against one snapshot. Cheap to create; holds no state of its
/// own, so any number may run concurrently over a shared reader.
pub struct Searcher<'a> {
    reader: &'a IndexReader,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> Searcher<'a> {
    pub fn new(reader: &'a IndexReader) -> Self {
        Self { reader, cancel: None }
    }

    /// The flag is checked between merge steps; once set, evaluation stops
    /// with [`SearchError::Cancelled`].
    pub fn with_cancel_flag(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn reader(&self) -> &IndexReader {
        self.reader
    }

    pub fn search(&self, query: &Query, hits_per_page: usize) -> Result<TopDocs> {
        if self.reader.total_docs() == 0 {
            return Err(SearchError::EmptyIndex);
        }
        let matches = self.evaluate(query)?;
        let total_hits = matches.len();
        let hits = top_k(matches, hits_per_page);
        tracing::debug!(total_hits, returned = hits.len(), "query executed");
        Ok(TopDocs { total_hits, hits })
    }

    /// Stored fields for a hit.
    pub fn resolve(&self, hit: &ScoredDoc) -> Result<StoredDocument> {
        self.reader.document(hit.doc_id)
    }

    fn check_cancelled(&self) -> Result<()> {
        match self.cancel {
            Some(flag) if flag.load(AtomicOrdering::Relaxed) => Err(SearchError::Cancelled),
            _ => Ok(()),
        }
    }

    fn evaluate(&self, query: &Query) -> Result<Vec<ScoredDoc>> {
        self.check_cancelled()?;
        match query {
            Query::Term { field, term } => self.term_scores(field, term),
            Query::Phrase { field, terms } => self.phrase_scores(field, terms),
            Query::Or(children) => {
                let mut acc = Vec::new();
                for child in children {
                    let list = self.evaluate(child)?;
                    acc = union(acc, list);
                    self.check_cancelled()?;
                }
                Ok(acc)
            }
            Query::And(children) => {
                let (negated, positive): (Vec<&Query>, Vec<&Query>) =
                    children.iter().partition(|c| matches!(c, Query::Not(_)));
                let mut acc: Option<Vec<ScoredDoc>> = None;
                for child in positive {
                    let list = self.evaluate(child)?;
                    acc = Some(match acc {
                        Some(prev) => intersect(prev, list),
                        None => list,
                    });
                    self.check_cancelled()?;
                    if acc.as_ref().is_some_and(Vec::is_empty) {
                        return Ok(Vec::new());
                    }
                }
                let mut acc = match acc {
                    Some(list) => list,
                    None => self.all_docs(),
                };
                for child in negated {
                    if let Query::Not(inner) = child {
                        let excluded = self.evaluate(inner)?;
                        acc = difference(acc, &excluded);
                        self.check_cancelled()?;
                    }
                }
                Ok(acc)
            }
            Query::Not(inner) => {
                let excluded = self.evaluate(inner)?;
                Ok(difference(self.all_docs(), &excluded))
            }
        }
    }

    fn all_docs(&self) -> Vec<ScoredDoc> {
        (0..self.reader.total_docs()).map(|doc_id| ScoredDoc { doc_id, score: 0.0 }).collect()
    }

    fn term_scores(&self, field: &str, term: &str) -> Result<Vec<ScoredDoc>> {
        let Some(entry) = self.reader.term_entry(field, term) else {
            return Ok(Vec::new());
        };
        let weight = idf(self.reader.total_docs(), entry.doc_freq);
        let postings = self.reader.read_postings(entry)?;
        Ok(postings
            .iter()
            .map(|p| ScoredDoc { doc_id: p.doc_id, score: tf(p.term_freq) * weight })
            .collect())
    }

    fn phrase_scores(&self, field: &str, terms: &[(String, u32)]) -> Result<Vec<ScoredDoc>> {
        let mut lists: Vec<(Vec<Posting>, u32)> = Vec::with_capacity(terms.len());
        let mut weight = 0.0;
        for (term, offset) in terms {
            let Some(entry) = self.reader.term_entry(field, term) else {
                return Ok(Vec::new());
            };
            weight += idf(self.reader.total_docs(), entry.doc_freq);
            lists.push((self.reader.read_postings(entry)?, *offset));
        }
        let Some(((first, first_offset), rest)) = lists.split_first() else {
            return Ok(Vec::new());
        };

        let mut cursors = vec![0usize; rest.len()];
        let mut out = Vec::new();
        'docs: for posting in first {
            let mut aligned: Vec<&Posting> = Vec::with_capacity(rest.len());
            for (i, (list, _)) in rest.iter().enumerate() {
                while cursors[i] < list.len() && list[cursors[i]].doc_id < posting.doc_id {
                    cursors[i] += 1;
                }
                match list.get(cursors[i]) {
                    Some(p) if p.doc_id == posting.doc_id => aligned.push(p),
                    _ => continue 'docs,
                }
            }
            let freq = posting
                .positions
                .iter()
                .filter(|&&start| {
                    let Some(base) = start.checked_sub(*first_offset) else { return false };
                    rest.iter()
                        .zip(&aligned)
                        .all(|((_, offset), p)| p.positions.binary_search(&(base + offset)).is_ok())
                })
                .count() as u32;
            if freq > 0 {
                out.push(ScoredDoc { doc_id: posting.doc_id, score: tf(freq) * weight });
            }
        }
        Ok(out)
    }
}

/// Union of two doc-id sorted lists, summing scores of shared docs.
fn union(a: Vec<ScoredDoc>, b: Vec<ScoredDoc>) -> Vec<ScoredDoc> {
    if a.is_empty() { return b; }
    if b.is_empty() { return a; }
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].doc_id.cmp(&b[j].doc_id) {
            Ordering::Less => { out.push(a[i]); i += 1; }
            Ordering::Greater => { out.push(b[j]); j += 1; }
            Ordering::Equal => {
                out.push(ScoredDoc { doc_id: a[i].doc_id, score: a[i].score + b[j].score });
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

/// Two-pointer intersection, advancing whichever side has the smaller doc id.
fn intersect(a: Vec<ScoredDoc>, b: Vec<ScoredDoc>) -> Vec<ScoredDoc> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].doc_id.cmp(&b[j].doc_id) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                out.push(ScoredDoc { doc_id: a[i].doc_id, score: a[i].score + b[j].score });
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Docs of `a` not present in `excluded`.
fn difference(a: Vec<ScoredDoc>, excluded: &[ScoredDoc]) -> Vec<ScoredDoc> {
    let mut j = 0;
    a.into_iter()
        .filter(|d| {
            while j < excluded.len() && excluded[j].doc_id < d.doc_id {
                j += 1;
            }
            !(j < excluded.len() && excluded[j].doc_id == d.doc_id)
        })
        .collect()
}

/// Heap entry ordered by score, then by *descending* doc id so that the
/// smaller doc id ranks higher on equal scores.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Ranked(ScoredDoc);

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .score
            .total_cmp(&other.0.score)
            .then_with(|| other.0.doc_id.cmp(&self.0.doc_id))
    }
}

/// Keep the `k` best entries with a bounded min-heap.
fn top_k(matches: Vec<ScoredDoc>, k: usize) -> Vec<ScoredDoc> {
    if k == 0 {
        return Vec::new();
    }
    let mut heap: BinaryHeap<Reverse<Ranked>> = BinaryHeap::with_capacity(k + 1);
    for doc in matches {
        let entry = Ranked(doc);
        if heap.len() < k {
            heap.push(Reverse(entry));
        } else if let Some(Reverse(min)) = heap.peek() {
            if entry > *min {
                heap.pop();
                heap.push(Reverse(entry));
            }
        }
    }
    let mut ranked: Vec<Ranked> = heap.into_iter().map(|Reverse(r)| r).collect();
    ranked.sort_by(|a, b| b.cmp(a));
    ranked.into_iter().map(|r| r.0).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sd(doc_id: DocId, score: f32) -> ScoredDoc {
        ScoredDoc { doc_id, score }
    }

    fn ids(list: &[ScoredDoc]) -> Vec<DocId> {
        list.iter().map(|d| d.doc_id).collect()
    }

    #[test]
    fn idf_is_positive_and_decreasing_in_df() {
        assert!(idf(2, 2) > 0.0);
        assert!(idf(100, 1) > idf(100, 10));
        assert!(idf(1, 0).is_finite());
    }

    #[test]
    fn tf_is_monotone() {
        assert_eq!(tf(0), 0.0);
        assert_eq!(tf(1), 1.0);
        assert!(tf(3) > tf(2));
    }

    #[test]
    fn merges_follow_set_semantics() {
        let a = vec![sd(0, 1.0), sd(2, 1.0), sd(4, 1.0)];
        let b = vec![sd(1, 2.0), sd(2, 2.0), sd(4, 2.0), sd(5, 2.0)];
        let u = union(a.clone(), b.clone());
        assert_eq!(ids(&u), vec![0, 1, 2, 4, 5]);
        assert_eq!(u[2].score, 3.0);
        let i = intersect(a.clone(), b.clone());
        assert_eq!(ids(&i), vec![2, 4]);
        assert_eq!(ids(&difference(b, &a)), vec![1, 5]);
    }

    #[test]
    fn top_k_orders_by_score_then_doc_id() {
        let matches = vec![sd(0, 1.0), sd(1, 3.0), sd(2, 1.0), sd(3, 2.0), sd(4, 1.0)];
        let top = top_k(matches.clone(), 3);
        assert_eq!(ids(&top), vec![1, 3, 0]);
        let all = top_k(matches, 10);
        assert_eq!(ids(&all), vec![1, 3, 0, 2, 4]);
    }

    #[test]
    fn top_k_prefers_lower_doc_id_when_evicting_ties() {
        let matches = vec![sd(5, 1.0), sd(6, 1.0), sd(1, 1.0), sd(2, 1.0)];
        assert_eq!(ids(&top_k(matches, 2)), vec![1, 2]);
    }
}
