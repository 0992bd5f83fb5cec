use crate::tokenizer::Analyzer;
use crate::{DocId, Posting, StoredDocument, StoredFields, BODY_FIELD};
use std::collections::{BTreeMap, HashMap};

/// Dictionary key: (field, term). The derived ordering (field first, then
/// term, both bytewise) is the order terms are persisted in.
pub type TermKey = (String, String);

/// In-memory inverted index for documents not yet committed.
///
/// Postings lists are kept ascending by doc id with no duplicates.
#[derive(Debug, Default)]
pub struct InvertedIndex {
    pub postings: BTreeMap<TermKey, Vec<Posting>>,
    pub docs: Vec<StoredDocument>,
    pub total_tokens: u64,
}

impl InvertedIndex {
    pub fn new() -> Self { Self::default() }

    pub fn num_docs(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn document_frequency(&self, field: &str, term: &str) -> usize {
        self.postings
            .get(&(field.to_string(), term.to_string()))
            .map_or(0, Vec::len)
    }

    /// Analyze `body` into the body field and every `searchable` stored field
    /// into its own field, then buffer the postings under `doc_id`.
    ///
    /// `doc_id` must be greater than every doc id already buffered.
    pub fn add_document(
        &mut self,
        analyzer: &Analyzer,
        doc_id: DocId,
        fields: StoredFields,
        body: &str,
        searchable: &[String],
    ) {
        let mut length = 0u32;
        length += self.index_field(analyzer, doc_id, BODY_FIELD, body);
        for name in searchable {
            if let Some(value) = fields.get(name) {
                length += self.index_field(analyzer, doc_id, name, value);
            }
        }
        self.total_tokens += length as u64;
        self.docs.push(StoredDocument { doc_id, fields, length });
    }

    fn index_field(&mut self, analyzer: &Analyzer, doc_id: DocId, field: &str, text: &str) -> u32 {
        let tokens = analyzer.tokenize(text);
        let count = tokens.len() as u32;
        let mut positions: HashMap<String, Vec<u32>> = HashMap::new();
        for (term, pos) in tokens {
            positions.entry(term).or_default().push(pos as u32);
        }
        for (term, positions) in positions {
            let list = self.postings.entry((field.to_string(), term)).or_default();
            list.push(Posting { doc_id, term_freq: positions.len() as u32, positions });
        }
        count
    }

    /// Sort-merge another partial index into this one. Doc id sets must be
    /// disjoint; ranges may interleave.
    pub fn merge(&mut self, other: InvertedIndex) {
        for (key, list) in other.postings {
            match self.postings.get_mut(&key) {
                Some(existing) => {
                    let current = std::mem::take(existing);
                    *existing = merge_postings(current, list);
                }
                None => {
                    self.postings.insert(key, list);
                }
            }
        }
        let docs = std::mem::take(&mut self.docs);
        self.docs = merge_by_key(docs, other.docs, |d| d.doc_id);
        self.total_tokens += other.total_tokens;
    }
}

pub fn merge_postings(a: Vec<Posting>, b: Vec<Posting>) -> Vec<Posting> {
    merge_by_key(a, b, |p| p.doc_id)
}

fn merge_by_key<T, F>(a: Vec<T>, b: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> DocId,
{
    if b.is_empty() { return a; }
    if a.is_empty() { return b; }
    // common case: b strictly follows a
    if let (Some(last), Some(first)) = (a.last(), b.first()) {
        if key(last) < key(first) {
            let mut out = a;
            out.extend(b);
            return out;
        }
    }
    let mut out = Vec::with_capacity(a.len() + b.len());
    let mut a = a.into_iter().peekable();
    let mut b = b.into_iter().peekable();
    loop {
        let take_a = match (a.peek(), b.peek()) {
            (Some(x), Some(y)) => key(x) <= key(y),
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        let next = if take_a { a.next() } else { b.next() };
        out.extend(next);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(title: &str) -> StoredFields {
        let mut f = StoredFields::new();
        f.insert("title".into(), title.into());
        f
    }

    #[test]
    fn document_frequency_counts_documents_not_occurrences() {
        let analyzer = Analyzer::default();
        let mut idx = InvertedIndex::new();
        idx.add_document(&analyzer, 0, fields("a"), "dog dog dog", &[]);
        idx.add_document(&analyzer, 1, fields("b"), "dog cat", &[]);
        assert_eq!(idx.document_frequency(BODY_FIELD, "dog"), 2);
        assert_eq!(idx.document_frequency(BODY_FIELD, "cat"), 1);
        let dog = &idx.postings[&(BODY_FIELD.to_string(), "dog".to_string())];
        assert_eq!(dog[0].term_freq, 3);
        assert_eq!(dog[0].positions, vec![0, 1, 2]);
        assert_eq!(idx.total_tokens, 5);
    }

    #[test]
    fn searchable_fields_are_indexed_separately() {
        let analyzer = Analyzer::default();
        let mut idx = InvertedIndex::new();
        idx.add_document(&analyzer, 0, fields("Rust Guide"), "ownership", &["title".to_string()]);
        assert_eq!(idx.document_frequency("title", "rust"), 1);
        assert_eq!(idx.document_frequency(BODY_FIELD, "rust"), 0);
        assert_eq!(idx.docs[0].length, 3);
    }

    #[test]
    fn merge_interleaved_partials_keeps_doc_order() {
        let analyzer = Analyzer::default();
        let mut a = InvertedIndex::new();
        a.add_document(&analyzer, 0, fields("x"), "apple", &[]);
        a.add_document(&analyzer, 2, fields("x"), "apple", &[]);
        let mut b = InvertedIndex::new();
        b.add_document(&analyzer, 1, fields("y"), "apple pear", &[]);
        a.merge(b);
        let ids: Vec<DocId> = a.postings[&(BODY_FIELD.to_string(), "apple".to_string())]
            .iter()
            .map(|p| p.doc_id)
            .collect();
        assert_eq!(ids, vec![0, 1, 2]);
        let doc_ids: Vec<DocId> = a.docs.iter().map(|d| d.doc_id).collect();
        assert_eq!(doc_ids, vec![0, 1, 2]);
        assert_eq!(a.total_tokens, 4);
    }
}
