pub mod executor;
pub mod parser;

/// Query tree produced by [`parser::QueryParser`] and evaluated by
/// [`executor::Searcher`]. Terms are already analyzed.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Term { field: String, term: String },
    /// Terms with their relative positions; a gap means a removed stop-word.
    Phrase { field: String, terms: Vec<(String, u32)> },
    And(Vec<Query>),
    Or(Vec<Query>),
    Not(Box<Query>),
}

impl Query {
    pub fn term(field: impl Into<String>, term: impl Into<String>) -> Self {
        Query::Term { field: field.into(), term: term.into() }
    }

    pub fn not(child: Query) -> Self {
        Query::Not(Box::new(child))
    }

    /// A query that can match nothing (e.g. only stop-words were given).
    pub fn is_empty(&self) -> bool {
        matches!(self, Query::Or(children) if children.is_empty())
    }
}
