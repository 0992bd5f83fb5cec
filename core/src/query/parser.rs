//! Recursive descent parser for query strings
//!
//! # Grammar
//!
//! ```text
//! query    := or_expr EOF
//! or_expr  := and_expr ((OR)? and_expr)*
//! and_expr := unary (AND unary)*
//! unary    := (NOT | '-') unary | primary
//! primary  := '(' or_expr ')' | FIELD ':' value | value
//! value    := WORD | '"' phrase '"'
//! ```
//!
//! Juxtaposed clauses are OR-ed. `&&`, `||` and `!` are synonyms of the
//! upper-case keywords. Positions in errors are character offsets.

use super::Query;
use crate::error::{Result, SearchError};
use crate::reader::IndexReader;
use crate::tokenizer::Analyzer;
use crate::{BODY_FIELD, TITLE_FIELD};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Phrase(String),
    And,
    Or,
    Not,
    Minus,
    Colon,
    LeftParen,
    RightParen,
    Eof,
}

impl Token {
    fn starts_clause(&self) -> bool {
        matches!(
            self,
            Token::Word(_) | Token::Phrase(_) | Token::Not | Token::Minus | Token::LeftParen
        )
    }
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    pos: usize,
}

fn is_word_char(ch: char) -> bool {
    !ch.is_whitespace() && !matches!(ch, '(' | ')' | ':' | '"')
}

/// `&&` and `||` end a word even without surrounding spaces.
fn starts_operator(rest: &[char]) -> bool {
    matches!(rest, ['&', '&', ..] | ['|', '|', ..])
}

fn lex(input: &str) -> Result<Vec<Spanned>> {
    let chars: Vec<char> = input.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        if ch.is_whitespace() {
            i += 1;
            continue;
        }
        let pos = i;
        let token = match ch {
            '(' => { i += 1; Token::LeftParen }
            ')' => { i += 1; Token::RightParen }
            ':' => { i += 1; Token::Colon }
            '-' => { i += 1; Token::Minus }
            '!' => { i += 1; Token::Not }
            '&' if chars.get(i + 1) == Some(&'&') => { i += 2; Token::And }
            '|' if chars.get(i + 1) == Some(&'|') => { i += 2; Token::Or }
            '"' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|c| *c == '"')
                    .ok_or_else(|| SearchError::syntax(pos, "unbalanced quote"))?;
                let text: String = chars[i + 1..i + 1 + close].iter().collect();
                i += close + 2;
                Token::Phrase(text)
            }
            _ => {
                let start = i;
                while i < chars.len() && is_word_char(chars[i]) && !starts_operator(&chars[i..]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "NOT" => Token::Not,
                    _ => Token::Word(word),
                }
            }
        };
        out.push(Spanned { token, pos });
    }
    out.push(Spanned { token: Token::Eof, pos: chars.len() });
    Ok(out)
}

/// Turns query strings into [`Query`] trees, analyzing every term with the
/// analyzer the index was built with.
#[derive(Debug, Clone)]
pub struct QueryParser {
    analyzer: Analyzer,
    default_field: String,
    fields: Vec<String>,
}

impl QueryParser {
    /// Parser accepting the body and title fields.
    pub fn new(analyzer: Analyzer) -> Self {
        Self {
            analyzer,
            default_field: BODY_FIELD.to_string(),
            fields: vec![BODY_FIELD.to_string(), TITLE_FIELD.to_string()],
        }
    }

    /// Parser accepting exactly the fields the index has analyzed.
    pub fn for_index(analyzer: Analyzer, reader: &IndexReader) -> Self {
        Self { fields: reader.fields().to_vec(), ..Self::new(analyzer) }
    }

    pub fn with_default_field(mut self, field: impl Into<String>) -> Self {
        self.default_field = field.into();
        self
    }

    pub fn parse(&self, input: &str) -> Result<Query> {
        if input.trim().is_empty() {
            return Err(SearchError::syntax(0, "empty query"));
        }
        let tokens = lex(input)?;
        let mut state = ParseState { parser: self, tokens, idx: 0 };
        let query = state.or_expr()?;
        let tail = state.peek();
        match tail.token {
            Token::Eof => {}
            Token::RightParen => return Err(SearchError::syntax(tail.pos, "unbalanced parenthesis")),
            _ => return Err(SearchError::syntax(tail.pos, "unexpected token")),
        }
        Ok(query.unwrap_or(Query::Or(Vec::new())))
    }

    fn analyze(&self, field: &str, text: &str) -> Option<Query> {
        let tokens = self.analyzer.tokenize(text);
        let first = tokens.first()?.1;
        if tokens.len() == 1 {
            let (term, _) = tokens.into_iter().next()?;
            return Some(Query::term(field, term));
        }
        let terms = tokens.into_iter().map(|(t, p)| (t, (p - first) as u32)).collect();
        Some(Query::Phrase { field: field.to_string(), terms })
    }
}

struct ParseState<'a> {
    parser: &'a QueryParser,
    tokens: Vec<Spanned>,
    idx: usize,
}

impl<'a> ParseState<'a> {
    fn peek(&self) -> &Spanned {
        &self.tokens[self.idx.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Spanned {
        let tok = self.peek().clone();
        if self.idx < self.tokens.len() - 1 {
            self.idx += 1;
        }
        tok
    }

    /// `None` means every clause was analyzed away.
    fn or_expr(&mut self) -> Result<Option<Query>> {
        let mut positives = Vec::new();
        let mut exclusions = Vec::new();
        let mut push = |clause: Option<Query>| match clause {
            Some(Query::Not(inner)) => exclusions.push(Query::Not(inner)),
            Some(q) => positives.push(q),
            None => {}
        };
        push(self.and_expr()?);
        loop {
            let next = self.peek().clone();
            match next.token {
                Token::Or => {
                    self.advance();
                    if !self.peek().token.starts_clause() {
                        return Err(SearchError::syntax(next.pos, "OR needs a right operand"));
                    }
                    push(self.and_expr()?);
                }
                ref t if t.starts_clause() => push(self.and_expr()?),
                _ => break,
            }
        }

        let positive = match positives.len() {
            0 => None,
            1 => positives.pop(),
            _ => Some(Query::Or(positives)),
        };
        if exclusions.is_empty() {
            return Ok(positive);
        }
        let mut children: Vec<Query> = positive.into_iter().collect();
        children.extend(exclusions);
        Ok(Some(Query::And(children)))
    }

    fn and_expr(&mut self) -> Result<Option<Query>> {
        let mut children: Vec<Query> = self.unary()?.into_iter().collect();
        while self.peek().token == Token::And {
            let op = self.advance();
            if !self.peek().token.starts_clause() {
                return Err(SearchError::syntax(op.pos, "AND needs a right operand"));
            }
            children.extend(self.unary()?);
        }
        Ok(match children.len() {
            0 => None,
            1 => children.pop(),
            _ => Some(Query::And(children)),
        })
    }

    fn unary(&mut self) -> Result<Option<Query>> {
        if !matches!(self.peek().token, Token::Not | Token::Minus) {
            return self.primary();
        }
        let op = self.advance();
        if !self.peek().token.starts_clause() {
            return Err(SearchError::syntax(op.pos, "negation needs an operand"));
        }
        Ok(self.unary()?.map(Query::not))
    }

    fn primary(&mut self) -> Result<Option<Query>> {
        let tok = self.advance();
        match tok.token {
            Token::LeftParen => {
                if self.peek().token == Token::RightParen {
                    return Err(SearchError::syntax(self.peek().pos, "empty group"));
                }
                let inner = self.or_expr()?;
                if self.peek().token != Token::RightParen {
                    return Err(SearchError::syntax(tok.pos, "unbalanced parenthesis"));
                }
                self.advance();
                Ok(inner)
            }
            Token::Word(word) => {
                if self.peek().token != Token::Colon {
                    return Ok(self.parser.analyze(&self.parser.default_field, &word));
                }
                let colon = self.advance();
                if !self.parser.fields.iter().any(|f| *f == word) {
                    return Err(SearchError::syntax(tok.pos, format!("unknown field `{word}`")));
                }
                match self.advance().token {
                    Token::Word(value) | Token::Phrase(value) => Ok(self.parser.analyze(&word, &value)),
                    _ => Err(SearchError::syntax(colon.pos, format!("missing value for field `{word}`"))),
                }
            }
            Token::Phrase(text) => Ok(self.parser.analyze(&self.parser.default_field, &text)),
            Token::RightParen => Err(SearchError::syntax(tok.pos, "unbalanced parenthesis")),
            Token::Colon => Err(SearchError::syntax(tok.pos, "unexpected ':'")),
            Token::And | Token::Or => Err(SearchError::syntax(tok.pos, "operator needs a left operand")),
            Token::Eof => Err(SearchError::syntax(tok.pos, "expected a term")),
            Token::Not | Token::Minus => Err(SearchError::syntax(tok.pos, "unexpected negation")),
        }
    }
}
