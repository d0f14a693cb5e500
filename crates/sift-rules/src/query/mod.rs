//! Boolean search query language
//!
//! ```text
//! (microsoft OR "google cloud") AND NOT sports
//! threat*          suffix wildcard
//! ransom~1         fuzzy, edit distance 1 or 2
//! ```
//!
//! Precedence from tightest to loosest: parentheses, `NOT`, `AND` (also implied
//! between adjacent terms), `OR`. Operators are case-insensitive.

mod ast;
mod eval;
mod lexer;
mod parser;

pub use ast::Expr;
pub use eval::{QueryOutcome, SearchQuery};

/// Malformed search query
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct SyntaxError {
    pub message: String,
    /// Character offset of the offending token
    pub index: Option<usize>,
}

impl SyntaxError {
    pub(crate) fn new(message: impl Into<String>, index: Option<usize>) -> Self {
        Self {
            message: message.into(),
            index,
        }
    }
}

impl From<SyntaxError> for sift_core::Error {
    fn from(err: SyntaxError) -> Self {
        sift_core::Error::syntax(err.message, err.index)
    }
}

/// Compile a query string
pub fn parse_query(input: &str) -> Result<SearchQuery, SyntaxError> {
    let tokens = lexer::tokenize(input)?;
    let expression = parser::Parser::new(tokens).parse()?;
    Ok(SearchQuery::new(input.trim(), expression))
}

/// Whether `value` uses any query syntax beyond plain words
pub fn requires_advanced_search(value: &str) -> bool {
    if value.contains(['"', '(', ')', '~', '*']) {
        return true;
    }
    value
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .any(|word| {
            word.eq_ignore_ascii_case("and")
                || word.eq_ignore_ascii_case("or")
                || word.eq_ignore_ascii_case("not")
        })
}
