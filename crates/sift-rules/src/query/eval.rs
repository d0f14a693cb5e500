//! Query evaluation with hit evidence

use super::ast::Expr;
use crate::document::{Document, FieldText};
use crate::fuzzy::within_distance;
use sift_core::{EvidenceHit, Field};
use std::collections::HashSet;

/// A compiled, reusable search query
#[derive(Debug, Clone)]
pub struct SearchQuery {
    source: String,
    expression: Expr,
}

/// Result of evaluating a query against a document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutcome {
    pub matched: bool,
    /// Deduplicated hits from the branches that matched
    pub hits: Vec<EvidenceHit>,
    /// Terms that matched only the source URL, which carries no offsets
    pub source_terms: Vec<String>,
}

/// Evidence gathered while walking the expression
enum Collected {
    Hit(EvidenceHit),
    Source(String),
}

impl SearchQuery {
    pub(crate) fn new(source: impl Into<String>, expression: Expr) -> Self {
        Self {
            source: source.into(),
            expression,
        }
    }

    /// The query text as written
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expression(&self) -> &Expr {
        &self.expression
    }

    /// Match without collecting evidence
    pub fn matches(&self, document: &Document) -> bool {
        let mut scratch = Vec::new();
        eval_node(&self.expression, document, None, false, &mut scratch)
    }

    /// Convenience wrapper building a one-off document
    pub fn matches_text(&self, title: &str, content_text: &str) -> bool {
        self.matches(&Document::new(title, content_text))
    }

    /// Match and collect hit evidence
    pub fn evaluate(&self, document: &Document) -> QueryOutcome {
        let mut collected = Vec::new();
        let matched = eval_node(&self.expression, document, None, true, &mut collected);
        if !matched {
            return QueryOutcome::default();
        }

        let mut hits = Vec::new();
        let mut source_terms = Vec::new();
        let mut seen = HashSet::new();
        for item in collected {
            match item {
                Collected::Hit(hit) => {
                    if seen.insert((hit.field, hit.start, hit.end, hit.term.clone())) {
                        hits.push(hit);
                    }
                }
                Collected::Source(term) => {
                    if !source_terms.contains(&term) {
                        source_terms.push(term);
                    }
                }
            }
        }

        QueryOutcome {
            matched,
            hits,
            source_terms,
        }
    }
}

/// Evaluate `node`; a node that does not match leaves `hits` untouched
fn eval_node(
    node: &Expr,
    document: &Document,
    context: Option<&'static str>,
    collect: bool,
    hits: &mut Vec<Collected>,
) -> bool {
    match node {
        Expr::Word(value) | Expr::Phrase(value) => {
            eval_term(node, document, context, collect, hits, |field| {
                field.normalized().find(value)
            })
        }
        Expr::Prefix(prefix) => eval_term(node, document, context, collect, hits, |field| {
            field
                .tokens()
                .iter()
                .find(|token| token.text.starts_with(prefix.as_str()))
                .map(|token| (token.start, token.end))
        }),
        Expr::Fuzzy { value, distance } => {
            eval_term(node, document, context, collect, hits, |field| {
                field
                    .tokens()
                    .iter()
                    .find(|token| within_distance(value, &token.text, usize::from(*distance)))
                    .map(|token| (token.start, token.end))
            })
        }
        Expr::Not(child) => {
            let mut scratch = Vec::new();
            !eval_node(child, document, Some("not"), false, &mut scratch)
        }
        Expr::And(left, right) => {
            let mark = hits.len();
            let matched = eval_node(left, document, Some("and"), collect, hits)
                && eval_node(right, document, Some("and"), collect, hits);
            if !matched {
                hits.truncate(mark);
            }
            matched
        }
        Expr::Or(left, right) => {
            if !collect {
                return eval_node(left, document, Some("or"), false, hits)
                    || eval_node(right, document, Some("or"), false, hits);
            }
            // Both sides run so evidence covers every branch that matched
            let left_matched = eval_node(left, document, Some("or"), true, hits);
            let right_matched = eval_node(right, document, Some("or"), true, hits);
            left_matched || right_matched
        }
    }
}

/// Locate a literal term in each field, title first, falling back to the source URL
fn eval_term<F>(
    node: &Expr,
    document: &Document,
    context: Option<&'static str>,
    collect: bool,
    hits: &mut Vec<Collected>,
    locate: F,
) -> bool
where
    F: Fn(&FieldText) -> Option<(usize, usize)>,
{
    let mut matched = false;
    for field in Field::ALL {
        let text = document.field(field);
        if let Some((start, end)) = locate(text) {
            if !collect {
                return true;
            }
            matched = true;
            hits.push(Collected::Hit(text.hit(field, start, end, node.to_string(), context)));
        }
    }
    if matched {
        return true;
    }

    match document.source() {
        Some(source) if locate(source).is_some() => {
            if collect {
                hits.push(Collected::Source(node.to_string()));
            }
            true
        }
        _ => false,
    }
}
