//! Sift Rules
//!
//! Deterministic matching for saved streams.
//!
//! A stream combines any of:
//! - A boolean search query (`AND`/`OR`/`NOT`, phrases, `prefix*`, `fuzzy~N`)
//! - Include/exclude keywords and regular expressions
//! - Source URL and language filters
//!
//! Every positive outcome carries evidence: the field, character offsets, and a
//! snippet for each hit, so callers can highlight exactly why an article matched.

pub mod document;
pub mod fuzzy;
pub mod matcher;
pub mod query;
pub mod stream;

pub use document::{Document, FieldText};
pub use fuzzy::{levenshtein_with_limit, within_distance};
pub use matcher::{evaluate_rules, match_article, LanguageEvidence, RuleEvidence, RuleMatch, SourceEvidence};
pub use query::{parse_query, requires_advanced_search, Expr, QueryOutcome, SearchQuery, SyntaxError};
pub use stream::{compile_active_streams, ClassifierMode, CompiledStream, StreamDefinition};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::document::Document;
    pub use crate::matcher::{evaluate_rules, RuleMatch};
    pub use crate::query::{parse_query, SearchQuery};
    pub use crate::stream::{ClassifierMode, CompiledStream, StreamDefinition};
}
