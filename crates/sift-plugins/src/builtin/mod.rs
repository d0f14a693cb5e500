//! Plugins shipped with Sift

mod keyword_heuristic;
mod noop;

pub use keyword_heuristic::{KeywordHeuristicClassifier, DEFAULT_FALLBACK_CONFIDENCE};
pub use noop::NoopPlugin;
