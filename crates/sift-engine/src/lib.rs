//! Sift Engine
//!
//! Decides which streams an article belongs to:
//! - Rule evaluation and classifier dispatch joined per stream mode
//! - An engine context holding configuration and loaded plugins
//! - Corpus backfill with bounded concurrency and atomic replacement
//! - File readers and configuration for the `sift-engine` binary

pub mod backfill;
pub mod combinator;
pub mod config;
pub mod context;
pub mod input;

pub use backfill::{backfill_stream, BackfillReport, InMemoryMatchStore, MatchStore};
pub use combinator::{
    classifier_context, combine, evaluate_stream, normalize_findings, ClassifierEvidence,
    ClassifierRunDecision, RunStatus, StreamEvaluation,
};
pub use config::{ConfigOverrides, EngineConfig, LogFormat};
pub use context::{ArticleOutcome, EngineContext};
pub use input::{load_articles, load_stream_definitions};

/// Register descriptions for every series the engine emits
pub fn describe_metrics() {
    sift_telemetry::describe_metrics();
    ::metrics::describe_counter!(
        combinator::STREAM_MATCHES_TOTAL,
        "Stream matches by classifier mode and deciding matcher"
    );
    ::metrics::describe_counter!(
        backfill::BACKFILL_ARTICLES_TOTAL,
        "Articles re-evaluated by stream backfills"
    );
}

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::backfill::{backfill_stream, InMemoryMatchStore, MatchStore};
    pub use crate::config::EngineConfig;
    pub use crate::context::EngineContext;
}
