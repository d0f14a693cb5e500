//! Re-evaluate one stream against a whole corpus
//!
//! Every article is evaluated first, with bounded concurrency; the complete
//! match set then replaces the stream's previous matches in one call.

use crate::combinator::ClassifierRunDecision;
use crate::context::EngineContext;
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::RwLock;
use serde::Serialize;
use sift_core::{ArticleContext, MatchDecision, Result};
use sift_rules::CompiledStream;
use std::collections::{BTreeMap, HashMap};
use tokio::time::Instant;
use tracing::info;

/// Articles scanned by backfill runs
pub const BACKFILL_ARTICLES_TOTAL: &str = "sift_backfill_articles_total";

/// Persistence for stream matches
#[async_trait]
pub trait MatchStore: Send + Sync {
    /// Swap the stream's match set for `matches`
    ///
    /// Readers must see either the old set or the new one, never a mix.
    async fn replace_stream_matches(&self, stream_id: &str, matches: Vec<MatchDecision>) -> Result<()>;

    /// Append classifier audit records
    async fn record_classifier_runs(&self, runs: Vec<ClassifierRunDecision>) -> Result<()>;
}

/// Match store held in memory
#[derive(Debug, Default)]
pub struct InMemoryMatchStore {
    matches: RwLock<HashMap<String, BTreeMap<String, MatchDecision>>>,
    runs: RwLock<Vec<ClassifierRunDecision>>,
}

impl InMemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current matches of a stream, ordered by article id
    pub fn matches_for(&self, stream_id: &str) -> Vec<MatchDecision> {
        self.matches
            .read()
            .get(stream_id)
            .map(|matches| matches.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Record a single decision, replacing any earlier one for the same article
    pub fn upsert(&self, decision: MatchDecision) {
        self.matches
            .write()
            .entry(decision.stream_id.clone())
            .or_default()
            .insert(decision.article_id.clone(), decision);
    }

    pub fn classifier_runs(&self) -> Vec<ClassifierRunDecision> {
        self.runs.read().clone()
    }
}

#[async_trait]
impl MatchStore for InMemoryMatchStore {
    async fn replace_stream_matches(&self, stream_id: &str, matches: Vec<MatchDecision>) -> Result<()> {
        let replacement: BTreeMap<String, MatchDecision> = matches
            .into_iter()
            .map(|decision| (decision.article_id.clone(), decision))
            .collect();
        self.matches.write().insert(stream_id.to_string(), replacement);
        Ok(())
    }

    async fn record_classifier_runs(&self, runs: Vec<ClassifierRunDecision>) -> Result<()> {
        self.runs.write().extend(runs);
        Ok(())
    }
}

/// Summary of one backfill run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub stream_id: String,
    pub articles_scanned: usize,
    pub matched: usize,
    pub classifier_runs: usize,
    pub duration_ms: u64,
}

/// Re-evaluate `stream` against every article and replace its matches
///
/// Nothing is written until the whole corpus has been evaluated, so a
/// failure part way leaves the previous match set intact.
pub async fn backfill_stream<I>(
    context: &EngineContext,
    stream: &CompiledStream,
    articles: I,
    store: &dyn MatchStore,
) -> Result<BackfillReport>
where
    I: IntoIterator<Item = ArticleContext>,
{
    let started = Instant::now();
    let concurrency = context.config().backfill.concurrency.max(1);

    let evaluations: Vec<_> = futures::stream::iter(articles)
        .map(|article| async move { context.evaluate_stream(stream, &article).await })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    let articles_scanned = evaluations.len();
    let mut matches = Vec::new();
    let mut runs = Vec::new();
    for evaluation in evaluations {
        matches.extend(evaluation.decision);
        runs.extend(evaluation.classifier_run);
    }

    let report = BackfillReport {
        stream_id: stream.id().to_string(),
        articles_scanned,
        matched: matches.len(),
        classifier_runs: runs.len(),
        duration_ms: started.elapsed().as_millis() as u64,
    };

    store.replace_stream_matches(stream.id(), matches).await?;
    if !runs.is_empty() {
        store.record_classifier_runs(runs).await?;
    }

    ::metrics::counter!(BACKFILL_ARTICLES_TOTAL, "stream_id" => stream.id().to_string())
        .increment(articles_scanned as u64);
    info!(
        stream_id = %stream.id(),
        articles_scanned = report.articles_scanned,
        matched = report.matched,
        duration_ms = report.duration_ms,
        "Backfill complete"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use sift_plugins::{DispatchTimeouts, PluginManager};
    use sift_rules::StreamDefinition;
    use sift_telemetry::PluginTelemetryCollector;

    fn context() -> EngineContext {
        let plugins = PluginManager::empty(DispatchTimeouts::default(), PluginTelemetryCollector::new());
        EngineContext::new(EngineConfig::default(), plugins)
    }

    fn decision(stream_id: &str, article_id: &str) -> MatchDecision {
        MatchDecision {
            stream_id: stream_id.to_string(),
            article_id: article_id.to_string(),
            reason: "seed".to_string(),
            evidence: None,
        }
    }

    #[tokio::test]
    async fn test_backfill_replaces_previous_matches() {
        let store = InMemoryMatchStore::new();
        store.upsert(decision("s1", "stale"));
        store.upsert(decision("s2", "other"));

        let stream = StreamDefinition::new("s1", "AI")
            .with_include_keywords(["ai"])
            .compile()
            .unwrap();
        let articles = vec![
            ArticleContext::new("a1", "AI funding", ""),
            ArticleContext::new("a2", "Gardening tips", ""),
            ArticleContext::new("a3", "", "new ai chips"),
        ];

        let report = backfill_stream(&context(), &stream, articles, &store).await.unwrap();
        assert_eq!(report.articles_scanned, 3);
        assert_eq!(report.matched, 2);
        assert_eq!(report.classifier_runs, 0);

        let ids: Vec<_> = store.matches_for("s1").into_iter().map(|d| d.article_id).collect();
        assert_eq!(ids, vec!["a1", "a3"]);
        assert_eq!(store.matches_for("s2").len(), 1);
    }

    #[tokio::test]
    async fn test_empty_corpus_clears_stream() {
        let store = InMemoryMatchStore::new();
        store.upsert(decision("s1", "stale"));

        let stream = StreamDefinition::new("s1", "AI")
            .with_include_keywords(["ai"])
            .compile()
            .unwrap();
        let report = backfill_stream(&context(), &stream, Vec::new(), &store).await.unwrap();
        assert_eq!(report.articles_scanned, 0);
        assert!(store.matches_for("s1").is_empty());
    }
}
