//! Engine context: configuration and loaded plugins, built once and shared

use crate::combinator::{evaluate_stream, ClassifierRunDecision, StreamEvaluation};
use crate::config::EngineConfig;
use serde::Serialize;
use sift_core::{ArticleContext, MatchDecision, Result};
use sift_plugins::{load_registry_file, BackendRegistry, PluginManager, PluginStatusSnapshot};
use sift_rules::{CompiledStream, Document};
use sift_telemetry::PluginTelemetryCollector;
use std::sync::Arc;
use tracing::info;

/// Everything an article evaluation needs, passed explicitly
#[derive(Clone)]
pub struct EngineContext {
    config: Arc<EngineConfig>,
    plugins: Arc<PluginManager>,
}

/// Decisions for one article across all streams
#[derive(Debug, Clone, Default, Serialize)]
pub struct ArticleOutcome {
    pub article_id: String,
    pub decisions: Vec<MatchDecision>,
    pub classifier_runs: Vec<ClassifierRunDecision>,
}

impl ArticleOutcome {
    fn push(&mut self, evaluation: StreamEvaluation) {
        self.decisions.extend(evaluation.decision);
        self.classifier_runs.extend(evaluation.classifier_run);
    }
}

impl EngineContext {
    /// Load the plugin registry named by the configuration
    ///
    /// A registry that cannot be read or parsed is fatal; individual plugins
    /// that fail to load are not.
    pub fn from_config(config: EngineConfig, backends: &BackendRegistry) -> Result<Self> {
        let telemetry = PluginTelemetryCollector::new();
        let timeouts = config.dispatch_timeouts();

        let plugins = match &config.plugin_registry_path {
            Some(path) => {
                let registry = load_registry_file(path)?;
                PluginManager::load_from_registry(&registry, backends, timeouts, telemetry)
            }
            None => {
                info!("No plugin registry configured");
                PluginManager::empty(timeouts, telemetry)
            }
        };

        Ok(Self::new(config, plugins))
    }

    pub fn new(config: EngineConfig, plugins: PluginManager) -> Self {
        Self {
            config: Arc::new(config),
            plugins: Arc::new(plugins),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn plugins(&self) -> &PluginManager {
        &self.plugins
    }

    pub fn telemetry(&self) -> &PluginTelemetryCollector {
        self.plugins.telemetry()
    }

    pub fn plugin_statuses(&self) -> Vec<PluginStatusSnapshot> {
        self.plugins.status_snapshots()
    }

    /// Run ingest hooks, then evaluate every stream
    pub async fn process_article(&self, article: ArticleContext, streams: &[CompiledStream]) -> ArticleOutcome {
        let article = self.plugins.run_ingest_hooks(article).await;
        self.evaluate_article(&article, streams).await
    }

    /// Evaluate every stream against an article as it is
    pub async fn evaluate_article(&self, article: &ArticleContext, streams: &[CompiledStream]) -> ArticleOutcome {
        let document = Document::from_article(article);
        let mut outcome = ArticleOutcome {
            article_id: article.article_id.clone(),
            ..ArticleOutcome::default()
        };
        for stream in streams {
            outcome.push(evaluate_stream(&self.plugins, stream, article, &document).await);
        }
        outcome
    }

    /// Evaluate a single stream against an article
    pub async fn evaluate_stream(&self, stream: &CompiledStream, article: &ArticleContext) -> StreamEvaluation {
        let document = Document::from_article(article);
        evaluate_stream(&self.plugins, stream, article, &document).await
    }
}
