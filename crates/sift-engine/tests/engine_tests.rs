//! End-to-end stream evaluation through the engine context

use async_trait::async_trait;
use sift_core::{ArticleContext, Result};
use sift_engine::{
    backfill_stream, EngineConfig, EngineContext, InMemoryMatchStore, RunStatus,
};
use sift_plugins::{
    BackendRegistry, Capability, ClassificationDecision, DispatchTimeouts, Finding, IngestHook,
    Plugin, PluginEntry, PluginManager, PluginRegistryConfig, StreamClassifier,
    StreamClassifierContext,
};
use sift_rules::{ClassifierMode, CompiledStream, StreamDefinition};
use sift_telemetry::PluginTelemetryCollector;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

/// Classifier returning a fixed decision, optionally after a delay
struct FixedClassifier {
    decision: ClassificationDecision,
    delay: Option<Duration>,
}

#[async_trait]
impl StreamClassifier for FixedClassifier {
    async fn classify_stream(
        &self,
        _article: &ArticleContext,
        _stream: &StreamClassifierContext,
    ) -> Result<Option<ClassificationDecision>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(Some(self.decision.clone()))
    }
}

impl Plugin for FixedClassifier {
    fn name(&self) -> &str {
        "fixed_classifier"
    }

    fn as_stream_classifier(self: Arc<Self>) -> Option<Arc<dyn StreamClassifier>> {
        Some(self)
    }
}

/// Ingest hook tagging every title
struct TagHook;

#[async_trait]
impl IngestHook for TagHook {
    async fn on_article_ingested(&self, mut article: ArticleContext) -> Result<ArticleContext> {
        article.title.push_str(" [AI]");
        Ok(article)
    }
}

impl Plugin for TagHook {
    fn name(&self) -> &str {
        "tag_hook"
    }

    fn as_ingest_hook(self: Arc<Self>) -> Option<Arc<dyn IngestHook>> {
        Some(self)
    }
}

fn shared<P: Plugin + 'static>(plugin: P) -> Arc<dyn Plugin> {
    Arc::new(plugin)
}

fn classifier(matched: bool, confidence: f64) -> FixedClassifier {
    FixedClassifier {
        decision: ClassificationDecision::new(matched, confidence, "fixed")
            .with_model("test", "fixed-model", "2")
            .with_finding(Finding {
                label: Some("topic".to_string()),
                field: Some("title".to_string()),
                start: Some(0),
                end: Some(500),
                score: Some(2.0),
                ..Finding::default()
            }),
        delay: None,
    }
}

fn engine(plugins: Vec<(&str, Capability, Arc<dyn Plugin>)>) -> EngineContext {
    let mut backends = BackendRegistry::new();
    let mut entries = Vec::new();
    for (id, capability, plugin) in plugins {
        let factory = format!("test.{}", id);
        backends.register(factory.clone(), move |_| Ok(Arc::clone(&plugin)));
        entries.push(PluginEntry::new(id, factory).with_capability(capability));
    }
    let mut registry = PluginRegistryConfig {
        version: 1,
        plugins: entries,
    };
    registry.validate().unwrap();

    let manager = PluginManager::load_from_registry(
        &registry,
        &backends,
        DispatchTimeouts::default(),
        PluginTelemetryCollector::new(),
    );
    EngineContext::new(EngineConfig::default(), manager)
}

fn classified(mode: ClassifierMode, plugin: &str) -> StreamDefinition {
    StreamDefinition::new("s1", "AI").with_classifier(mode, plugin)
}

fn compile(definition: StreamDefinition) -> CompiledStream {
    definition.compile().unwrap()
}

fn article() -> ArticleContext {
    ArticleContext::new("a1", "AI chips ship", "Vendors announced new accelerators.")
        .with_source_url("https://example.com/feed")
        .with_language("en")
}

#[tokio::test]
async fn test_hybrid_rules_match_when_classifier_declines() {
    let context = engine(vec![("kw", Capability::StreamClassifier, shared(classifier(false, 0.1)))]);
    let stream = compile(classified(ClassifierMode::Hybrid, "kw").with_include_keywords(["ai"]));

    let evaluation = context.evaluate_stream(&stream, &article()).await;
    let decision = evaluation.decision.unwrap();
    assert_eq!(decision.reason, "keyword 'ai' in title");
    assert_eq!(decision.evidence.unwrap()["matcher_type"], "rules");

    let run = evaluation.classifier_run.unwrap();
    assert!(!run.matched);
    assert_eq!(run.run_status, RunStatus::Ok);
    assert_eq!(run.confidence, Some(0.1));
    assert_eq!(run.threshold, 0.7);
    assert_eq!(run.model_name.as_deref(), Some("fixed-model"));
    assert_eq!(run.error_message, None);
}

#[tokio::test]
async fn test_hybrid_both_matched_prefers_rules_reason() {
    let context = engine(vec![("kw", Capability::StreamClassifier, shared(classifier(true, 0.95)))]);
    let stream = compile(classified(ClassifierMode::Hybrid, "kw").with_include_keywords(["ai"]));

    let decision = context.evaluate_stream(&stream, &article()).await.decision.unwrap();
    assert_eq!(decision.reason, "keyword 'ai' in title");

    let evidence = decision.evidence.unwrap();
    assert_eq!(evidence["matcher_type"], "hybrid");
    assert_eq!(evidence["rules"]["keyword_hits"][0]["term"], "ai");
    assert_eq!(evidence["classifier"]["confidence"], 0.95);

    // Offsets past the title are dropped and the score is clamped
    let finding = &evidence["classifier"]["findings"][0];
    assert_eq!(finding["field"], "title");
    assert!(finding["start"].is_null());
    assert_eq!(finding["score"], 1.0);
}

#[tokio::test]
async fn test_hybrid_classifier_alone() {
    let context = engine(vec![("kw", Capability::StreamClassifier, shared(classifier(true, 0.8)))]);
    let stream = compile(classified(ClassifierMode::Hybrid, "kw").with_include_keywords(["quantum"]));

    let decision = context.evaluate_stream(&stream, &article()).await.decision.unwrap();
    assert_eq!(decision.reason, "classifier 'kw' matched with confidence 0.80: fixed");
    assert_eq!(decision.evidence.unwrap()["matcher_type"], "classifier");
}

#[tokio::test]
async fn test_classifier_only_applies_threshold() {
    let context = engine(vec![
        ("weak", Capability::StreamClassifier, shared(classifier(true, 0.6))),
        ("strong", Capability::StreamClassifier, shared(classifier(true, 0.7))),
    ]);

    // Rules are ignored in classifier-only mode
    let weak = compile(classified(ClassifierMode::ClassifierOnly, "weak").with_include_keywords(["ai"]));
    let evaluation = context.evaluate_stream(&weak, &article()).await;
    assert!(evaluation.decision.is_none());
    let run = evaluation.classifier_run.unwrap();
    assert!(!run.matched);
    assert_eq!(run.run_status, RunStatus::Ok);

    let strong = compile(classified(ClassifierMode::ClassifierOnly, "strong"));
    let evaluation = context.evaluate_stream(&strong, &article()).await;
    assert!(evaluation.matched());
    assert!(evaluation.classifier_run.unwrap().matched);

    let lenient = compile(classified(ClassifierMode::ClassifierOnly, "weak").with_min_confidence(0.5));
    assert!(context.evaluate_stream(&lenient, &article()).await.matched());
}

#[tokio::test]
async fn test_rules_only_never_calls_classifier() {
    let context = engine(vec![("kw", Capability::StreamClassifier, shared(classifier(true, 1.0)))]);
    let mut definition = StreamDefinition::new("s1", "AI").with_include_keywords(["ai"]);
    definition.classifier_plugin = Some("kw".to_string());
    let stream = compile(definition);

    let evaluation = context.evaluate_stream(&stream, &article()).await;
    assert!(evaluation.matched());
    assert!(evaluation.classifier_run.is_none());
    let counters = context.plugins().status("kw").unwrap().counters[&Capability::StreamClassifier];
    assert_eq!(counters.success_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_classifier_does_not_block_other_streams() {
    let slow = FixedClassifier {
        delay: Some(Duration::from_secs(60)),
        ..classifier(true, 1.0)
    };
    let context = engine(vec![("slow", Capability::StreamClassifier, shared(slow))]);
    let streams = vec![
        compile(classified(ClassifierMode::ClassifierOnly, "slow")),
        compile(StreamDefinition::new("s2", "Chips").with_include_keywords(["chips"])),
    ];

    let outcome = context.evaluate_article(&article(), &streams).await;
    assert_eq!(outcome.decisions.len(), 1);
    assert_eq!(outcome.decisions[0].stream_id, "s2");

    let run = &outcome.classifier_runs[0];
    assert_eq!(run.run_status, RunStatus::NoDecision);
    assert_eq!(run.error_message.as_deref(), Some("timed out after 5000ms"));
    assert_eq!(run.duration_ms, 5_000);
    assert_eq!(run.confidence, None);

    let counters = context.plugins().status("slow").unwrap().counters[&Capability::StreamClassifier];
    assert_eq!(counters.timeout_count, 1);
}

#[tokio::test]
async fn test_missing_plugin_is_audited() {
    let context = engine(Vec::new());
    let stream = compile(classified(ClassifierMode::Hybrid, "ghost").with_include_keywords(["ai"]));

    let evaluation = context.evaluate_stream(&stream, &article()).await;
    assert!(evaluation.matched());
    let run = evaluation.classifier_run.unwrap();
    assert_eq!(run.run_status, RunStatus::NoDecision);
    assert!(run.error_message.unwrap().contains("not registered"));

    let text = context.telemetry().render_prometheus();
    assert!(text.contains("sift_plugin_dispatch_failures_total{capability=\"stream_classifier\"} 1"));
}

#[tokio::test]
async fn test_process_article_runs_ingest_hooks_first() {
    let context = engine(vec![("tag", Capability::IngestHook, shared(TagHook))]);
    let streams = vec![compile(StreamDefinition::new("s1", "AI").with_include_keywords(["ai"]))];
    let plain = ArticleContext::new("a9", "Weekly update", "");

    let outcome = context.evaluate_article(&plain, &streams).await;
    assert!(outcome.decisions.is_empty());

    let outcome = context.process_article(plain, &streams).await;
    assert_eq!(outcome.article_id, "a9");
    assert_eq!(outcome.decisions.len(), 1);
    assert!(outcome.classifier_runs.is_empty());
}

#[tokio::test]
async fn test_builtin_classifier_from_config_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = std::fs::File::create(dir.path().join("plugins.yaml")).unwrap();
    writeln!(
        registry,
        "version: 1\nplugins:\n  - id: heuristic\n    backend:\n      factory: builtin.keyword_heuristic_classifier\n    capabilities: [stream_classifier]\n"
    )
    .unwrap();
    let config_path = dir.path().join("sift.yaml");
    std::fs::write(&config_path, "plugin_registry_path: plugins.yaml\nbackfill:\n  concurrency: 2\n").unwrap();

    let config = EngineConfig::from_file(&config_path).unwrap();
    let context = EngineContext::from_config(config, &BackendRegistry::with_builtins()).unwrap();
    assert_eq!(context.plugins().names(), vec!["heuristic"]);

    let stream = compile(
        classified(ClassifierMode::ClassifierOnly, "heuristic")
            .with_include_keywords(["ai", "robots"])
            .with_min_confidence(0.5),
    );
    let articles = vec![
        article(),
        ArticleContext::new("a2", "Robots and AI", ""),
        ArticleContext::new("a3", "Gardening", ""),
    ];

    let store = InMemoryMatchStore::new();
    let report = backfill_stream(&context, &stream, articles, &store).await.unwrap();
    assert_eq!(report.articles_scanned, 3);
    assert_eq!(report.matched, 2);
    assert_eq!(report.classifier_runs, 3);

    let matches = store.matches_for("s1");
    let evidence = matches[0].evidence.as_ref().unwrap();
    assert_eq!(evidence["model_name"], "keyword_heuristic");
    assert_eq!(evidence["findings"][0]["field"], "title");
    assert_eq!(evidence["findings"][0]["start"], 0);
    assert_eq!(evidence["findings"][0]["end"], 2);

    let runs = store.classifier_runs();
    assert_eq!(runs.len(), 3);
    assert!(runs.iter().all(|run| run.run_status == RunStatus::Ok));
    assert_eq!(runs.iter().filter(|run| run.matched).count(), 2);
}

#[test]
fn test_missing_registry_file_is_fatal() {
    let config = EngineConfig {
        plugin_registry_path: Some("/nonexistent/plugins.yaml".into()),
        ..EngineConfig::default()
    };
    assert!(EngineContext::from_config(config, &BackendRegistry::with_builtins()).is_err());
}
