//! Decision combinator
//!
//! Joins the rule outcome and the classifier outcome of one stream for one
//! article according to the stream's classifier mode, and records every
//! classifier attempt for audit.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sift_core::types::{META_LANGUAGE, META_SOURCE_URL};
use sift_core::{ArticleContext, Field, MatchDecision};
use sift_plugins::{ClassificationDecision, DispatchOutcome, Finding, PluginManager, StreamClassifierContext};
use sift_rules::{evaluate_rules, ClassifierMode, CompiledStream, Document, RuleMatch};
use tracing::debug;

/// Streams matched, by classifier mode and deciding matcher
pub const STREAM_MATCHES_TOTAL: &str = "sift_stream_matches_total";

/// Whether a classifier attempt produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Ok,
    NoDecision,
}

/// Audit record of one classifier attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierRunDecision {
    pub stream_id: String,
    pub article_id: String,
    pub classifier_mode: ClassifierMode,
    pub plugin_id: String,
    pub provider: Option<String>,
    pub model_name: Option<String>,
    pub model_version: Option<String>,
    /// Match after the stream's confidence threshold is applied
    pub matched: bool,
    pub confidence: Option<f64>,
    pub threshold: f64,
    pub reason: Option<String>,
    pub run_status: RunStatus,
    pub error_message: Option<String>,
    pub duration_ms: u64,
}

impl ClassifierRunDecision {
    /// Build the audit record from a dispatch outcome
    pub fn from_outcome(
        stream: &CompiledStream,
        article_id: &str,
        plugin_id: &str,
        outcome: &DispatchOutcome<ClassificationDecision>,
    ) -> Self {
        let threshold = stream.classifier_min_confidence();
        let decision = outcome.value.as_ref();

        Self {
            stream_id: stream.id().to_string(),
            article_id: article_id.to_string(),
            classifier_mode: stream.classifier_mode(),
            plugin_id: plugin_id.to_string(),
            provider: decision.and_then(|d| d.provider.clone()),
            model_name: decision.and_then(|d| d.model_name.clone()),
            model_version: decision.and_then(|d| d.model_version.clone()),
            matched: decision.is_some_and(|d| accepts(d, threshold)),
            confidence: decision.map(|d| d.confidence),
            threshold,
            reason: decision.map(|d| d.reason.clone()),
            run_status: if decision.is_some() {
                RunStatus::Ok
            } else {
                RunStatus::NoDecision
            },
            error_message: outcome.status.error_message(),
            duration_ms: outcome.duration.as_millis() as u64,
        }
    }
}

/// Result of evaluating one stream against one article
#[derive(Debug, Clone, Default)]
pub struct StreamEvaluation {
    pub decision: Option<MatchDecision>,
    /// Present whenever the stream's mode called its classifier
    pub classifier_run: Option<ClassifierRunDecision>,
}

impl StreamEvaluation {
    pub fn matched(&self) -> bool {
        self.decision.is_some()
    }
}

/// Classifier match that passed the stream's threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierEvidence {
    pub matcher_type: String,
    pub plugin_id: String,
    pub provider: Option<String>,
    pub model_name: Option<String>,
    pub model_version: Option<String>,
    pub confidence: f64,
    pub threshold: f64,
    pub reason: String,
    pub findings: Vec<Finding>,
}

impl ClassifierEvidence {
    pub fn new(
        plugin_id: &str,
        decision: &ClassificationDecision,
        threshold: f64,
        article: &ArticleContext,
    ) -> Self {
        Self {
            matcher_type: "classifier".to_string(),
            plugin_id: plugin_id.to_string(),
            provider: decision.provider.clone(),
            model_name: decision.model_name.clone(),
            model_version: decision.model_version.clone(),
            confidence: decision.confidence,
            threshold,
            reason: decision.reason.clone(),
            findings: normalize_findings(&decision.findings, article),
        }
    }

    fn summary(&self) -> String {
        let mut reason = format!(
            "classifier '{}' matched with confidence {:.2}",
            self.plugin_id, self.confidence
        );
        if !self.reason.trim().is_empty() {
            reason.push_str(": ");
            reason.push_str(self.reason.trim());
        }
        reason
    }
}

/// A classifier decision counts only when matched and confident enough
pub fn accepts(decision: &ClassificationDecision, threshold: f64) -> bool {
    decision.matched && decision.confidence >= threshold
}

/// The view of a stream handed to its classifier plugin
pub fn classifier_context(stream: &CompiledStream, article: &ArticleContext) -> StreamClassifierContext {
    let metadata = [META_SOURCE_URL, META_LANGUAGE]
        .into_iter()
        .filter_map(|key| {
            article
                .metadata
                .get(key)
                .map(|value| (key.to_string(), value.clone()))
        })
        .collect();

    StreamClassifierContext {
        stream_id: stream.id().to_string(),
        stream_name: stream.name().to_string(),
        include_keywords: stream.include_keywords().to_vec(),
        exclude_keywords: stream.exclude_keywords().to_vec(),
        source_contains: stream.source_contains().map(str::to_string),
        language_equals: stream.language_equals().map(str::to_string),
        classifier_config: stream.classifier_config().clone(),
        metadata,
    }
}

/// Evaluate one stream for one article
///
/// Rules run unless the stream is classifier-only; the classifier runs only
/// when the mode calls for it. Plugin failures surface as a run with no
/// decision, never as an error.
pub async fn evaluate_stream(
    plugins: &PluginManager,
    stream: &CompiledStream,
    article: &ArticleContext,
    document: &Document,
) -> StreamEvaluation {
    let mode = stream.classifier_mode();

    let rules = match mode {
        ClassifierMode::ClassifierOnly => None,
        _ => evaluate_rules(stream, document, article.source_url(), article.language()),
    };

    let mut classifier = None;
    let mut classifier_run = None;
    if mode.requires_classifier() {
        if let Some(plugin_id) = stream.classifier_plugin() {
            let context = classifier_context(stream, article);
            let outcome = plugins
                .classify_stream_detailed(plugin_id, article, &context)
                .await;
            let run = ClassifierRunDecision::from_outcome(stream, &article.article_id, plugin_id, &outcome);

            if let Some(decision) = outcome.value.as_ref().filter(|_| run.matched) {
                classifier = Some(ClassifierEvidence::new(plugin_id, decision, run.threshold, article));
            }
            classifier_run = Some(run);
        }
    }

    let decision = combine(mode, stream.id(), &article.article_id, rules, classifier);
    if let Some(decision) = &decision {
        let matcher = decision
            .evidence
            .as_ref()
            .and_then(|evidence| evidence.get("matcher_type"))
            .and_then(Value::as_str)
            .unwrap_or("rules")
            .to_string();
        ::metrics::counter!(
            STREAM_MATCHES_TOTAL,
            "classifier_mode" => mode.as_str(),
            "matcher" => matcher
        )
        .increment(1);
    }

    debug!(
        stream_id = %stream.id(),
        article_id = %article.article_id,
        classifier_mode = %mode,
        matched = decision.is_some(),
        "Stream evaluated"
    );

    StreamEvaluation {
        decision,
        classifier_run,
    }
}

/// Join the rule and classifier outcomes for a mode
///
/// `classifier` must already have passed the stream's threshold.
pub fn combine(
    mode: ClassifierMode,
    stream_id: &str,
    article_id: &str,
    rules: Option<RuleMatch>,
    classifier: Option<ClassifierEvidence>,
) -> Option<MatchDecision> {
    let (reason, evidence) = match (mode, rules, classifier) {
        (ClassifierMode::RulesOnly, Some(rules), _) => (rules.reason.clone(), rules.evidence_json()),
        (ClassifierMode::RulesOnly, None, _) => return None,
        (ClassifierMode::ClassifierOnly, _, Some(classifier)) => {
            (classifier.summary(), classifier_json(&classifier))
        }
        (ClassifierMode::ClassifierOnly, _, None) => return None,
        (ClassifierMode::Hybrid, Some(rules), Some(classifier)) => (
            rules.reason.clone(),
            json!({
                "matcher_type": "hybrid",
                "rules": rules.evidence_json(),
                "classifier": classifier_json(&classifier),
            }),
        ),
        (ClassifierMode::Hybrid, Some(rules), None) => (rules.reason.clone(), rules.evidence_json()),
        (ClassifierMode::Hybrid, None, Some(classifier)) => {
            (classifier.summary(), classifier_json(&classifier))
        }
        (ClassifierMode::Hybrid, None, None) => return None,
    };

    Some(MatchDecision {
        stream_id: stream_id.to_string(),
        article_id: article_id.to_string(),
        reason,
        evidence: Some(evidence),
    })
}

fn classifier_json(classifier: &ClassifierEvidence) -> Value {
    serde_json::to_value(classifier).unwrap_or(Value::Null)
}

/// Clean plugin findings before they are persisted as evidence
///
/// Fields other than title and content are dropped, offsets are kept only
/// when they lie inside the named field, scores are clamped to [0, 1], and
/// findings without any label, text, or value are discarded.
pub fn normalize_findings(findings: &[Finding], article: &ArticleContext) -> Vec<Finding> {
    findings
        .iter()
        .filter_map(|finding| {
            let label = non_blank(finding.label.as_deref());
            let text = non_blank(finding.text.as_deref());
            let value = non_blank(finding.value.as_deref());
            if label.is_none() && text.is_none() && value.is_none() {
                return None;
            }

            let field = finding.field.as_deref().and_then(Field::parse);
            let (start, end) = match (field, finding.start, finding.end) {
                (Some(field), Some(start), Some(end))
                    if start < end && end <= article.field(field).chars().count() =>
                {
                    (Some(start), Some(end))
                }
                _ => (None, None),
            };
            let score = finding
                .score
                .filter(|score| score.is_finite())
                .map(|score| score.clamp(0.0, 1.0));

            Some(Finding {
                label,
                text,
                value,
                field: field.map(|field| field.as_str().to_string()),
                start,
                end,
                score,
            })
        })
        .collect()
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
