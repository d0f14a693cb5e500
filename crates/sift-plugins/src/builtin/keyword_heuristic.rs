use crate::capability::{
    ClassificationDecision, Finding, Plugin, StreamClassifier, StreamClassifierContext,
};
use crate::config::PluginSettings;
use async_trait::async_trait;
use sift_core::{normalize_text, ArticleContext, Error, Field, NormalizedText, Result};
use std::sync::Arc;

/// Confidence reported when a stream has no include keywords
pub const DEFAULT_FALLBACK_CONFIDENCE: f64 = 0.55;

const PROVIDER: &str = "builtin";
const MODEL_NAME: &str = "keyword_heuristic";
const MODEL_VERSION: &str = "v1";

/// Stream classifier scoring the share of include keywords present
///
/// Settings: `fallback_confidence` (0..=1, default 0.55).
#[derive(Debug, Clone)]
pub struct KeywordHeuristicClassifier {
    fallback_confidence: f64,
}

impl Default for KeywordHeuristicClassifier {
    fn default() -> Self {
        Self {
            fallback_confidence: DEFAULT_FALLBACK_CONFIDENCE,
        }
    }
}

impl KeywordHeuristicClassifier {
    pub fn from_settings(settings: &PluginSettings) -> Result<Self> {
        let fallback_confidence = match settings.get("fallback_confidence") {
            None => DEFAULT_FALLBACK_CONFIDENCE,
            Some(value) => value
                .as_f64()
                .filter(|v| (0.0..=1.0).contains(v))
                .ok_or_else(|| {
                    Error::config(format!(
                        "fallback_confidence must be a number between 0 and 1, got {}",
                        value
                    ))
                })?,
        };
        Ok(Self { fallback_confidence })
    }

    fn decision(&self, matched: bool, confidence: f64, reason: impl Into<String>) -> ClassificationDecision {
        ClassificationDecision::new(matched, confidence, reason).with_model(PROVIDER, MODEL_NAME, MODEL_VERSION)
    }
}

#[async_trait]
impl StreamClassifier for KeywordHeuristicClassifier {
    async fn classify_stream(
        &self,
        article: &ArticleContext,
        stream: &StreamClassifierContext,
    ) -> Result<Option<ClassificationDecision>> {
        let fields: Vec<(Field, NormalizedText)> = Field::ALL
            .into_iter()
            .map(|field| (field, NormalizedText::new(article.field(field))))
            .collect();
        let find = |keyword: &str| {
            let keyword = normalize_text(keyword);
            fields
                .iter()
                .find_map(|(field, text)| text.find(&keyword).map(|span| (*field, span)))
        };

        if stream.exclude_keywords.iter().any(|k| find(k.as_str()).is_some()) {
            return Ok(Some(self.decision(false, 0.0, "excluded keyword present")));
        }

        let meta = |key: &str| {
            stream
                .metadata
                .get(key)
                .map(|value| value.to_lowercase())
                .unwrap_or_default()
        };
        if let Some(expected) = &stream.source_contains {
            if !meta("source_url").contains(&expected.to_lowercase()) {
                return Ok(Some(self.decision(false, 0.0, "source mismatch")));
            }
        }
        if let Some(expected) = &stream.language_equals {
            if meta("language").trim() != expected.to_lowercase() {
                return Ok(Some(self.decision(false, 0.0, "language mismatch")));
            }
        }

        if stream.include_keywords.is_empty() {
            return Ok(Some(self.decision(true, self.fallback_confidence, "fallback match")));
        }

        let total = stream.include_keywords.len();
        let mut findings = Vec::new();
        for keyword in &stream.include_keywords {
            if let Some((field, (start, end))) = find(keyword.as_str()) {
                findings.push(Finding {
                    label: Some("keyword".to_string()),
                    text: Some(keyword.clone()),
                    field: Some(field.as_str().to_string()),
                    start: Some(start),
                    end: Some(end),
                    score: Some(1.0),
                    ..Finding::default()
                });
            }
        }

        let confidence = findings.len() as f64 / total as f64;
        let mut decision = self.decision(
            confidence > 0.0,
            confidence,
            format!("{}/{} include keywords matched", findings.len(), total),
        );
        decision.findings = findings;
        Ok(Some(decision))
    }
}

impl Plugin for KeywordHeuristicClassifier {
    fn name(&self) -> &str {
        "keyword_heuristic_classifier"
    }

    fn as_stream_classifier(self: Arc<Self>) -> Option<Arc<dyn StreamClassifier>> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(include: &[&str], exclude: &[&str]) -> StreamClassifierContext {
        StreamClassifierContext {
            stream_id: "s1".to_string(),
            stream_name: "Test".to_string(),
            include_keywords: include.iter().map(|s| s.to_string()).collect(),
            exclude_keywords: exclude.iter().map(|s| s.to_string()).collect(),
            metadata: [
                ("source_url".to_string(), "https://Example.com/feed".to_string()),
                ("language".to_string(), "en".to_string()),
            ]
            .into_iter()
            .collect(),
            ..StreamClassifierContext::default()
        }
    }

    async fn classify(ctx: &StreamClassifierContext, title: &str, content: &str) -> ClassificationDecision {
        let article = ArticleContext::new("a1", title, content);
        KeywordHeuristicClassifier::default()
            .classify_stream(&article, ctx)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_ratio_with_findings() {
        let decision = classify(&context(&["ai", "robots", "quantum"], &[]), "AI update", "New robots").await;
        assert!(decision.matched);
        assert!((decision.confidence - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(decision.reason, "2/3 include keywords matched");
        assert_eq!(decision.model_name.as_deref(), Some("keyword_heuristic"));
        assert_eq!(decision.provider.as_deref(), Some("builtin"));

        let finding = &decision.findings[1];
        assert_eq!(finding.field.as_deref(), Some("content_text"));
        assert_eq!((finding.start, finding.end), (Some(4), Some(10)));
    }

    #[tokio::test]
    async fn test_no_keywords_matched() {
        let decision = classify(&context(&["quantum"], &[]), "AI update", "").await;
        assert!(!decision.matched);
        assert_eq!(decision.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_exclusion_and_filters() {
        let decision = classify(&context(&["ai"], &["sports"]), "AI in sports", "").await;
        assert!(!decision.matched);
        assert_eq!(decision.reason, "excluded keyword present");

        let mut ctx = context(&["ai"], &[]);
        ctx.source_contains = Some("example.com".to_string());
        ctx.language_equals = Some("DE".to_string());
        let decision = classify(&ctx, "AI update", "").await;
        assert_eq!(decision.reason, "language mismatch");

        ctx.source_contains = Some("other.org".to_string());
        let decision = classify(&ctx, "AI update", "").await;
        assert_eq!(decision.reason, "source mismatch");
    }

    #[tokio::test]
    async fn test_fallback_confidence_setting() {
        let decision = classify(&context(&[], &[]), "Anything", "").await;
        assert!(decision.matched);
        assert_eq!(decision.confidence, DEFAULT_FALLBACK_CONFIDENCE);

        let settings: PluginSettings = [("fallback_confidence".to_string(), json!(0.8))].into_iter().collect();
        let plugin = KeywordHeuristicClassifier::from_settings(&settings).unwrap();
        let decision = plugin
            .classify_stream(&ArticleContext::new("a1", "x", ""), &context(&[], &[]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(decision.confidence, 0.8);

        let settings: PluginSettings = [("fallback_confidence".to_string(), json!("high"))].into_iter().collect();
        assert!(KeywordHeuristicClassifier::from_settings(&settings).is_err());
    }
}
