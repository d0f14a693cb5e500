//! Plugin capabilities and the traits that implement them

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sift_core::{ArticleContext, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Extension point a plugin may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Capability {
    IngestHook,
    StreamClassifier,
    DiscoverFeeds,
    SummarizeArticle,
    DashboardCard,
    WorkspaceArea,
    CommandPaletteAction,
}

impl Capability {
    pub const ALL: [Capability; 7] = [
        Capability::CommandPaletteAction,
        Capability::DashboardCard,
        Capability::DiscoverFeeds,
        Capability::IngestHook,
        Capability::StreamClassifier,
        Capability::SummarizeArticle,
        Capability::WorkspaceArea,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IngestHook => "ingest_hook",
            Self::StreamClassifier => "stream_classifier",
            Self::DiscoverFeeds => "discover_feeds",
            Self::SummarizeArticle => "summarize_article",
            Self::DashboardCard => "dashboard_card",
            Self::WorkspaceArea => "workspace_area",
            Self::CommandPaletteAction => "command_palette_action",
        }
    }

    /// Method an implementation must expose for this capability
    ///
    /// UI-only capabilities have no dispatch contract.
    pub fn required_method(&self) -> Option<&'static str> {
        match self {
            Self::IngestHook => Some("on_article_ingested"),
            Self::StreamClassifier => Some("classify_stream"),
            _ => None,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        let item = value.trim();
        Self::ALL
            .into_iter()
            .find(|capability| capability.as_str() == item)
            .ok_or_else(|| {
                let allowed: Vec<_> = Self::ALL.iter().map(Capability::as_str).collect();
                format!("Unknown capability '{}'. Allowed: {}", item, allowed.join(", "))
            })
    }
}

impl TryFrom<String> for Capability {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Capability> for String {
    fn from(capability: Capability) -> Self {
        capability.as_str().to_string()
    }
}

/// Stream fields handed to a classifier plugin
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamClassifierContext {
    pub stream_id: String,
    pub stream_name: String,
    pub include_keywords: Vec<String>,
    pub exclude_keywords: Vec<String>,
    pub source_contains: Option<String>,
    pub language_equals: Option<String>,
    /// The stream's opaque classifier settings
    pub classifier_config: BTreeMap<String, serde_json::Value>,
    /// Article metadata relevant to the stream (`source_url`, `language`)
    pub metadata: BTreeMap<String, String>,
}

/// A plugin-reported finding, normalized later into match evidence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub start: Option<usize>,
    #[serde(default)]
    pub end: Option<usize>,
    #[serde(default)]
    pub score: Option<f64>,
}

/// Classifier verdict for one article and stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationDecision {
    pub matched: bool,
    pub confidence: f64,
    pub reason: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub model_version: Option<String>,
    #[serde(default)]
    pub findings: Vec<Finding>,
}

impl ClassificationDecision {
    pub fn new(matched: bool, confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            matched,
            confidence,
            reason: reason.into(),
            provider: None,
            model_name: None,
            model_version: None,
            findings: Vec::new(),
        }
    }

    pub fn with_model(
        mut self,
        provider: impl Into<String>,
        model_name: impl Into<String>,
        model_version: impl Into<String>,
    ) -> Self {
        self.provider = Some(provider.into());
        self.model_name = Some(model_name.into());
        self.model_version = Some(model_version.into());
        self
    }

    pub fn with_finding(mut self, finding: Finding) -> Self {
        self.findings.push(finding);
        self
    }
}

/// `ingest_hook`: enrich or transform an article after ingestion
#[async_trait]
pub trait IngestHook: Send + Sync {
    async fn on_article_ingested(&self, article: ArticleContext) -> Result<ArticleContext>;
}

/// `stream_classifier`: decide whether an article belongs to a stream
#[async_trait]
pub trait StreamClassifier: Send + Sync {
    /// `Ok(None)` means the plugin has no opinion
    async fn classify_stream(
        &self,
        article: &ArticleContext,
        stream: &StreamClassifierContext,
    ) -> Result<Option<ClassificationDecision>>;
}

/// A constructed plugin implementation
///
/// Capability traits are exposed through the `as_*` accessors; the registry
/// checks them against the declared capabilities before the plugin is ever
/// dispatched to.
pub trait Plugin: Send + Sync {
    /// Implementation name, for logs
    fn name(&self) -> &str;

    fn as_ingest_hook(self: Arc<Self>) -> Option<Arc<dyn IngestHook>> {
        None
    }

    fn as_stream_classifier(self: Arc<Self>) -> Option<Arc<dyn StreamClassifier>> {
        None
    }
}
