//! Stream definitions and their compiled, validated form

use crate::query::{parse_query, SearchQuery};
use aho_corasick::AhoCorasick;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use sift_core::{normalize_text, Error, NormalizedText, Result};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// How a stream decides whether an article belongs to it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ClassifierMode {
    /// Keyword, regex, query, source, and language rules only
    #[default]
    RulesOnly,
    /// The classifier plugin alone decides
    ClassifierOnly,
    /// Either the rules or the classifier may match
    Hybrid,
}

impl ClassifierMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RulesOnly => "rules_only",
            Self::ClassifierOnly => "classifier_only",
            Self::Hybrid => "hybrid",
        }
    }

    /// Whether a classifier plugin must be configured
    pub fn requires_classifier(&self) -> bool {
        !matches!(self, Self::RulesOnly)
    }
}

impl FromStr for ClassifierMode {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rules_only" => Ok(Self::RulesOnly),
            "classifier_only" => Ok(Self::ClassifierOnly),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(Error::validation(format!(
                "unknown classifier_mode '{}'. Allowed: classifier_only, hybrid, rules_only",
                other
            ))),
        }
    }
}

impl TryFrom<String> for ClassifierMode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ClassifierMode> for String {
    fn from(mode: ClassifierMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for ClassifierMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stream as persisted by the storage layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDefinition {
    pub id: String,

    pub name: String,

    /// Lower values are evaluated first
    #[serde(default = "default_priority")]
    pub priority: i32,

    #[serde(default = "default_true")]
    pub is_active: bool,

    /// Boolean search query
    #[serde(default)]
    pub match_query: Option<String>,

    #[serde(default)]
    pub include_keywords: Vec<String>,

    #[serde(default)]
    pub exclude_keywords: Vec<String>,

    #[serde(default)]
    pub include_regex: Vec<String>,

    #[serde(default)]
    pub exclude_regex: Vec<String>,

    /// Substring the article's source URL must contain
    #[serde(default)]
    pub source_contains: Option<String>,

    /// Language code the article must carry
    #[serde(default)]
    pub language_equals: Option<String>,

    #[serde(default)]
    pub classifier_mode: ClassifierMode,

    /// Plugin id of the stream classifier
    #[serde(default)]
    pub classifier_plugin: Option<String>,

    /// Opaque settings handed to the classifier plugin
    #[serde(default)]
    pub classifier_config: BTreeMap<String, serde_json::Value>,

    #[serde(default = "default_min_confidence")]
    pub classifier_min_confidence: f64,
}

fn default_priority() -> i32 {
    100
}

fn default_true() -> bool {
    true
}

fn default_min_confidence() -> f64 {
    0.7
}

impl StreamDefinition {
    /// Create an empty rules-only definition
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            priority: default_priority(),
            is_active: true,
            match_query: None,
            include_keywords: Vec::new(),
            exclude_keywords: Vec::new(),
            include_regex: Vec::new(),
            exclude_regex: Vec::new(),
            source_contains: None,
            language_equals: None,
            classifier_mode: ClassifierMode::default(),
            classifier_plugin: None,
            classifier_config: BTreeMap::new(),
            classifier_min_confidence: default_min_confidence(),
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.match_query = Some(query.into());
        self
    }

    pub fn with_include_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_exclude_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_include_regex(mut self, pattern: impl Into<String>) -> Self {
        self.include_regex.push(pattern.into());
        self
    }

    pub fn with_exclude_regex(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_regex.push(pattern.into());
        self
    }

    pub fn with_source_contains(mut self, value: impl Into<String>) -> Self {
        self.source_contains = Some(value.into());
        self
    }

    pub fn with_language(mut self, value: impl Into<String>) -> Self {
        self.language_equals = Some(value.into());
        self
    }

    /// Attach a classifier plugin under the given mode
    pub fn with_classifier(mut self, mode: ClassifierMode, plugin_id: impl Into<String>) -> Self {
        self.classifier_mode = mode;
        self.classifier_plugin = Some(plugin_id.into());
        self
    }

    pub fn with_min_confidence(mut self, value: f64) -> Self {
        self.classifier_min_confidence = value;
        self
    }

    pub fn compile(&self) -> Result<CompiledStream> {
        CompiledStream::compile(self)
    }
}

/// Normalized keyword list with a multi-pattern matcher
#[derive(Debug, Clone)]
pub(crate) struct KeywordSet {
    keywords: Vec<String>,
    matcher: Option<AhoCorasick>,
}

impl KeywordSet {
    fn build(raw: &[String], label: &str) -> Result<Self> {
        let mut seen = HashSet::new();
        let keywords: Vec<String> = raw
            .iter()
            .map(|keyword| normalize_text(keyword))
            .filter(|keyword| !keyword.is_empty() && seen.insert(keyword.clone()))
            .collect();

        let matcher = if keywords.is_empty() {
            None
        } else {
            let matcher = AhoCorasick::new(&keywords).map_err(|e| {
                Error::validation(format!("failed to build {} matcher: {}", label, e))
            })?;
            Some(matcher)
        };

        Ok(Self { keywords, matcher })
    }

    pub(crate) fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// Whether any keyword occurs in the normalized text
    pub(crate) fn is_match(&self, text: &NormalizedText) -> bool {
        self.matcher
            .as_ref()
            .map_or(false, |matcher| matcher.is_match(text.as_str()))
    }

    /// First normalized-byte span of each keyword in `text`, indexed like `keywords()`
    pub(crate) fn first_spans(&self, text: &NormalizedText) -> Vec<Option<(usize, usize)>> {
        let mut spans = vec![None; self.keywords.len()];
        if let Some(matcher) = &self.matcher {
            for m in matcher.find_overlapping_iter(text.as_str()) {
                let slot = &mut spans[m.pattern().as_usize()];
                if slot.is_none() {
                    *slot = Some((m.start(), m.end()));
                }
            }
        }
        spans
    }
}

/// A validated stream ready for evaluation
#[derive(Debug, Clone)]
pub struct CompiledStream {
    id: String,
    name: String,
    priority: i32,
    query: Option<SearchQuery>,
    include_keywords: KeywordSet,
    exclude_keywords: KeywordSet,
    include_regex: Vec<Regex>,
    exclude_regex: Vec<Regex>,
    source_contains: Option<String>,
    language_equals: Option<String>,
    classifier_mode: ClassifierMode,
    classifier_plugin: Option<String>,
    classifier_config: BTreeMap<String, serde_json::Value>,
    classifier_min_confidence: f64,
}

impl CompiledStream {
    /// Normalize and validate a definition
    ///
    /// Fails with [`Error::Syntax`] for a malformed query and with
    /// [`Error::Validation`] for everything else.
    pub fn compile(definition: &StreamDefinition) -> Result<Self> {
        let include_keywords = KeywordSet::build(&definition.include_keywords, "include keyword")?;
        let exclude_keywords = KeywordSet::build(&definition.exclude_keywords, "exclude keyword")?;
        let include_regex = compile_patterns(&definition.include_regex)?;
        let exclude_regex = compile_patterns(&definition.exclude_regex)?;

        let query = match clean(definition.match_query.as_deref()) {
            Some(text) => Some(parse_query(&text)?),
            None => None,
        };

        let source_contains = clean(definition.source_contains.as_deref()).map(|s| s.to_lowercase());
        let language_equals = clean(definition.language_equals.as_deref()).map(|s| s.to_lowercase());
        let classifier_plugin = clean(definition.classifier_plugin.as_deref());

        let confidence = definition.classifier_min_confidence;
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(Error::validation(format!(
                "classifier_min_confidence must be between 0 and 1, got {}",
                confidence
            )));
        }

        let mode = definition.classifier_mode;
        if mode.requires_classifier() && classifier_plugin.is_none() {
            return Err(Error::validation(format!(
                "classifier_plugin is required when classifier_mode is '{}'",
                mode
            )));
        }

        let stream = Self {
            id: definition.id.clone(),
            name: definition.name.clone(),
            priority: definition.priority,
            query,
            include_keywords,
            exclude_keywords,
            include_regex,
            exclude_regex,
            source_contains,
            language_equals,
            classifier_mode: mode,
            classifier_plugin,
            classifier_config: definition.classifier_config.clone(),
            classifier_min_confidence: confidence,
        };

        if !stream.has_rule_criteria() && !stream.has_classifier() {
            return Err(Error::validation(
                "stream needs at least one of match_query, include_keywords, include_regex, \
                 source_contains, language_equals, or a classifier plugin",
            ));
        }

        Ok(stream)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn query(&self) -> Option<&SearchQuery> {
        self.query.as_ref()
    }

    /// Normalized, deduplicated include keywords
    pub fn include_keywords(&self) -> &[String] {
        self.include_keywords.keywords()
    }

    pub fn exclude_keywords(&self) -> &[String] {
        self.exclude_keywords.keywords()
    }

    pub fn include_regex(&self) -> &[Regex] {
        &self.include_regex
    }

    pub fn exclude_regex(&self) -> &[Regex] {
        &self.exclude_regex
    }

    pub fn source_contains(&self) -> Option<&str> {
        self.source_contains.as_deref()
    }

    pub fn language_equals(&self) -> Option<&str> {
        self.language_equals.as_deref()
    }

    pub fn classifier_mode(&self) -> ClassifierMode {
        self.classifier_mode
    }

    pub fn classifier_plugin(&self) -> Option<&str> {
        self.classifier_plugin.as_deref()
    }

    pub fn classifier_config(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.classifier_config
    }

    pub fn classifier_min_confidence(&self) -> f64 {
        self.classifier_min_confidence
    }

    pub(crate) fn include_keyword_set(&self) -> &KeywordSet {
        &self.include_keywords
    }

    pub(crate) fn exclude_keyword_set(&self) -> &KeywordSet {
        &self.exclude_keywords
    }

    /// Whether any positive rule criterion is configured
    pub fn has_rule_criteria(&self) -> bool {
        self.query.is_some()
            || !self.include_keywords.is_empty()
            || !self.include_regex.is_empty()
            || self.source_contains.is_some()
            || self.language_equals.is_some()
    }

    /// Whether the stream's mode calls a classifier plugin
    pub fn has_classifier(&self) -> bool {
        self.classifier_mode.requires_classifier() && self.classifier_plugin.is_some()
    }
}

fn clean(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| pattern.trim())
        .filter(|pattern| !pattern.is_empty())
        .map(|pattern| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| Error::validation(format!("invalid regex '{}': {}", pattern, e)))
        })
        .collect()
}

/// Compile every active definition, ordered by priority then name
///
/// Definitions that fail to compile are logged and skipped so one bad stream
/// never blocks the others.
pub fn compile_active_streams(definitions: &[StreamDefinition]) -> Vec<CompiledStream> {
    let mut compiled: Vec<CompiledStream> = definitions
        .iter()
        .filter(|definition| definition.is_active)
        .filter_map(|definition| match definition.compile() {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!(
                    stream_id = %definition.id,
                    error_type = e.kind(),
                    error = %e,
                    "Skipping stream that failed to compile"
                );
                None
            }
        })
        .collect();

    compiled.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
    compiled
}
