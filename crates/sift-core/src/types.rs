//! Core types for Sift

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metadata key carrying the article's source URL
pub const META_SOURCE_URL: &str = "source_url";

/// Metadata key carrying the article's language code
pub const META_LANGUAGE: &str = "language";

/// Read-only view of one article for matching and plugin calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleContext {
    /// Article identifier assigned by the persistence layer
    pub article_id: String,

    /// Article title
    pub title: String,

    /// Plain-text article body
    #[serde(default)]
    pub content_text: String,

    /// Free-form metadata; at minimum `source_url` and `language`
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ArticleContext {
    /// Create a new article view with empty metadata
    pub fn new(
        article_id: impl Into<String>,
        title: impl Into<String>,
        content_text: impl Into<String>,
    ) -> Self {
        Self {
            article_id: article_id.into(),
            title: title.into(),
            content_text: content_text.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Set the source URL
    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.metadata.insert(META_SOURCE_URL.to_string(), url.into());
        self
    }

    /// Set the language code
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.metadata.insert(META_LANGUAGE.to_string(), language.into());
        self
    }

    /// Source URL, if present and non-blank
    pub fn source_url(&self) -> Option<&str> {
        self.meta(META_SOURCE_URL)
    }

    /// Language code, if present and non-blank
    pub fn language(&self) -> Option<&str> {
        self.meta(META_LANGUAGE)
    }

    fn meta(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// Text of the given field
    pub fn field(&self, field: Field) -> &str {
        match field {
            Field::Title => &self.title,
            Field::ContentText => &self.content_text,
        }
    }
}

/// Article field an evidence hit points into
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    ContentText,
}

impl Field {
    /// Fields in evaluation order (title before content)
    pub const ALL: [Field; 2] = [Field::Title, Field::ContentText];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::ContentText => "content_text",
        }
    }

    /// Parse a field name as reported by plugins
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "title" => Some(Self::Title),
            "content_text" | "content" => Some(Self::ContentText),
            _ => None,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and why a match occurred
///
/// `start`/`end` are character offsets into the named field, so the UI can
/// highlight `field[start..end]` directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceHit {
    /// Field the hit was found in
    pub field: Field,

    /// Text of the field covered by the hit
    pub token: String,

    /// Configured term that produced the hit (query literal, keyword, or pattern)
    pub term: String,

    /// Start character offset (inclusive)
    pub start: usize,

    /// End character offset (exclusive)
    pub end: usize,

    /// Surrounding text with `...` where truncated
    pub snippet: String,

    /// Boolean operator the term was combined under, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator_context: Option<String>,
}

impl EvidenceHit {
    /// Key used to drop duplicate hits
    pub fn dedup_key(&self) -> (Field, usize, usize, &str) {
        (self.field, self.start, self.end, self.term.as_str())
    }
}

/// Final decision that an article belongs to a stream
///
/// Persisted idempotently, keyed by `(stream_id, article_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchDecision {
    pub stream_id: String,
    pub article_id: String,
    pub reason: String,
    pub evidence: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_article_metadata_accessors() {
        let article = ArticleContext::new("a1", "Title", "Body")
            .with_source_url("https://example.com/feed")
            .with_language("  ");

        assert_eq!(article.source_url(), Some("https://example.com/feed"));
        assert_eq!(article.language(), None);
        assert_eq!(article.field(Field::Title), "Title");
    }

    #[test]
    fn test_field_serialization() {
        let json = serde_json::to_string(&Field::ContentText).unwrap();
        assert_eq!(json, "\"content_text\"");
        assert_eq!(Field::parse("content"), Some(Field::ContentText));
        assert_eq!(Field::parse("summary"), None);
    }
}
