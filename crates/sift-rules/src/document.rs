//! Pre-normalized article fields shared by every stream evaluated against one article

use sift_core::text::{build_snippet, slice_chars};
use sift_core::{ArticleContext, EvidenceHit, Field, NormalizedText, TokenSpan};

/// One article field: original text, normalized text, and tokens
#[derive(Debug, Clone)]
pub struct FieldText {
    raw: String,
    normalized: NormalizedText,
    tokens: Vec<TokenSpan>,
}

impl FieldText {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let normalized = NormalizedText::new(&raw);
        let tokens = normalized.tokens();
        Self {
            raw,
            normalized,
            tokens,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn normalized(&self) -> &NormalizedText {
        &self.normalized
    }

    pub fn tokens(&self) -> &[TokenSpan] {
        &self.tokens
    }

    /// Length of the original text in characters
    pub fn char_len(&self) -> usize {
        self.normalized.original_len()
    }

    /// Build an evidence hit for characters `start..end` of this field
    pub fn hit(
        &self,
        field: Field,
        start: usize,
        end: usize,
        term: impl Into<String>,
        operator_context: Option<&str>,
    ) -> EvidenceHit {
        EvidenceHit {
            field,
            token: slice_chars(&self.raw, start, end),
            term: term.into(),
            start,
            end,
            snippet: build_snippet(&self.raw, start, end),
            operator_context: operator_context.map(str::to_string),
        }
    }
}

/// Matchable view of an article
///
/// Build once per article and reuse it across all streams.
#[derive(Debug, Clone)]
pub struct Document {
    title: FieldText,
    content: FieldText,
    source: Option<FieldText>,
}

impl Document {
    pub fn new(title: &str, content_text: &str) -> Self {
        Self {
            title: FieldText::new(title),
            content: FieldText::new(content_text),
            source: None,
        }
    }

    /// Also match query terms against the article's source URL
    pub fn with_source_url(mut self, source_url: Option<&str>) -> Self {
        self.source = source_url
            .filter(|url| !url.trim().is_empty())
            .map(FieldText::new);
        self
    }

    pub fn from_article(article: &ArticleContext) -> Self {
        Self::new(&article.title, &article.content_text).with_source_url(article.source_url())
    }

    pub fn field(&self, field: Field) -> &FieldText {
        match field {
            Field::Title => &self.title,
            Field::ContentText => &self.content,
        }
    }

    /// Normalized source URL, when the article has one
    pub fn source(&self) -> Option<&FieldText> {
        self.source.as_ref()
    }
}
