//! Rule evaluation for a compiled stream
//!
//! Every configured criterion type must hold (query, keywords, regex, source,
//! language) and no exclusion may be present. Within include keywords and
//! include regex any single hit suffices.

use crate::document::{Document, FieldText};
use crate::stream::CompiledStream;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sift_core::{ArticleContext, EvidenceHit, Field};

/// Source filter evidence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEvidence {
    pub source_contains: String,
    pub source_url: String,
}

/// Language filter evidence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageEvidence {
    pub language_equals: String,
    pub language: String,
}

/// Evidence produced by rule matching
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleEvidence {
    /// Always `"rules"`
    pub matcher_type: String,

    #[serde(default)]
    pub query_hits: Vec<EvidenceHit>,

    /// Query terms satisfied only by the source URL
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query_source_terms: Vec<String>,

    #[serde(default)]
    pub keyword_hits: Vec<EvidenceHit>,

    #[serde(default)]
    pub regex_hits: Vec<EvidenceHit>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceEvidence>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<LanguageEvidence>,
}

impl Default for RuleEvidence {
    fn default() -> Self {
        Self {
            matcher_type: "rules".to_string(),
            query_hits: Vec::new(),
            query_source_terms: Vec::new(),
            keyword_hits: Vec::new(),
            regex_hits: Vec::new(),
            source: None,
            language: None,
        }
    }
}

impl RuleEvidence {
    /// All positional hits, query first
    pub fn hits(&self) -> impl Iterator<Item = &EvidenceHit> {
        self.query_hits
            .iter()
            .chain(&self.keyword_hits)
            .chain(&self.regex_hits)
    }
}

/// A positive rule outcome
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    /// Human-readable summary of the satisfied criteria
    pub reason: String,
    pub evidence: RuleEvidence,
}

impl RuleMatch {
    pub fn evidence_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.evidence).unwrap_or(serde_json::Value::Null)
    }
}

/// Evaluate a stream's rules against a prepared document
///
/// Returns `None` when the rules do not match or when the stream has no rule
/// criteria at all (classifier-only streams).
pub fn evaluate_rules(
    stream: &CompiledStream,
    document: &Document,
    source_url: Option<&str>,
    language: Option<&str>,
) -> Option<RuleMatch> {
    if !stream.has_rule_criteria() || is_excluded(stream, document) {
        return None;
    }

    let mut evidence = RuleEvidence::default();
    let mut reasons = Vec::new();

    if let Some(expected) = stream.source_contains() {
        let url = source_url?;
        if !url.to_lowercase().contains(expected) {
            return None;
        }
        reasons.push(format!("source contains '{}'", expected));
        evidence.source = Some(SourceEvidence {
            source_contains: expected.to_string(),
            source_url: url.to_string(),
        });
    }

    if let Some(expected) = stream.language_equals() {
        let actual = language?;
        if actual.trim().to_lowercase() != expected {
            return None;
        }
        reasons.push(format!("language is '{}'", expected));
        evidence.language = Some(LanguageEvidence {
            language_equals: expected.to_string(),
            language: actual.to_string(),
        });
    }

    if let Some(query) = stream.query() {
        let outcome = query.evaluate(document);
        if !outcome.matched {
            return None;
        }
        reasons.push(format!("query matched: {}", query.source()));
        evidence.query_hits = outcome.hits;
        evidence.query_source_terms = outcome.source_terms;
    }

    if !stream.include_keywords().is_empty() {
        let hits = keyword_hits(stream, document);
        let first = hits.first()?;
        reasons.push(format!("keyword '{}' in {}", first.term, first.field));
        evidence.keyword_hits = hits;
    }

    if !stream.include_regex().is_empty() {
        let hits = regex_hits(stream.include_regex(), document);
        let first = hits.first()?;
        reasons.push(format!("regex '{}' in {}", first.term, first.field));
        evidence.regex_hits = hits;
    }

    Some(RuleMatch {
        reason: reasons.join("; "),
        evidence,
    })
}

/// Evaluate a stream's rules against an article
pub fn match_article(stream: &CompiledStream, article: &ArticleContext) -> Option<RuleMatch> {
    let document = Document::from_article(article);
    evaluate_rules(stream, &document, article.source_url(), article.language())
}

fn is_excluded(stream: &CompiledStream, document: &Document) -> bool {
    let keywords = stream.exclude_keyword_set();
    let patterns = stream.exclude_regex();
    Field::ALL.into_iter().any(|field| {
        let text = document.field(field);
        keywords.is_match(text.normalized())
            || patterns.iter().any(|pattern| pattern.is_match(text.raw()))
    })
}

/// First hit for each include keyword, title before content
fn keyword_hits(stream: &CompiledStream, document: &Document) -> Vec<EvidenceHit> {
    let keywords = stream.include_keyword_set();
    let per_field: Vec<_> = Field::ALL
        .into_iter()
        .map(|field| {
            let text = document.field(field);
            (field, text, keywords.first_spans(text.normalized()))
        })
        .collect();

    keywords
        .keywords()
        .iter()
        .enumerate()
        .filter_map(|(index, keyword)| {
            per_field.iter().find_map(|(field, text, spans)| {
                let (start_byte, end_byte) = spans[index]?;
                let (start, end) = text.normalized().span_of_bytes(start_byte, end_byte)?;
                Some(text.hit(*field, start, end, keyword.as_str(), None))
            })
        })
        .collect()
}

/// First non-empty match for each include pattern, title before content
///
/// Patterns run against the original field text.
fn regex_hits(patterns: &[Regex], document: &Document) -> Vec<EvidenceHit> {
    patterns
        .iter()
        .filter_map(|pattern| {
            Field::ALL.into_iter().find_map(|field| {
                let text = document.field(field);
                first_regex_span(pattern, text)
                    .map(|(start, end)| text.hit(field, start, end, pattern.as_str(), None))
            })
        })
        .collect()
}

fn first_regex_span(pattern: &Regex, text: &FieldText) -> Option<(usize, usize)> {
    let raw = text.raw();
    let m = pattern.find_iter(raw).find(|m| !m.is_empty())?;
    let start = raw[..m.start()].chars().count();
    let end = start + m.as_str().chars().count();
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{ClassifierMode, StreamDefinition};

    fn article(title: &str, content: &str) -> ArticleContext {
        ArticleContext::new("a1", title, content)
            .with_source_url("https://news.example.com/feed")
            .with_language("en")
    }

    #[test]
    fn test_keyword_reason_and_evidence() {
        let stream = StreamDefinition::new("s1", "AI")
            .with_include_keywords(["ai", "robots"])
            .compile()
            .unwrap();

        let matched = match_article(&stream, &article("AI update", "New AI labs")).unwrap();
        assert_eq!(matched.reason, "keyword 'ai' in title");
        assert_eq!(matched.evidence.keyword_hits.len(), 1);

        let hit = &matched.evidence.keyword_hits[0];
        assert_eq!((hit.field, hit.start, hit.end), (Field::Title, 0, 2));
        assert_eq!(hit.token, "AI");
        assert_eq!(hit.snippet, "AI update");
    }

    #[test]
    fn test_keyword_falls_back_to_content() {
        let stream = StreamDefinition::new("s1", "Robots")
            .with_include_keywords(["robots"])
            .compile()
            .unwrap();
        let matched = match_article(&stream, &article("Weekly", "Rise of the Robots")).unwrap();
        let hit = &matched.evidence.keyword_hits[0];
        assert_eq!((hit.field, hit.start, hit.end), (Field::ContentText, 12, 18));
        assert_eq!(matched.reason, "keyword 'robots' in content_text");
    }

    #[test]
    fn test_exclusions_short_circuit() {
        let stream = StreamDefinition::new("s1", "AI")
            .with_include_keywords(["ai"])
            .with_exclude_keywords(["sports"])
            .compile()
            .unwrap();
        assert!(match_article(&stream, &article("AI update", "sports roundup")).is_none());

        let stream = StreamDefinition::new("s2", "AI")
            .with_include_keywords(["ai"])
            .with_exclude_regex(r"\bsponsored\b")
            .compile()
            .unwrap();
        assert!(match_article(&stream, &article("AI update (SPONSORED)", "")).is_none());
        assert!(match_article(&stream, &article("AI update", "")).is_some());
    }

    #[test]
    fn test_all_criterion_types_must_hold() {
        let stream = StreamDefinition::new("s1", "Mixed")
            .with_query("cloud")
            .with_include_keywords(["outage"])
            .with_source_contains("example.com")
            .with_language("EN")
            .compile()
            .unwrap();

        let matched = match_article(&stream, &article("Cloud outage", "")).unwrap();
        assert_eq!(
            matched.reason,
            "source contains 'example.com'; language is 'en'; query matched: cloud; keyword 'outage' in title"
        );
        assert_eq!(matched.evidence.query_hits.len(), 1);
        assert!(matched.evidence.source.is_some());
        assert!(matched.evidence.language.is_some());

        assert!(match_article(&stream, &article("Cloud update", "")).is_none());
        let german = ArticleContext::new("a2", "Cloud outage", "")
            .with_source_url("https://news.example.com")
            .with_language("de");
        assert!(match_article(&stream, &german).is_none());
        let no_source = ArticleContext::new("a3", "Cloud outage", "").with_language("en");
        assert!(match_article(&stream, &no_source).is_none());
    }

    #[test]
    fn test_regex_offsets_are_characters() {
        let stream = StreamDefinition::new("s1", "CVE")
            .with_include_regex(r"cve-\d{4}-\d+")
            .compile()
            .unwrap();
        let matched = match_article(&stream, &article("Über patch", "Fixes CVE-2024-1234 today")).unwrap();
        let hit = &matched.evidence.regex_hits[0];
        assert_eq!(hit.field, Field::ContentText);
        assert_eq!((hit.start, hit.end), (6, 19));
        assert_eq!(hit.token, "CVE-2024-1234");

        let matched = match_article(&stream, &article("Ärger: CVE-2023-1 fixed", "")).unwrap();
        let hit = &matched.evidence.regex_hits[0];
        assert_eq!((hit.start, hit.end), (7, 17));
    }

    #[test]
    fn test_classifier_only_stream_has_no_rule_outcome() {
        let stream = StreamDefinition::new("s1", "Cls")
            .with_classifier(ClassifierMode::ClassifierOnly, "kw")
            .compile()
            .unwrap();
        assert!(match_article(&stream, &article("Anything", "")).is_none());
    }

    #[test]
    fn test_evidence_json_shape() {
        let stream = StreamDefinition::new("s1", "AI")
            .with_include_keywords(["ai"])
            .compile()
            .unwrap();
        let matched = match_article(&stream, &article("AI update", "")).unwrap();
        let json = matched.evidence_json();
        assert_eq!(json["matcher_type"], "rules");
        assert_eq!(json["keyword_hits"][0]["field"], "title");
        assert!(json.get("source").is_none());
    }
}
