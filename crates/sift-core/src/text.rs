//! Text normalization with offset tracking
//!
//! Matching happens on NFKC-normalized, lowercased text with whitespace runs
//! collapsed to a single space. Evidence must still point into the original
//! field, so every normalized character remembers the character index it was
//! produced from.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Characters of context kept on each side of a hit
pub const SNIPPET_RADIUS: usize = 48;

/// Normalized view of a piece of text
#[derive(Debug, Clone, Default)]
pub struct NormalizedText {
    text: String,
    /// Byte offset in `text` of each normalized character
    char_starts: Vec<usize>,
    /// Original character span each normalized character came from
    origins: Vec<(usize, usize)>,
    original_len: usize,
}

/// A whitespace-delimited token with its original character span
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSpan {
    /// Normalized token text, edge punctuation trimmed
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Characters that compose with what precedes them
fn continues_cluster(ch: char) -> bool {
    is_combining_mark(ch) || matches!(ch, '\u{1160}'..='\u{11FF}')
}

impl NormalizedText {
    /// Normalize `raw`, keeping the offset mapping
    ///
    /// NFKC runs over each base character together with its trailing
    /// combining marks, so decomposed input composes the same way as
    /// precomposed input.
    pub fn new(raw: &str) -> Self {
        let chars: Vec<char> = raw.chars().collect();
        let mut out = Self {
            text: String::with_capacity(raw.len()),
            original_len: chars.len(),
            ..Self::default()
        };
        let mut pending_space: Option<(usize, usize)> = None;

        let mut start = 0;
        while start < chars.len() {
            let mut end = start + 1;
            while end < chars.len() && continues_cluster(chars[end]) {
                end += 1;
            }
            let origin = (start, end);

            for folded in chars[start..end].iter().copied().nfkc() {
                for lower in folded.to_lowercase() {
                    if lower.is_whitespace() {
                        if !out.text.is_empty() && pending_space.is_none() {
                            pending_space = Some(origin);
                        }
                        continue;
                    }
                    if let Some(space_origin) = pending_space.take() {
                        out.push(' ', space_origin);
                    }
                    out.push(lower, origin);
                }
            }
            start = end;
        }

        out
    }

    fn push(&mut self, ch: char, origin: (usize, usize)) {
        self.char_starts.push(self.text.len());
        self.origins.push(origin);
        self.text.push(ch);
    }

    /// The normalized text
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Consume into the normalized string
    pub fn into_string(self) -> String {
        self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Length of the original text in characters
    pub fn original_len(&self) -> usize {
        self.original_len
    }

    /// Whether the normalized text contains `needle` (already normalized)
    pub fn contains(&self, needle: &str) -> bool {
        !needle.is_empty() && self.text.contains(needle)
    }

    /// Original character span of the first occurrence of `needle`
    pub fn find(&self, needle: &str) -> Option<(usize, usize)> {
        if needle.is_empty() {
            return None;
        }
        let start = self.text.find(needle)?;
        self.span_of_bytes(start, start + needle.len())
    }

    /// Map a byte range of the normalized text back to an original character span
    ///
    /// Returns `None` for empty ranges or ranges not on character boundaries.
    pub fn span_of_bytes(&self, start_byte: usize, end_byte: usize) -> Option<(usize, usize)> {
        if start_byte >= end_byte || end_byte > self.text.len() {
            return None;
        }
        let first = self.char_starts.binary_search(&start_byte).ok()?;
        let last = match self.char_starts.binary_search(&end_byte) {
            Ok(next) | Err(next) => next.checked_sub(1)?,
        };
        if last < first {
            return None;
        }
        Some((self.origins[first].0, self.origins[last].1))
    }

    /// Whitespace-delimited tokens with leading/trailing punctuation trimmed
    pub fn tokens(&self) -> Vec<TokenSpan> {
        let mut tokens = Vec::new();
        let mut offset = 0;

        for piece in self.text.split(' ') {
            let piece_start = offset;
            offset += piece.len() + 1;

            let leading_trimmed = piece.trim_start_matches(|c: char| !c.is_alphanumeric());
            let trimmed = leading_trimmed.trim_end_matches(|c: char| !c.is_alphanumeric());
            if trimmed.is_empty() {
                continue;
            }

            let byte_start = piece_start + (piece.len() - leading_trimmed.len());
            if let Some((start, end)) = self.span_of_bytes(byte_start, byte_start + trimmed.len()) {
                tokens.push(TokenSpan {
                    text: trimmed.to_string(),
                    start,
                    end,
                });
            }
        }

        tokens
    }
}

/// NFKC-normalize, lowercase, and collapse whitespace
pub fn normalize_text(value: &str) -> String {
    NormalizedText::new(value).into_string()
}

/// Characters `start..end` of `raw`
pub fn slice_chars(raw: &str, start: usize, end: usize) -> String {
    raw.chars().skip(start).take(end.saturating_sub(start)).collect()
}

/// Context window of [`SNIPPET_RADIUS`] characters around `start..end`
pub fn build_snippet(raw: &str, start: usize, end: usize) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let len = chars.len();
    let end = end.min(len);
    let start = start.min(end);
    let from = start.saturating_sub(SNIPPET_RADIUS);
    let to = (end + SNIPPET_RADIUS).min(len);

    let mut snippet = String::with_capacity(to - from + 6);
    if from > 0 {
        snippet.push_str("...");
    }
    snippet.extend(
        chars[from..to]
            .iter()
            .map(|c| if c.is_whitespace() { ' ' } else { *c }),
    );
    if to < len {
        snippet.push_str("...");
    }
    snippet
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization_collapses_and_lowercases() {
        let text = NormalizedText::new("  Hello\n\n  Wörld ");
        assert_eq!(text.as_str(), "hello wörld");
        assert_eq!(text.original_len(), 17);
    }

    #[test]
    fn test_find_maps_to_original_offsets() {
        let raw = "Hello\n\n  Wörld";
        let text = NormalizedText::new(raw);
        assert_eq!(text.find("wörld"), Some((9, 14)));
        assert_eq!(slice_chars(raw, 9, 14), "Wörld");
        assert_eq!(text.find("hello wör"), Some((0, 12)));
        assert_eq!(text.find("absent"), None);
    }

    #[test]
    fn test_nfkc_expansion_keeps_origin() {
        // U+FB01 LATIN SMALL LIGATURE FI expands to two characters
        let text = NormalizedText::new("\u{FB01}nance report");
        assert_eq!(text.as_str(), "finance report");
        assert_eq!(text.find("finance"), Some((0, 6)));

        let wide = NormalizedText::new("ＡＩ update");
        assert_eq!(wide.as_str(), "ai update");
        assert_eq!(wide.find("ai"), Some((0, 2)));
    }

    #[test]
    fn test_decomposed_input_composes() {
        let decomposed = NormalizedText::new("Best cafe\u{301} in town");
        assert_eq!(decomposed.as_str(), normalize_text("best café in town"));
        assert_eq!(decomposed.find("café"), Some((5, 10)));
        assert_eq!(decomposed.original_len(), 18);

        let tokens: Vec<_> = decomposed.tokens().into_iter().map(|t| (t.text, t.start, t.end)).collect();
        assert_eq!(tokens[1], ("café".to_string(), 5, 10));

        // Conjoining jamo compose into one syllable
        assert_eq!(normalize_text("\u{1100}\u{1161}"), "\u{AC00}");
    }

    #[test]
    fn test_tokens_trim_punctuation() {
        let text = NormalizedText::new("(Threatintel) update, v2.1!");
        let tokens: Vec<_> = text.tokens().into_iter().map(|t| (t.text, t.start, t.end)).collect();
        assert_eq!(
            tokens,
            vec![
                ("threatintel".to_string(), 1, 12),
                ("update".to_string(), 14, 20),
                ("v2.1".to_string(), 22, 26),
            ]
        );
    }

    #[test]
    fn test_snippet_ellipses() {
        let raw = "a".repeat(60) + "HIT" + &"b".repeat(60);
        let snippet = build_snippet(&raw, 60, 63);
        assert!(snippet.starts_with("..."));
        assert!(snippet.ends_with("..."));
        assert_eq!(snippet.chars().count(), 48 + 3 + 48 + 6);

        assert_eq!(build_snippet("short HIT", 6, 9), "short HIT");
    }
}
