//! Sift Core
//!
//! Core types, traits, and utilities shared across the Sift matching engine.
//!
//! This crate provides:
//! - The article view handed to matchers and plugins
//! - Evidence and decision records produced for the persistence layer
//! - Error types and result handling
//! - Unicode-aware text normalization that keeps offsets into the original text

pub mod error;
pub mod text;
pub mod types;

pub use error::{Error, Result};
pub use text::{build_snippet, normalize_text, NormalizedText, TokenSpan, SNIPPET_RADIUS};
pub use types::{ArticleContext, EvidenceHit, Field, MatchDecision};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::text::{normalize_text, NormalizedText};
    pub use crate::types::{ArticleContext, EvidenceHit, Field, MatchDecision};
}
