use crate::capability::{IngestHook, Plugin};
use async_trait::async_trait;
use sift_core::{ArticleContext, Result};
use std::sync::Arc;

/// Ingest hook that returns the article unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPlugin;

#[async_trait]
impl IngestHook for NoopPlugin {
    async fn on_article_ingested(&self, article: ArticleContext) -> Result<ArticleContext> {
        Ok(article)
    }
}

impl Plugin for NoopPlugin {
    fn name(&self) -> &str {
        "noop"
    }

    fn as_ingest_hook(self: Arc<Self>) -> Option<Arc<dyn IngestHook>> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_returns_article() {
        let article = ArticleContext::new("a1", "Title", "Body").with_language("en");
        let result = NoopPlugin.on_article_ingested(article.clone()).await.unwrap();
        assert_eq!(result, article);
        assert!(Arc::new(NoopPlugin).as_stream_classifier().is_none());
    }
}
