use crate::parser::FeedParser;
use crate::types::{AggregatorError, Article, FeedSource, RefreshConfig, Result, SyndicationService};
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Retrieves and normalizes sources, one at a time or all at once.
pub struct RefreshOrchestrator {
    syndication: Arc<dyn SyndicationService>,
    parser: FeedParser,
    config: RefreshConfig,
}

impl RefreshOrchestrator {
    pub fn new(syndication: Arc<dyn SyndicationService>, parser: FeedParser, config: RefreshConfig) -> Self {
        Self {
            syndication,
            parser,
            config,
        }
    }

    fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.config.source_timeout_seconds)
    }

    /// Fetch and normalize one source. A timeout counts as a network failure.
    pub async fn fetch_source(&self, source: &FeedSource) -> Result<Vec<Article>> {
        let payload = tokio::time::timeout(self.source_timeout(), self.syndication.retrieve(&source.id))
            .await
            .map_err(|_| {
                AggregatorError::Network(format!("Timed out after {}s", self.config.source_timeout_seconds))
            })?
            .map_err(|e| AggregatorError::Network(format!("{:#}", e)))?;

        let articles = self.parser.normalize(&source.id, &payload)?;
        debug!("Normalized {} articles from {}", articles.len(), source.id);
        Ok(articles)
    }

    /// Fetch every source concurrently and concatenate the results in the
    /// given order. Failed sources are logged and contribute nothing.
    pub async fn fetch_all(&self, sources: &[FeedSource]) -> Vec<Article> {
        let start_time = Instant::now();
        info!("Refreshing {} feeds", sources.len());

        let results = join_all(sources.iter().map(|source| self.fetch_source(source))).await;

        let mut merged = Vec::new();
        let mut successful = 0;
        for (source, result) in sources.iter().zip(results) {
            match result {
                Ok(articles) => {
                    successful += 1;
                    merged.extend(articles);
                }
                Err(e) => warn!("Feed failed: {}: {}", source.id, e),
            }
        }

        info!(
            "Refreshed {}/{} feeds, {} articles in {}ms",
            successful,
            sources.len(),
            merged.len(),
            start_time.elapsed().as_millis()
        );
        merged
    }
}
