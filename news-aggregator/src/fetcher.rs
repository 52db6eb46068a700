use crate::types::{AggregatorError, FetchConfig, Result, RetrievalMode, SyndicationService};
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::{Client, Response};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// HTTP retrieval of feed payloads, either straight from the feed address or
/// through an rss2json-style conversion service.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// The URL actually requested for a feed address.
    pub fn request_url(&self, address: &str) -> Result<Url> {
        match &self.config.retrieval {
            RetrievalMode::Direct => Ok(Url::parse(address)?),
            RetrievalMode::Converter { endpoint } => {
                Ok(Url::parse_with_params(endpoint, &[("rss_url", address)])?)
            }
        }
    }

    pub async fn fetch_feed(&self, address: &str) -> Result<String> {
        let url = self.request_url(address)?;
        let start_time = Instant::now();

        debug!("Fetching feed: {} via {}", address, url);

        let delay = Duration::from_millis(self.config.retry_delay_ms);
        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: delay,
            initial_interval: delay,
            max_interval: delay * 32,
            multiplier: 2.0,
            max_elapsed_time: Some(delay * 60),
            ..Default::default()
        };

        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match self.fetch_once(&url).await {
                Ok(content) => {
                    info!(
                        "Fetched feed: {} ({} bytes in {}ms)",
                        address,
                        content.len(),
                        start_time.elapsed().as_millis()
                    );
                    return Ok(content);
                }
                // Oversized payloads will not shrink on retry
                Err(e) if is_size_error(&e) => return Err(e),
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.config.max_retries {
                        if let Some(wait) = backoff.next_backoff() {
                            warn!("Attempt {} failed for {}, retrying in {:?}", attempt + 1, address, wait);
                            tokio::time::sleep(wait).await;
                            continue;
                        }
                    }
                    break;
                }
            }
        }

        let error_msg = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());
        warn!("Failed to fetch feed after {} attempts: {}", self.config.max_retries + 1, address);
        Err(AggregatorError::Network(error_msg))
    }

    async fn fetch_once(&self, url: &Url) -> Result<String> {
        let response: Response = self.client.get(url.clone()).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(AggregatorError::Network(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let limit = self.config.max_feed_size_mb * 1024 * 1024;
        if let Some(content_length) = response.content_length() {
            if content_length as usize > limit {
                return Err(too_large(content_length as usize));
            }
        }

        let content = response.text().await?;
        if content.len() > limit {
            return Err(too_large(content.len()));
        }
        Ok(content)
    }
}

const TOO_LARGE: &str = "Feed too large";

fn too_large(bytes: usize) -> AggregatorError {
    AggregatorError::Network(format!("{}: {}MB", TOO_LARGE, bytes / (1024 * 1024)))
}

fn is_size_error(e: &AggregatorError) -> bool {
    matches!(e, AggregatorError::Network(msg) if msg.starts_with(TOO_LARGE))
}

#[async_trait]
impl SyndicationService for Fetcher {
    async fn retrieve(&self, address: &str) -> anyhow::Result<String> {
        Ok(self.fetch_feed(address).await?)
    }
}
