use serde::{Deserialize, Serialize};
// Collaborator contracts live in the interfaces crate
pub use interfaces::defs::{AccountSession, FeedStore, SyndicationService};

use crate::rss_utils;

/// A configured source. `id` is the address exactly as the user entered it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    pub id: String,
    pub display_name: String,
}

impl FeedSource {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let display_name = rss_utils::url::display_name(&id);
        Self { id, display_name }
    }

    /// Case-insensitive identity, the registry's uniqueness key.
    pub fn matches(&self, address: &str) -> bool {
        self.id.to_lowercase() == address.trim().to_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub description: String,
    pub content: String,
    pub source_label: String,
    pub published_at: String,
    pub link: String,
    /// `None` only for sample articles.
    pub origin_source: Option<String>,
}

impl Article {
    pub fn is_from(&self, source_id: &str) -> bool {
        self.origin_source.as_deref() == Some(source_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Demo,
    Live,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateState {
    pub mode: Mode,
    pub articles: Vec<Article>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalMode {
    /// GET the feed address and parse the RSS/Atom document.
    Direct,
    /// GET `{endpoint}?rss_url=<address>` on an rss2json-style converter.
    Converter { endpoint: String },
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub max_feed_size_mb: usize,
    pub max_redirects: usize,
    pub retrieval: RetrievalMode,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "News-Aggregator/1.0".to_string(),
            timeout_seconds: 30,
            max_retries: 2,
            retry_delay_ms: 500,
            max_feed_size_mb: 10,
            max_redirects: 5,
            retrieval: RetrievalMode::Direct,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Upper bound for retrieving and normalizing a single source.
    pub source_timeout_seconds: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            source_timeout_seconds: 20,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("Invalid feed URL: {url}")]
    InvalidUrl { url: String },

    #[error("Feed already added: {url}")]
    DuplicateFeed { url: String },

    #[error("Feed not found: {url}")]
    FeedNotFound { url: String },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Failed to refresh {source_id}: {reason}")]
    Refresh {
        source_id: String,
        #[source]
        reason: Box<AggregatorError>,
    },

    #[error("Session changed before the operation completed")]
    SessionChanged,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AggregatorError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidUrl { .. } | Self::DuplicateFeed { .. })
    }

    pub(crate) fn refresh(source_id: &str, reason: AggregatorError) -> Self {
        Self::Refresh {
            source_id: source_id.to_string(),
            reason: Box::new(reason),
        }
    }
}

pub type Result<T> = std::result::Result<T, AggregatorError>;
