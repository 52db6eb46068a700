use crate::rss_utils;
use crate::types::{AggregatorError, Article, Result};
use feed_rs::parser;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

const UNTITLED: &str = "Untitled";

/// JSON envelope returned by rss2json-style conversion services.
#[derive(Debug, Deserialize)]
struct ConverterEnvelope {
    status: Option<String>,
    message: Option<String>,
    #[serde(default)]
    feed: Value,
    #[serde(default)]
    items: Value,
}

/// Turns one raw syndication payload into uniform, source-tagged articles.
///
/// Stateless apart from the date display format, so one instance can serve
/// concurrent refreshes.
#[derive(Debug, Clone)]
pub struct FeedParser {
    date_format: String,
}

impl Default for FeedParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedParser {
    pub fn new() -> Self {
        Self {
            date_format: rss_utils::time::DEFAULT_DISPLAY_FORMAT.to_string(),
        }
    }

    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = format.into();
        self
    }

    /// Normalize a payload for `source_id`. Individual items never fail; only a
    /// payload that cannot be read at all (or reports failure) does.
    pub fn normalize(&self, source_id: &str, payload: &str) -> Result<Vec<Article>> {
        debug!("Normalizing payload for {} ({} bytes)", source_id, payload.len());

        let trimmed = payload.trim_start();
        if trimmed.is_empty() {
            return Err(AggregatorError::Parse("Empty payload".to_string()));
        }

        if trimmed.starts_with('{') {
            self.normalize_envelope(source_id, trimmed)
        } else {
            self.normalize_document(source_id, trimmed)
        }
    }

    fn normalize_envelope(&self, source_id: &str, payload: &str) -> Result<Vec<Article>> {
        let envelope: ConverterEnvelope = serde_json::from_str(payload)
            .map_err(|e| AggregatorError::Parse(format!("Invalid converter response: {}", e)))?;

        match envelope.status.as_deref() {
            Some("ok") => {}
            status => {
                return Err(AggregatorError::Parse(format!(
                    "Converter reported status {:?}: {}",
                    status.unwrap_or("missing"),
                    envelope.message.as_deref().unwrap_or("no message")
                )));
            }
        }

        let label = non_empty(envelope.feed.get("title"))
            .unwrap_or_else(|| rss_utils::url::fallback_label(source_id));

        let items = match envelope.items {
            Value::Array(items) => items,
            _ => Vec::new(),
        };

        Ok(items
            .iter()
            .map(|item| self.article_from_json(source_id, &label, item))
            .collect())
    }

    fn article_from_json(&self, source_id: &str, label: &str, item: &Value) -> Article {
        let field = |name: &str| non_empty(item.get(name));

        let description = field("description").unwrap_or_default();
        let content = field("content")
            .or_else(|| field("contentSnippet"))
            .unwrap_or_else(|| description.clone());
        let published_at = field("pubDate")
            .or_else(|| field("published"))
            .map(|raw| rss_utils::time::format_date(&raw, &self.date_format))
            .unwrap_or_default();

        Article {
            title: field("title").unwrap_or_else(|| UNTITLED.to_string()),
            description,
            content,
            source_label: label.to_string(),
            published_at,
            link: field("link").unwrap_or_default(),
            origin_source: Some(source_id.to_string()),
        }
    }

    fn normalize_document(&self, source_id: &str, payload: &str) -> Result<Vec<Article>> {
        let feed = parser::parse(payload.as_bytes())
            .map_err(|e| AggregatorError::Parse(format!("Failed to parse feed: {}", e)))?;

        let label = feed
            .title
            .map(|t| t.content.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| rss_utils::url::fallback_label(source_id));

        let articles: Vec<Article> = feed
            .entries
            .into_iter()
            .map(|entry| {
                let description = entry.summary.map(|s| s.content).unwrap_or_default();
                let content = entry
                    .content
                    .and_then(|c| c.body)
                    .filter(|body| !body.trim().is_empty())
                    .unwrap_or_else(|| description.clone());

                Article {
                    title: entry
                        .title
                        .map(|t| t.content.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .unwrap_or_else(|| UNTITLED.to_string()),
                    description,
                    content,
                    source_label: label.clone(),
                    published_at: entry
                        .published
                        .or(entry.updated)
                        .map(|dt| dt.format(&self.date_format).to_string())
                        .unwrap_or_default(),
                    link: entry.links.first().map(|l| l.href.clone()).unwrap_or_default(),
                    origin_source: Some(source_id.to_string()),
                }
            })
            .collect();

        debug!("Parsed feed document with {} entries", articles.len());
        Ok(articles)
    }
}

/// String value of a JSON field, treating non-strings and blanks as absent.
fn non_empty(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
