use crate::types::{AccountSession, FeedStore};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Serialize)]
struct FeedBody<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct FeedListResponse {
    success: bool,
    #[serde(default)]
    feeds: Vec<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Client for the account feed REST endpoints (`{base}/rss-feeds`).
pub struct HttpFeedStore {
    client: Client,
    base_url: String,
}

impl HttpFeedStore {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/rss-feeds", self.base_url)
    }

    async fn send(&self, request: RequestBuilder, session: &AccountSession, action: &str) -> Result<reqwest::Response> {
        let response = request
            .bearer_auth(&session.token)
            .send()
            .await
            .with_context(|| format!("Failed to {} feeds", action))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unknown error"));
            bail!("Feed service returned error on {}: {} - {}", action, status, error_text);
        }
        Ok(response)
    }
}

#[async_trait]
impl FeedStore for HttpFeedStore {
    async fn list_feeds(&self, session: &AccountSession) -> Result<Vec<String>> {
        let response = self
            .send(self.client.get(self.endpoint()), session, "list")
            .await?;

        let body = response
            .json::<FeedListResponse>()
            .await
            .context("Failed to parse feed list response")?;
        if !body.success {
            bail!(
                "Feed service rejected list: {}",
                body.message.as_deref().unwrap_or("no message")
            );
        }
        debug!("Feed service returned {} feeds", body.feeds.len());
        Ok(body.feeds)
    }

    async fn add_feed(&self, session: &AccountSession, address: &str) -> Result<()> {
        let request = self.client.post(self.endpoint()).json(&FeedBody { url: address });
        self.send(request, session, "add").await?;
        Ok(())
    }

    async fn remove_feed(&self, session: &AccountSession, address: &str) -> Result<()> {
        let request = self.client.delete(self.endpoint()).json(&FeedBody { url: address });
        self.send(request, session, "remove").await?;
        Ok(())
    }
}

/// Local feed persistence in SQLite, one row per (account, feed).
///
/// The account key is the session token itself; it is stored, never parsed.
pub struct SqliteFeedStore {
    db: SqlitePool,
}

impl SqliteFeedStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let mut options = SqlitePoolOptions::new().max_connections(5);
        if database_url.contains(":memory:") {
            // In-memory databases live and die with their one connection
            options = options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let db = options
            .connect(database_url)
            .await
            .with_context(|| format!("Failed to open feed database {}", database_url))?;

        let store = Self { db };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_rss_feeds (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account TEXT NOT NULL,
                feed_url TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (account, feed_url)
            )
            "#,
        )
        .execute(&self.db)
        .await
        .context("Failed to create user_rss_feeds table")?;

        Ok(())
    }
}

#[async_trait]
impl FeedStore for SqliteFeedStore {
    async fn list_feeds(&self, session: &AccountSession) -> Result<Vec<String>> {
        let feeds = sqlx::query_scalar::<_, String>(
            "SELECT feed_url FROM user_rss_feeds WHERE account = ? ORDER BY id",
        )
        .bind(&session.token)
        .fetch_all(&self.db)
        .await
        .context("Failed to list feeds")?;

        Ok(feeds)
    }

    async fn add_feed(&self, session: &AccountSession, address: &str) -> Result<()> {
        sqlx::query("INSERT INTO user_rss_feeds (account, feed_url, created_at) VALUES (?, ?, ?)")
            .bind(&session.token)
            .bind(address)
            .bind(Utc::now())
            .execute(&self.db)
            .await
            .with_context(|| format!("Failed to store feed {}", address))?;

        info!("Stored feed: {}", address);
        Ok(())
    }

    async fn remove_feed(&self, session: &AccountSession, address: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM user_rss_feeds WHERE account = ? AND feed_url = ?")
            .bind(&session.token)
            .bind(address)
            .execute(&self.db)
            .await
            .with_context(|| format!("Failed to delete feed {}", address))?;

        debug!("Deleted {} rows for {}", result.rows_affected(), address);
        Ok(())
    }
}
