use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of the signed-in account, handed to the engine by whatever owns
/// authentication. The token is opaque: it is forwarded on persistence calls
/// and never inspected.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSession {
    pub token: String,
}

impl AccountSession {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

impl fmt::Debug for AccountSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountSession").field("token", &"***").finish()
    }
}

/// Per-account persistence of configured feed addresses.
///
/// `list_feeds` returns addresses in the order they were added. Any `Err` is a
/// rejection; there is no partial success.
#[async_trait]
pub trait FeedStore: Send + Sync {
    async fn list_feeds(&self, session: &AccountSession) -> Result<Vec<String>>;

    async fn add_feed(&self, session: &AccountSession, address: &str) -> Result<()>;

    async fn remove_feed(&self, session: &AccountSession, address: &str) -> Result<()>;
}

/// Retrieves the raw payload for one feed address.
///
/// The payload is either the feed document itself or a conversion service's
/// JSON envelope; interpreting it is the caller's job. Calls may run
/// concurrently during a refresh.
#[async_trait]
pub trait SyndicationService: Send + Sync {
    async fn retrieve(&self, address: &str) -> Result<String>;
}

