use crate::rss_utils;
use crate::types::{AccountSession, AggregatorError, FeedSource, FeedStore, Result};
use tracing::{debug, info, warn};

/// Ordered, case-insensitively unique set of feed sources for one account.
///
/// Mutations are write-through: the store must confirm before the in-memory
/// list changes, so a failed call leaves the registry exactly as it was.
#[derive(Debug, Clone, Default)]
pub struct FeedRegistry {
    sources: Vec<FeedSource>,
}

impl FeedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from persisted addresses, keeping the first spelling of duplicates.
    pub fn from_addresses<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut registry = Self::new();
        for address in addresses {
            let address = address.as_ref().trim();
            if address.is_empty() {
                continue;
            }
            if registry.get(address).is_some() {
                debug!("Skipping duplicate persisted feed: {}", address);
                continue;
            }
            registry.sources.push(FeedSource::new(address));
        }
        registry
    }

    pub async fn load(store: &dyn FeedStore, session: &AccountSession) -> Result<Self> {
        let addresses = store
            .list_feeds(session)
            .await
            .map_err(|e| AggregatorError::Persistence(format!("{:#}", e)))?;

        let registry = Self::from_addresses(addresses);
        info!("Loaded {} feeds", registry.len());
        Ok(registry)
    }

    /// Check that `address` could be added, returning its trimmed form.
    pub fn validate(&self, address: &str) -> Result<String> {
        let address = address.trim();

        if !rss_utils::url::is_valid_rss_url(address) {
            return Err(AggregatorError::InvalidUrl {
                url: address.to_string(),
            });
        }

        if self.get(address).is_some() {
            return Err(AggregatorError::DuplicateFeed {
                url: address.to_string(),
            });
        }

        Ok(address.to_string())
    }

    pub async fn add(
        &mut self,
        store: &dyn FeedStore,
        session: &AccountSession,
        address: &str,
    ) -> Result<FeedSource> {
        let address = self.validate(address)?;

        store.add_feed(session, &address).await.map_err(|e| {
            warn!("Store rejected feed {}: {:#}", address, e);
            AggregatorError::Persistence(format!("{:#}", e))
        })?;

        let source = FeedSource::new(address);
        self.sources.push(source.clone());

        info!("Added feed: {} ({})", source.id, source.display_name);
        Ok(source)
    }

    /// Remove the source matching `address`. Returns `None` when nothing matched,
    /// in which case the store is not contacted.
    pub async fn remove(
        &mut self,
        store: &dyn FeedStore,
        session: &AccountSession,
        address: &str,
    ) -> Result<Option<FeedSource>> {
        let Some(index) = self.sources.iter().position(|s| s.matches(address)) else {
            debug!("Remove requested for unknown feed: {}", address);
            return Ok(None);
        };

        let id = self.sources[index].id.clone();
        store.remove_feed(session, &id).await.map_err(|e| {
            warn!("Store rejected removal of {}: {:#}", id, e);
            AggregatorError::Persistence(format!("{:#}", e))
        })?;

        let removed = self.sources.remove(index);
        info!("Removed feed: {}", removed.id);
        Ok(Some(removed))
    }

    pub fn get(&self, address: &str) -> Option<&FeedSource> {
        self.sources.iter().find(|s| s.matches(address))
    }

    /// Registry index of the source with exactly this id.
    pub fn position(&self, source_id: &str) -> Option<usize> {
        self.sources.iter().position(|s| s.id == source_id)
    }

    pub fn sources(&self) -> &[FeedSource] {
        &self.sources
    }

    pub fn list(&self) -> Vec<FeedSource> {
        self.sources.clone()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
