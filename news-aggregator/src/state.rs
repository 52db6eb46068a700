use crate::demo;
use crate::types::{AggregateState, Article, FeedSource, Mode};
use tracing::{debug, info};

/// What a registry change did to the display mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    DemoToLive,
    LiveToLive,
    LiveToDemo,
}

impl Transition {
    /// Whether the new mode needs a full refresh to populate it.
    pub fn needs_refresh(self) -> bool {
        matches!(self, Transition::DemoToLive | Transition::LiveToLive)
    }
}

/// Demo/Live mode plus the visible article list.
///
/// Demo holds only untagged sample articles; Live holds only articles tagged
/// with a registered source. Nothing ever mixes the two.
#[derive(Debug, Clone)]
pub struct AggregationState {
    mode: Mode,
    articles: Vec<Article>,
}

impl AggregationState {
    pub fn demo() -> Self {
        Self {
            mode: Mode::Demo,
            articles: demo::sample_articles(),
        }
    }

    /// Live with nothing fetched yet.
    pub fn live() -> Self {
        Self {
            mode: Mode::Live,
            articles: Vec::new(),
        }
    }

    /// Initial state for a freshly loaded registry.
    pub fn for_registry(registry_empty: bool) -> Self {
        if registry_empty {
            Self::demo()
        } else {
            Self::live()
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn articles(&self) -> &[Article] {
        &self.articles
    }

    pub fn snapshot(&self) -> AggregateState {
        AggregateState {
            mode: self.mode,
            articles: self.articles.clone(),
        }
    }

    /// A source was added. Leaving Demo drops the sample articles.
    pub fn source_added(&mut self) -> Transition {
        match self.mode {
            Mode::Demo => {
                self.articles.clear();
                self.mode = Mode::Live;
                info!("Switched to live mode");
                Transition::DemoToLive
            }
            Mode::Live => Transition::LiveToLive,
        }
    }

    /// A source was removed; purge its articles, or fall back to samples once
    /// the registry is empty.
    pub fn source_removed(&mut self, source_id: &str, registry_empty: bool) -> Transition {
        if registry_empty {
            self.mode = Mode::Demo;
            self.articles = demo::sample_articles();
            info!("Last feed removed, switched to demo mode");
            return Transition::LiveToDemo;
        }

        let before = self.articles.len();
        self.articles.retain(|a| !a.is_from(source_id));
        debug!("Purged {} articles of {}", before - self.articles.len(), source_id);

        self.mode = Mode::Live;
        Transition::LiveToLive
    }

    /// Replace everything with a full refresh result. Ignored in Demo mode.
    pub fn replace_all(&mut self, articles: Vec<Article>) -> bool {
        if self.mode != Mode::Live {
            debug!("Ignoring refresh result while in demo mode");
            return false;
        }
        self.articles = articles;
        true
    }

    /// Swap the articles tagged with `source_id` for `fresh`, leaving all other
    /// articles in place. The fresh subset lands where the source sits in
    /// registry order, so output stays grouped like a full refresh.
    pub fn replace_source(&mut self, source_id: &str, fresh: Vec<Article>, sources: &[FeedSource]) -> bool {
        if self.mode != Mode::Live {
            debug!("Ignoring refresh result for {} while in demo mode", source_id);
            return false;
        }

        let rank = |id: Option<&str>| {
            id.and_then(|id| sources.iter().position(|s| s.id == id))
                .unwrap_or(usize::MAX)
        };
        let own_rank = rank(Some(source_id));

        self.articles.retain(|a| !a.is_from(source_id));
        let insert_at = self
            .articles
            .iter()
            .position(|a| rank(a.origin_source.as_deref()) > own_rank)
            .unwrap_or(self.articles.len());

        let tail = self.articles.split_off(insert_at);
        self.articles.extend(fresh);
        self.articles.extend(tail);
        true
    }
}
