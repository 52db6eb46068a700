use crate::parser::FeedParser;
use crate::query;
use crate::refresh::RefreshOrchestrator;
use crate::registry::FeedRegistry;
use crate::state::AggregationState;
use crate::types::{
    AccountSession, AggregateState, AggregatorError, Article, FeedSource, FeedStore, RefreshConfig, Result,
    SyndicationService,
};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything owned by one signed-in account's view.
struct SessionContext {
    id: Uuid,
    session: AccountSession,
    epoch: u64,
    registry: FeedRegistry,
    state: AggregationState,
}

/// The news engine for one display context.
///
/// Mutating operations queue on an async mutex, so they never interleave.
/// Reads come from the last published snapshot and never wait on a refresh.
pub struct NewsAggregator {
    store: Arc<dyn FeedStore>,
    orchestrator: RefreshOrchestrator,
    context: Mutex<SessionContext>,
    epoch: watch::Sender<u64>,
    state_tx: watch::Sender<AggregateState>,
    feeds_tx: watch::Sender<Vec<FeedSource>>,
}

impl NewsAggregator {
    pub async fn open(
        session: AccountSession,
        store: Arc<dyn FeedStore>,
        syndication: Arc<dyn SyndicationService>,
    ) -> Self {
        Self::open_with(session, store, syndication, FeedParser::new(), RefreshConfig::default()).await
    }

    /// Load the account's feeds and build the initial view: samples for an
    /// empty registry, otherwise Live followed by a full refresh.
    pub async fn open_with(
        session: AccountSession,
        store: Arc<dyn FeedStore>,
        syndication: Arc<dyn SyndicationService>,
        parser: FeedParser,
        refresh_config: RefreshConfig,
    ) -> Self {
        let context = Self::load_context(store.as_ref(), session, 0).await;
        let (epoch, _) = watch::channel(0);
        let (state_tx, _) = watch::channel(context.state.snapshot());
        let (feeds_tx, _) = watch::channel(context.registry.list());

        let aggregator = Self {
            store,
            orchestrator: RefreshOrchestrator::new(syndication, parser, refresh_config),
            context: Mutex::new(context),
            epoch,
            state_tx,
            feeds_tx,
        };

        {
            let mut ctx = aggregator.context.lock().await;
            if !ctx.registry.is_empty() {
                aggregator.refresh_locked(&mut ctx).await;
            }
        }

        aggregator
    }

    async fn load_context(store: &dyn FeedStore, session: AccountSession, epoch: u64) -> SessionContext {
        let id = Uuid::new_v4();
        let registry = match FeedRegistry::load(store, &session).await {
            Ok(registry) => registry,
            Err(e) => {
                warn!("Session {}: could not load feeds, starting in demo mode: {}", id, e);
                FeedRegistry::new()
            }
        };

        let state = AggregationState::for_registry(registry.is_empty());
        info!("Session {} opened with {} feeds ({:?} mode)", id, registry.len(), state.mode());

        SessionContext {
            id,
            session,
            epoch,
            registry,
            state,
        }
    }

    /// Replace the account this engine serves. Any refresh still in flight for
    /// the previous account is abandoned and its result discarded.
    pub async fn switch_session(&self, session: AccountSession) {
        let mut epoch = 0;
        self.epoch.send_modify(|current| {
            *current += 1;
            epoch = *current;
        });

        let mut ctx = self.context.lock().await;
        if *self.epoch.borrow() != epoch {
            debug!("Session switch superseded by a newer one");
            return;
        }

        *ctx = Self::load_context(self.store.as_ref(), session, epoch).await;
        self.publish(&ctx);

        if !ctx.registry.is_empty() {
            self.refresh_locked(&mut ctx).await;
        }
    }

    /// Validate, persist and register a new source, then repopulate the feed.
    /// Nothing is published if the session switched while the store was busy.
    pub async fn add_feed(&self, address: &str) -> Result<FeedSource> {
        let mut guard = self.context.lock().await;
        let ctx = &mut *guard;
        self.ensure_current(ctx)?;

        let source = ctx.registry.add(self.store.as_ref(), &ctx.session, address).await?;
        if self.ensure_current(ctx).is_err() {
            debug!("Session {}: switched while storing {}, not publishing", ctx.id, source.id);
            return Ok(source);
        }

        let transition = ctx.state.source_added();
        self.publish(ctx);

        if transition.needs_refresh() {
            self.refresh_locked(ctx).await;
        }
        Ok(source)
    }

    /// Unregister a source and drop its articles; the last removal restores
    /// the sample articles.
    pub async fn remove_feed(&self, address: &str) -> Result<()> {
        let mut guard = self.context.lock().await;
        let ctx = &mut *guard;
        self.ensure_current(ctx)?;

        let Some(removed) = ctx.registry.remove(self.store.as_ref(), &ctx.session, address).await? else {
            return Ok(());
        };
        if self.ensure_current(ctx).is_err() {
            debug!("Session {}: switched while removing {}, not publishing", ctx.id, removed.id);
            return Ok(());
        }

        ctx.state.source_removed(&removed.id, ctx.registry.is_empty());
        self.publish(ctx);
        Ok(())
    }

    /// Rebuild the whole article list from every registered source. Per-source
    /// failures only shrink the result. With no sources this is a no-op that
    /// returns the current articles.
    pub async fn refresh_all(&self) -> Result<Vec<Article>> {
        let mut guard = self.context.lock().await;
        let ctx = &mut *guard;
        self.ensure_current(ctx)?;

        if ctx.registry.is_empty() {
            return Ok(ctx.state.articles().to_vec());
        }

        self.refresh_locked(ctx)
            .await
            .ok_or(AggregatorError::SessionChanged)
    }

    /// Re-fetch one source and swap in its articles, returning how many it
    /// now contributes. Unlike `refresh_all`, failure is reported and leaves
    /// the current articles untouched.
    pub async fn refresh_one(&self, address: &str) -> Result<usize> {
        let mut guard = self.context.lock().await;
        let ctx = &mut *guard;
        self.ensure_current(ctx)?;

        let source = ctx.registry.get(address).cloned().ok_or_else(|| {
            AggregatorError::refresh(
                address,
                AggregatorError::FeedNotFound {
                    url: address.to_string(),
                },
            )
        })?;

        let mut epoch_rx = self.epoch.subscribe();
        let fresh = tokio::select! {
            result = self.orchestrator.fetch_source(&source) => {
                result.map_err(|e| AggregatorError::refresh(&source.id, e))?
            }
            _ = epoch_rx.changed() => return Err(AggregatorError::SessionChanged),
        };

        let count = fresh.len();
        ctx.state.replace_source(&source.id, fresh, ctx.registry.sources());
        self.publish(ctx);

        info!("Session {}: refreshed {} with {} articles", ctx.id, source.id, count);
        Ok(count)
    }

    /// Articles matching `query`; the stored state is never touched.
    pub fn search(&self, query: &str) -> Vec<Article> {
        let state = self.state_tx.borrow();
        query::filter(&state.articles, query).into_owned()
    }

    pub fn aggregate_state(&self) -> AggregateState {
        self.state_tx.borrow().clone()
    }

    pub fn feeds(&self) -> Vec<FeedSource> {
        self.feeds_tx.borrow().clone()
    }

    /// Receive every published state, for rendering layers that redraw on change.
    pub fn subscribe(&self) -> watch::Receiver<AggregateState> {
        self.state_tx.subscribe()
    }

    fn ensure_current(&self, ctx: &SessionContext) -> Result<()> {
        if *self.epoch.borrow() == ctx.epoch {
            Ok(())
        } else {
            Err(AggregatorError::SessionChanged)
        }
    }

    fn publish(&self, ctx: &SessionContext) {
        self.state_tx.send_replace(ctx.state.snapshot());
        self.feeds_tx.send_replace(ctx.registry.list());
    }

    /// Full refresh under the context lock. `None` when a session switch made
    /// the result stale; the state is then left alone.
    async fn refresh_locked(&self, ctx: &mut SessionContext) -> Option<Vec<Article>> {
        let mut epoch_rx = self.epoch.subscribe();
        if *epoch_rx.borrow_and_update() != ctx.epoch {
            return None;
        }

        let sources = ctx.registry.list();
        let merged = tokio::select! {
            merged = self.orchestrator.fetch_all(&sources) => merged,
            _ = epoch_rx.changed() => {
                info!("Session {}: discarding refresh after session change", ctx.id);
                return None;
            }
        };

        if merged.is_empty() {
            warn!("Session {}: no articles from {} feeds", ctx.id, sources.len());
        }

        ctx.state.replace_all(merged);
        self.publish(ctx);
        Some(ctx.state.articles().to_vec())
    }
}
