use async_trait::async_trait;
use news_aggregator::{
    demo::sample_articles, AccountSession, AggregatorError, FeedParser, FeedStore, Mode, NewsAggregator,
    RefreshConfig, SyndicationService,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::info;

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .try_init()
            .ok();
    });
}

const FEED_A: &str = "https://a.example.com/feed";
const FEED_B: &str = "https://b.example.com/rss";

#[derive(Clone)]
enum Reply {
    Payload(String),
    Slow(u64, String),
    Fail(&'static str),
    Hang,
}

#[derive(Default)]
struct ScriptedSyndication {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedSyndication {
    fn reply(&self, address: &str, reply: Reply) {
        self.replies.lock().unwrap().insert(address.to_string(), reply);
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl SyndicationService for ScriptedSyndication {
    async fn retrieve(&self, address: &str) -> anyhow::Result<String> {
        self.calls.lock().unwrap().push(address.to_string());
        let reply = self.replies.lock().unwrap().get(address).cloned();

        match reply {
            Some(Reply::Payload(payload)) => Ok(payload),
            Some(Reply::Slow(ms, payload)) => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(payload)
            }
            Some(Reply::Fail(msg)) => anyhow::bail!("{}", msg),
            Some(Reply::Hang) => std::future::pending().await,
            None => anyhow::bail!("no route to {}", address),
        }
    }
}

#[derive(Default)]
struct MemoryStore {
    feeds: Mutex<HashMap<String, Vec<String>>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    hold_writes: AtomicBool,
    write_started: Notify,
    write_released: Notify,
}

impl MemoryStore {
    fn with_feeds(token: &str, feeds: &[&str]) -> Self {
        let store = Self::default();
        store
            .feeds
            .lock()
            .unwrap()
            .insert(token.to_string(), feeds.iter().map(|f| f.to_string()).collect());
        store
    }

    fn stored(&self, token: &str) -> Vec<String> {
        self.feeds.lock().unwrap().get(token).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl FeedStore for MemoryStore {
    async fn list_feeds(&self, session: &AccountSession) -> anyhow::Result<Vec<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            anyhow::bail!("HTTP 503");
        }
        Ok(self.stored(&session.token))
    }

    async fn add_feed(&self, session: &AccountSession, address: &str) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("HTTP 500");
        }
        if self.hold_writes.load(Ordering::SeqCst) {
            self.write_started.notify_one();
            self.write_released.notified().await;
        }
        self.feeds
            .lock()
            .unwrap()
            .entry(session.token.clone())
            .or_default()
            .push(address.to_string());
        Ok(())
    }

    async fn remove_feed(&self, session: &AccountSession, address: &str) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("HTTP 500");
        }
        if let Some(feeds) = self.feeds.lock().unwrap().get_mut(&session.token) {
            feeds.retain(|f| f != address);
        }
        Ok(())
    }
}

fn payload(feed_title: &str, titles: &[&str]) -> String {
    let items: Vec<_> = titles
        .iter()
        .map(|title| {
            json!({
                "title": title,
                "description": format!("<p>{} body</p>", title),
                "pubDate": "2024-11-25 10:00:00",
                "link": format!("https://example.com/{}", title),
            })
        })
        .collect();

    json!({ "status": "ok", "feed": { "title": feed_title }, "items": items }).to_string()
}

async fn open_for(
    token: &str,
    store: &Arc<MemoryStore>,
    syndication: &Arc<ScriptedSyndication>,
    timeout_seconds: u64,
) -> NewsAggregator {
    init_tracing();
    NewsAggregator::open_with(
        AccountSession::new(token),
        store.clone(),
        syndication.clone(),
        FeedParser::new(),
        RefreshConfig {
            source_timeout_seconds: timeout_seconds,
        },
    )
    .await
}

async fn open(store: &Arc<MemoryStore>, syndication: &Arc<ScriptedSyndication>) -> NewsAggregator {
    open_for("alice", store, syndication, 1).await
}

#[tokio::test]
async fn test_empty_registry_starts_in_demo() {
    let store = Arc::new(MemoryStore::default());
    let syndication = Arc::new(ScriptedSyndication::default());
    let aggregator = open(&store, &syndication).await;

    let state = aggregator.aggregate_state();
    assert_eq!(state.mode, Mode::Demo);
    assert_eq!(state.articles, sample_articles());
    assert_eq!(state.articles.len(), 2);
    assert_eq!(syndication.call_count(), 0, "demo view must not touch the network");
}

#[tokio::test]
async fn test_first_add_goes_live_with_tagged_articles() {
    let store = Arc::new(MemoryStore::default());
    let syndication = Arc::new(ScriptedSyndication::default());
    syndication.reply(FEED_A, Reply::Payload(payload("A News", &["one", "two", "three"])));
    let aggregator = open(&store, &syndication).await;

    let source = aggregator.add_feed(FEED_A).await.unwrap();
    assert_eq!(source.display_name, "a.example.com");

    let state = aggregator.aggregate_state();
    assert_eq!(state.mode, Mode::Live);
    assert_eq!(state.articles.len(), 3);
    assert!(state.articles.iter().all(|a| a.origin_source.as_deref() == Some(FEED_A)));
    assert!(state.articles.iter().all(|a| a.source_label == "A News"));
    assert_eq!(store.stored("alice"), vec![FEED_A]);
}

#[tokio::test]
async fn test_failed_source_is_isolated() {
    let store = Arc::new(MemoryStore::with_feeds("alice", &[FEED_A, FEED_B]));
    let syndication = Arc::new(ScriptedSyndication::default());
    syndication.reply(FEED_A, Reply::Payload(payload("A News", &["a1", "a2"])));
    syndication.reply(FEED_B, Reply::Fail("connection refused"));
    let aggregator = open(&store, &syndication).await;

    let articles = aggregator.refresh_all().await.unwrap();
    assert_eq!(articles.len(), 2);
    assert!(articles.iter().all(|a| a.origin_source.as_deref() == Some(FEED_A)));
    assert_eq!(aggregator.aggregate_state().articles, articles);
}

#[tokio::test]
async fn test_unparsable_and_timed_out_sources_contribute_nothing() {
    let store = Arc::new(MemoryStore::with_feeds("alice", &[FEED_A, FEED_B]));
    let syndication = Arc::new(ScriptedSyndication::default());
    syndication.reply(FEED_A, Reply::Hang);
    syndication.reply(FEED_B, Reply::Payload("<html>not a feed</html>".to_string()));

    let aggregator = open(&store, &syndication).await;

    let state = aggregator.aggregate_state();
    assert_eq!(state.mode, Mode::Live, "all sources failing keeps live mode");
    assert!(state.articles.is_empty());
}

#[tokio::test]
async fn test_merge_follows_registry_order_not_completion_order() {
    let store = Arc::new(MemoryStore::with_feeds("alice", &[FEED_A, FEED_B]));
    let syndication = Arc::new(ScriptedSyndication::default());
    syndication.reply(FEED_A, Reply::Slow(200, payload("A", &["a1", "a2"])));
    syndication.reply(FEED_B, Reply::Payload(payload("B", &["b1"])));
    let aggregator = open(&store, &syndication).await;

    let titles: Vec<_> = aggregator
        .aggregate_state()
        .articles
        .iter()
        .map(|a| a.title.clone())
        .collect();
    assert_eq!(titles, ["a1", "a2", "b1"]);
}

#[tokio::test]
async fn test_case_insensitive_duplicate_is_rejected() {
    let store = Arc::new(MemoryStore::default());
    let syndication = Arc::new(ScriptedSyndication::default());
    syndication.reply(FEED_A, Reply::Payload(payload("A", &["a1"])));
    let aggregator = open(&store, &syndication).await;

    aggregator.add_feed(FEED_A).await.unwrap();
    let err = aggregator
        .add_feed(&FEED_A.to_uppercase().replace("HTTPS", "https"))
        .await
        .unwrap_err();

    assert!(matches!(err, AggregatorError::DuplicateFeed { .. }));
    assert_eq!(aggregator.feeds().len(), 1);
    assert_eq!(store.stored("alice").len(), 1);
}

#[tokio::test]
async fn test_invalid_address_is_validation_failure() {
    let store = Arc::new(MemoryStore::default());
    let syndication = Arc::new(ScriptedSyndication::default());
    let aggregator = open(&store, &syndication).await;

    let err = aggregator.add_feed("feeds dot example").await.unwrap_err();
    assert!(err.is_validation());
    assert_eq!(aggregator.aggregate_state().mode, Mode::Demo);
    assert!(store.stored("alice").is_empty());
}

#[tokio::test]
async fn test_persistence_failure_changes_nothing() {
    let store = Arc::new(MemoryStore::default());
    let syndication = Arc::new(ScriptedSyndication::default());
    syndication.reply(FEED_A, Reply::Payload(payload("A", &["a1"])));
    let aggregator = open(&store, &syndication).await;

    store.fail_writes.store(true, Ordering::SeqCst);
    let err = aggregator.add_feed(FEED_A).await.unwrap_err();
    assert!(matches!(err, AggregatorError::Persistence(_)));
    assert!(aggregator.feeds().is_empty());
    assert_eq!(aggregator.aggregate_state().mode, Mode::Demo);
    assert_eq!(aggregator.aggregate_state().articles, sample_articles());

    store.fail_writes.store(false, Ordering::SeqCst);
    aggregator.add_feed(FEED_A).await.unwrap();
    store.fail_writes.store(true, Ordering::SeqCst);

    let err = aggregator.remove_feed(FEED_A).await.unwrap_err();
    assert!(matches!(err, AggregatorError::Persistence(_)));
    assert_eq!(aggregator.feeds().len(), 1);
    assert_eq!(aggregator.aggregate_state().mode, Mode::Live);
    assert_eq!(aggregator.aggregate_state().articles.len(), 1);
}

#[tokio::test]
async fn test_mode_tracks_registry_through_adds_and_removes() {
    let store = Arc::new(MemoryStore::default());
    let syndication = Arc::new(ScriptedSyndication::default());
    syndication.reply(FEED_A, Reply::Payload(payload("A", &["a1"])));
    syndication.reply(FEED_B, Reply::Payload(payload("B", &["b1", "b2"])));
    let aggregator = open(&store, &syndication).await;

    aggregator.add_feed(FEED_A).await.unwrap();
    assert_eq!(aggregator.aggregate_state().mode, Mode::Live);

    aggregator.add_feed(FEED_B).await.unwrap();
    let state = aggregator.aggregate_state();
    assert_eq!(state.mode, Mode::Live);
    assert_eq!(state.articles.len(), 3);

    aggregator.remove_feed(FEED_A).await.unwrap();
    let state = aggregator.aggregate_state();
    assert_eq!(state.mode, Mode::Live);
    assert_eq!(state.articles.len(), 2);
    assert!(state.articles.iter().all(|a| a.origin_source.as_deref() == Some(FEED_B)));

    aggregator.remove_feed(FEED_B).await.unwrap();
    let state = aggregator.aggregate_state();
    assert_eq!(state.mode, Mode::Demo);
    assert_eq!(state.articles, sample_articles());
    assert!(aggregator.feeds().is_empty());
}

#[tokio::test]
async fn test_removing_unknown_feed_is_noop() {
    let store = Arc::new(MemoryStore::with_feeds("alice", &[FEED_A]));
    let syndication = Arc::new(ScriptedSyndication::default());
    syndication.reply(FEED_A, Reply::Payload(payload("A", &["a1"])));
    let aggregator = open(&store, &syndication).await;

    aggregator.remove_feed(FEED_B).await.unwrap();
    assert_eq!(aggregator.feeds().len(), 1);
    assert_eq!(aggregator.aggregate_state().articles.len(), 1);
}

#[tokio::test]
async fn test_refresh_one_replaces_only_its_own_articles() {
    let store = Arc::new(MemoryStore::with_feeds("alice", &[FEED_A, FEED_B]));
    let syndication = Arc::new(ScriptedSyndication::default());
    syndication.reply(FEED_A, Reply::Payload(payload("A", &["a1", "a2"])));
    syndication.reply(FEED_B, Reply::Payload(payload("B", &["b1"])));
    let aggregator = open(&store, &syndication).await;

    let before = aggregator.aggregate_state();
    let a_before: Vec<_> = before.articles.iter().filter(|a| a.origin_source.as_deref() == Some(FEED_A)).cloned().collect();

    syndication.reply(FEED_A, Reply::Payload(payload("A", &["changed upstream"])));
    syndication.reply(FEED_B, Reply::Payload(payload("B", &["b2", "b3"])));
    let count = aggregator.refresh_one(FEED_B).await.unwrap();
    assert_eq!(count, 2);

    let after = aggregator.aggregate_state();
    let a_after: Vec<_> = after.articles.iter().filter(|a| a.origin_source.as_deref() == Some(FEED_A)).cloned().collect();
    assert_eq!(a_before, a_after);

    let titles: Vec<_> = after.articles.iter().map(|a| a.title.as_str()).collect();
    assert_eq!(titles, ["a1", "a2", "b2", "b3"]);
}

#[tokio::test]
async fn test_refresh_one_failure_is_reported_and_changes_nothing() {
    let store = Arc::new(MemoryStore::with_feeds("alice", &[FEED_A, FEED_B]));
    let syndication = Arc::new(ScriptedSyndication::default());
    syndication.reply(FEED_A, Reply::Payload(payload("A", &["a1"])));
    syndication.reply(FEED_B, Reply::Payload(payload("B", &["b1"])));
    let aggregator = open(&store, &syndication).await;
    let before = aggregator.aggregate_state();

    syndication.reply(FEED_B, Reply::Payload(json!({ "status": "error" }).to_string()));
    let err = aggregator.refresh_one(FEED_B).await.unwrap_err();
    match err {
        AggregatorError::Refresh { source_id, reason } => {
            assert_eq!(source_id, FEED_B);
            assert!(matches!(*reason, AggregatorError::Parse(_)));
        }
        other => panic!("expected refresh failure, got {:?}", other),
    }
    assert_eq!(aggregator.aggregate_state(), before);

    let err = aggregator.refresh_one("https://unknown.example/rss").await.unwrap_err();
    assert!(matches!(
        err,
        AggregatorError::Refresh { ref reason, .. } if matches!(**reason, AggregatorError::FeedNotFound { .. })
    ));
    assert_eq!(aggregator.aggregate_state(), before);
}

#[tokio::test]
async fn test_search_is_a_pure_projection() {
    let store = Arc::new(MemoryStore::default());
    let syndication = Arc::new(ScriptedSyndication::default());
    let aggregator = open(&store, &syndication).await;

    let before = aggregator.aggregate_state();
    let first = aggregator.search("malware");
    let second = aggregator.search("malware");

    assert_eq!(first.len(), 1);
    assert!(first[0].title.contains("Malware"));
    assert_eq!(first, second);
    assert_eq!(aggregator.aggregate_state(), before);
    assert_eq!(aggregator.search("  "), before.articles);
}

#[tokio::test]
async fn test_persisted_feeds_load_live_on_open() {
    let store = Arc::new(MemoryStore::with_feeds("alice", &[FEED_A]));
    let syndication = Arc::new(ScriptedSyndication::default());
    syndication.reply(FEED_A, Reply::Payload(payload("A", &["a1", "a2"])));
    let aggregator = open(&store, &syndication).await;

    let state = aggregator.aggregate_state();
    assert_eq!(state.mode, Mode::Live);
    assert_eq!(state.articles.len(), 2);
    assert_eq!(aggregator.feeds()[0].id, FEED_A);
}

#[tokio::test]
async fn test_registry_load_failure_falls_back_to_demo() {
    let store = Arc::new(MemoryStore::with_feeds("alice", &[FEED_A]));
    store.fail_reads.store(true, Ordering::SeqCst);
    let syndication = Arc::new(ScriptedSyndication::default());
    let aggregator = open(&store, &syndication).await;

    assert_eq!(aggregator.aggregate_state().mode, Mode::Demo);
    assert!(aggregator.feeds().is_empty());
}

#[tokio::test]
async fn test_concurrent_adds_are_serialized() {
    let store = Arc::new(MemoryStore::default());
    let syndication = Arc::new(ScriptedSyndication::default());
    syndication.reply(FEED_A, Reply::Slow(50, payload("A", &["a1"])));
    syndication.reply(FEED_B, Reply::Payload(payload("B", &["b1"])));
    let aggregator = open(&store, &syndication).await;

    let (a, b) = tokio::join!(aggregator.add_feed(FEED_A), aggregator.add_feed(FEED_B));
    a.unwrap();
    b.unwrap();

    let state = aggregator.aggregate_state();
    assert_eq!(state.mode, Mode::Live);
    let titles: Vec<_> = state.articles.iter().map(|a| a.title.as_str()).collect();
    assert_eq!(titles, ["a1", "b1"]);
}

#[tokio::test]
async fn test_session_switch_discards_in_flight_refresh() {
    let store = Arc::new(MemoryStore::with_feeds("alice", &[FEED_A]));
    let syndication = Arc::new(ScriptedSyndication::default());
    syndication.reply(FEED_A, Reply::Payload(payload("A", &["a1"])));
    let aggregator = open_for("alice", &store, &syndication, 30).await;
    assert_eq!(aggregator.aggregate_state().articles.len(), 1);

    syndication.reply(FEED_A, Reply::Hang);
    let (refresh, ()) = tokio::join!(aggregator.refresh_all(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        info!("Switching to bob while alice's refresh is pending");
        aggregator.switch_session(AccountSession::new("bob")).await;
    });

    assert!(matches!(refresh, Err(AggregatorError::SessionChanged)));
    let state = aggregator.aggregate_state();
    assert_eq!(state.mode, Mode::Demo);
    assert_eq!(state.articles, sample_articles());
    assert!(aggregator.feeds().is_empty());
}

#[tokio::test]
async fn test_add_finishing_after_session_switch_is_not_published() {
    let store = Arc::new(MemoryStore::default());
    let syndication = Arc::new(ScriptedSyndication::default());
    syndication.reply(FEED_A, Reply::Payload(payload("A", &["a1"])));
    let aggregator = open(&store, &syndication).await;
    let mut updates = aggregator.subscribe();
    updates.borrow_and_update();

    store.hold_writes.store(true, Ordering::SeqCst);
    let (added, ()) = tokio::join!(aggregator.add_feed(FEED_A), async {
        store.write_started.notified().await;
        // The switch bumps the session, then gives up waiting behind the pending add
        let switch = aggregator.switch_session(AccountSession::new("bob"));
        assert!(tokio::time::timeout(Duration::from_millis(20), switch).await.is_err());
        store.write_released.notify_one();
    });

    assert_eq!(added.unwrap().id, FEED_A);
    assert!(!updates.has_changed().unwrap());
    assert_eq!(aggregator.aggregate_state().mode, Mode::Demo);
    assert_eq!(aggregator.aggregate_state().articles, sample_articles());
    assert!(aggregator.feeds().is_empty());
    assert_eq!(syndication.call_count(), 0);
}

#[tokio::test]
async fn test_subscribers_see_published_states() {
    let store = Arc::new(MemoryStore::default());
    let syndication = Arc::new(ScriptedSyndication::default());
    syndication.reply(FEED_A, Reply::Payload(payload("A", &["a1"])));
    let aggregator = open(&store, &syndication).await;

    let mut updates = aggregator.subscribe();
    assert_eq!(updates.borrow_and_update().mode, Mode::Demo);

    aggregator.add_feed(FEED_A).await.unwrap();
    assert!(updates.has_changed().unwrap());
    let latest = updates.borrow_and_update().clone();
    assert_eq!(latest.mode, Mode::Live);
    assert_eq!(latest.articles.len(), 1);
}
