pub mod types;
pub mod rss_utils;
pub mod parser;
pub mod registry;
pub mod demo;
pub mod state;
pub mod refresh;
pub mod query;
pub mod fetcher;
pub mod store;
pub mod aggregator;

pub use types::*;
pub use parser::FeedParser;
pub use registry::FeedRegistry;
pub use state::{AggregationState, Transition};
pub use refresh::RefreshOrchestrator;
pub use fetcher::Fetcher;
pub use store::{HttpFeedStore, SqliteFeedStore};
pub use aggregator::NewsAggregator;
