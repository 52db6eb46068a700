pub mod defs;

pub use defs::{AccountSession, FeedStore, SyndicationService};
