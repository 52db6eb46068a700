use clap::{Parser, Subcommand, ValueEnum};
use news_aggregator::rss_utils::feed::snippet;
use news_aggregator::{
    AccountSession, AggregateState, Article, FeedParser, FeedSource, FeedStore, FetchConfig, Fetcher,
    HttpFeedStore, NewsAggregator, RefreshConfig, RetrievalMode, SqliteFeedStore,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StoreKind {
    Http,
    Sqlite,
}

#[derive(Debug, Parser)]
#[command(name = "news-aggregator", about = "Merged, searchable news from your feeds")]
struct Cli {
    /// Account token forwarded to the feed store
    #[arg(long, env = "NEWS_AUTH_TOKEN", default_value = "local", hide_env_values = true)]
    token: String,

    #[arg(long, env = "NEWS_STORE", value_enum, default_value = "sqlite")]
    store: StoreKind,

    /// Base URL of the feed REST service
    #[arg(long, env = "NEWS_API_BASE", default_value = "http://127.0.0.1:5050/api")]
    api_base: String,

    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://news.db?mode=rwc")]
    database_url: String,

    /// rss2json-style converter endpoint; feeds are fetched directly when unset
    #[arg(long, env = "NEWS_CONVERTER_URL")]
    converter_url: Option<String>,

    #[arg(long, env = "NEWS_SOURCE_TIMEOUT_SECS", default_value_t = 20)]
    source_timeout: u64,

    /// strftime format for article dates
    #[arg(long, default_value = "%Y-%m-%d")]
    date_format: String,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the current article feed
    Show {
        /// Print a longer preview of each article's body
        #[arg(long)]
        full: bool,
    },
    /// List configured feeds
    Feeds,
    /// Add a feed and refresh
    Add { url: String },
    /// Remove a feed
    Remove { url: String },
    /// Refresh all feeds, or a single one
    Refresh {
        #[arg(long)]
        source: Option<String>,
    },
    /// Search the current articles
    Search { query: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("news_aggregator=info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let store: Arc<dyn FeedStore> = match cli.store {
        StoreKind::Http => {
            info!("Using feed service at {}", cli.api_base);
            Arc::new(HttpFeedStore::new(&cli.api_base)?)
        }
        StoreKind::Sqlite => {
            info!("Using feed database {}", cli.database_url);
            Arc::new(SqliteFeedStore::connect(&cli.database_url).await?)
        }
    };

    let fetch_config = FetchConfig {
        retrieval: match &cli.converter_url {
            Some(endpoint) => RetrievalMode::Converter {
                endpoint: endpoint.clone(),
            },
            None => RetrievalMode::Direct,
        },
        ..FetchConfig::default()
    };
    let fetcher = Arc::new(Fetcher::new(fetch_config)?);

    let aggregator = NewsAggregator::open_with(
        AccountSession::new(cli.token.clone()),
        store,
        fetcher,
        FeedParser::new().with_date_format(cli.date_format.clone()),
        RefreshConfig {
            source_timeout_seconds: cli.source_timeout,
        },
    )
    .await;

    match &cli.command {
        Command::Show { full } => {
            let detail = if *full { Detail::Full } else { Detail::Card };
            print_state(&aggregator.aggregate_state(), cli.json, detail)?
        }
        Command::Feeds => print_feeds(&aggregator.feeds(), cli.json)?,
        Command::Add { url } => {
            let source = aggregator.add_feed(url).await.map_err(|e| {
                error!("Failed to add feed {}: {}", url, e);
                e
            })?;
            info!("Added {} ({})", source.id, source.display_name);
            print_state(&aggregator.aggregate_state(), cli.json, Detail::Card)?;
        }
        Command::Remove { url } => {
            aggregator.remove_feed(url).await?;
            print_feeds(&aggregator.feeds(), cli.json)?;
        }
        Command::Refresh { source: Some(url) } => {
            let count = aggregator.refresh_one(url).await?;
            info!("{} now has {} articles", url, count);
            print_state(&aggregator.aggregate_state(), cli.json, Detail::Card)?;
        }
        Command::Refresh { source: None } => {
            aggregator.refresh_all().await?;
            print_state(&aggregator.aggregate_state(), cli.json, Detail::Card)?;
        }
        Command::Search { query } => print_articles(&aggregator.search(query), cli.json, Detail::Card)?,
    }

    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum Detail {
    Card,
    Full,
}

impl Detail {
    fn preview(self, article: &Article) -> String {
        let (first, second, limit, missing) = match self {
            Detail::Card => (&article.description, &article.content, 180, "No description available."),
            Detail::Full => (&article.content, &article.description, 2500, "Content not available."),
        };
        let body = if first.trim().is_empty() { second } else { first };
        snippet(body, limit).unwrap_or_else(|| missing.to_string())
    }
}

fn print_state(state: &AggregateState, json: bool, detail: Detail) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(state)?);
        return Ok(());
    }
    println!("Mode: {:?} ({} articles)", state.mode, state.articles.len());
    print_articles(&state.articles, false, detail)
}

fn print_articles(articles: &[Article], json: bool, detail: Detail) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(articles)?);
        return Ok(());
    }
    if articles.is_empty() {
        println!("No articles.");
    }
    for (index, article) in articles.iter().enumerate() {
        println!("\n--- {} ---", index + 1);
        println!("{}", article.title);
        println!("{} | {}", article.source_label, article.published_at);
        println!("{}", detail.preview(article));
        if !article.link.is_empty() {
            println!("{}", article.link);
        }
    }
    Ok(())
}

fn print_feeds(feeds: &[FeedSource], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(feeds)?);
        return Ok(());
    }
    if feeds.is_empty() {
        println!("No feeds saved yet. Add one to begin.");
    }
    for feed in feeds {
        println!("{}  {}", feed.display_name, feed.id);
    }
    Ok(())
}
