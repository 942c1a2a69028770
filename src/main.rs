//! Site-Search main entry point
//!
//! This is the command-line interface for the Site-Search crawler and index.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use site_search::config::{load_config_with_hash, Config};
use site_search::crawler::{CrawlManager, PageJob};
use site_search::output::{load_statistics, print_statistics};
use site_search::search::{SearchEngine, SearchRequest};
use site_search::storage::{self, SharedStorage};
use site_search::{LemmaExtractor, Morphology};
use tracing_subscriber::EnvFilter;

/// Site-Search: a lemma-indexing crawler for a fixed set of sites
///
/// Site-Search crawls the sites listed in its configuration, indexes the
/// normalized words of every page and answers ranked full-text queries.
#[derive(Parser, Debug)]
#[command(name = "site-search")]
#[command(version = "1.0.0")]
#[command(about = "A lemma-indexing site crawler and search engine", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Re-crawl and re-index every configured site
    Crawl,

    /// Re-index a single page of a configured site
    IndexPage {
        /// Absolute URL of the page
        url: String,
    },

    /// Search the index
    Search {
        /// Query text
        query: String,

        /// Restrict the search to one configured site
        #[arg(long)]
        site: Option<String>,

        /// Maximum number of results
        #[arg(long)]
        limit: Option<i64>,

        /// Number of results to skip
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },

    /// Show index statistics and exit
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    match cli.command {
        Command::Crawl => handle_crawl(config).await,
        Command::IndexPage { url } => handle_index_page(config, &url).await,
        Command::Search {
            query,
            site,
            limit,
            offset,
        } => handle_search(&config, SearchRequest {
            query,
            site,
            limit,
            offset,
        }),
        Command::Stats => handle_stats(&config),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("site_search=info,warn"),
            1 => EnvFilter::new("site_search=debug,info"),
            2 => EnvFilter::new("site_search=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn open_shared_storage(config: &Config) -> anyhow::Result<SharedStorage> {
    let path = Path::new(&config.storage.database_path);
    let storage = storage::open_storage(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    Ok(storage::shared(storage))
}

fn build_extractor(config: &Config) -> anyhow::Result<LemmaExtractor> {
    let morphology = Morphology::from_config(&config.morphology)?;
    Ok(LemmaExtractor::new(Arc::new(morphology)))
}

/// Handles the crawl command: indexes every site, Ctrl-C stops the crawl
async fn handle_crawl(config: Config) -> anyhow::Result<()> {
    tracing::info!("Configured sites: {}", config.sites.len());

    let storage = open_shared_storage(&config)?;
    let extractor = build_extractor(&config)?;
    let manager = CrawlManager::new(config, Arc::clone(&storage), extractor)?;

    manager.start()?;

    tokio::select! {
        _ = manager.wait_until_idle() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupt received, stopping");
            manager.stop()?;
            manager.wait_until_idle().await;
        }
    }

    let report = load_statistics(&*storage::lock(&storage)?)?;
    print_statistics(&report);
    Ok(())
}

/// Handles the index-page command: waits for the page analysis to finish
async fn handle_index_page(config: Config, url: &str) -> anyhow::Result<()> {
    let storage = open_shared_storage(&config)?;
    let extractor = build_extractor(&config)?;
    let manager = CrawlManager::new(config, storage, extractor)?;

    match manager.index_page(url)? {
        PageJob::AlreadyQueued => println!("Page is already queued: {}", url),
        PageJob::Started(job) => {
            let state = job.await?;
            println!("Page {} finished: {}", url, state);
        }
    }
    Ok(())
}

/// Handles the search command
fn handle_search(config: &Config, request: SearchRequest) -> anyhow::Result<()> {
    let storage = open_shared_storage(config)?;
    let extractor = build_extractor(config)?;
    let engine = SearchEngine::new(config, storage, extractor);

    let response = engine.search(&request)?;

    println!("Found {} pages\n", response.count);
    for item in &response.items {
        println!("{:.3}  {}{}", item.relevance, item.site_url, item.uri);
        if !item.title.is_empty() {
            println!("  {}", item.title);
        }
        if !item.snippet.is_empty() {
            println!("  {}", item.snippet);
        }
        println!();
    }
    Ok(())
}

/// Handles the stats command: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.storage.database_path);

    let storage = open_shared_storage(config)?;
    let report = load_statistics(&*storage::lock(&storage)?)?;
    print_statistics(&report);
    Ok(())
}
