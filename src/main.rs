//! Listing-Spider main entry point
//!
//! This is the command-line interface for the Listing-Spider crawler.

use anyhow::{bail, Context};
use clap::Parser;
use listing_spider::config::{load_config_with_hash, Config};
use listing_spider::crawler::{run_crawl, save_snapshot, HttpFetchClient, StopReason};
use listing_spider::storage::{open_storage, PageRecordStore};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Listing-Spider: a paginated listing crawler
///
/// Walks each WAITING page record from its entry URL through every next
/// page, saving the records found on each page to the database.
#[derive(Parser, Debug)]
#[command(name = "listing-spider")]
#[command(version = "1.0.0")]
#[command(about = "A paginated listing crawler", long_about = None)]
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

    /// Crawl only this page record instead of every WAITING one
    #[arg(long, value_name = "ID", conflicts_with_all = ["add_page", "snapshot"])]
    page: Option<i64>,

    /// Register a new page record with this entry URL and exit
    #[arg(long, value_name = "URL", conflicts_with = "snapshot")]
    add_page: Option<String>,

    /// Page number the new record's entry URL corresponds to
    #[arg(long, value_name = "N", default_value_t = 1, requires = "add_page")]
    starts_at: u32,

    /// Fetch a single URL, save its content to the snapshot directory and exit
    #[arg(long, value_name = "URL")]
    snapshot: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if let Some(url) = cli.add_page.as_deref() {
        handle_add_page(&config, url, cli.starts_at).await
    } else if let Some(url) = cli.snapshot.as_deref() {
        handle_snapshot(&config, url).await
    } else {
        handle_crawl(&config, cli.page).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("listing_spider=info,warn"),
            1 => EnvFilter::new("listing_spider=debug,info"),
            2 => EnvFilter::new("listing_spider=trace,debug"),
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

/// Handles --add-page: creates a WAITING page record
async fn handle_add_page(config: &Config, url: &str, starts_at: u32) -> anyhow::Result<()> {
    url::Url::parse(url).with_context(|| format!("invalid page URL '{}'", url))?;

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let page = storage.create_page(url, starts_at).await?;

    println!("✓ Added page record {} ({}, starts at page {})", page.id, page.url, page.page_starts_at);
    Ok(())
}

/// Handles --snapshot: dumps one page to disk
async fn handle_snapshot(config: &Config, url: &str) -> anyhow::Result<()> {
    let Some(dir) = config.output.snapshot_dir.as_deref() else {
        bail!("--snapshot needs [output] snapshot-dir in the configuration");
    };

    let fetcher = HttpFetchClient::new(&config.user_agent, &config.spider)?;
    let path = save_snapshot(&fetcher, url, Path::new(dir)).await?;

    println!("✓ Page source saved to {}", path.display());
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, page: Option<i64>) -> anyhow::Result<()> {
    match page {
        Some(id) => tracing::info!("Crawling page record {}", id),
        None => tracing::info!("Crawling every WAITING page record"),
    }

    let reports = run_crawl(config, page).await.context("crawl failed")?;

    let mut failed = 0;
    for report in &reports {
        match &report.stop {
            StopReason::Exhausted => println!(
                "✓ Record {}: {} pages, {} records",
                report.page_id, report.pages_saved, report.records_saved
            ),
            StopReason::PageLimit { max_pages } => println!(
                "✓ Record {}: {} pages, {} records (stopped at page limit {})",
                report.page_id, report.pages_saved, report.records_saved, max_pages
            ),
            StopReason::Revisited { page_url } => println!(
                "✓ Record {}: {} pages, {} records (pagination looped back to {})",
                report.page_id, report.pages_saved, report.records_saved, page_url
            ),
            StopReason::Failed {
                page_number, error, ..
            } => {
                failed += 1;
                println!(
                    "✗ Record {}: stopped at page {} after {} pages: {}",
                    report.page_id, page_number, report.pages_saved, error
                );
            }
        }
        if let Some(error) = &report.release_error {
            failed += 1;
            println!("✗ Record {} may still be PROCESSING: {}", report.page_id, error);
        }
    }

    tracing::info!(
        "Crawl finished: {} records crawled, {} with problems",
        reports.len(),
        failed
    );
    Ok(())
}
