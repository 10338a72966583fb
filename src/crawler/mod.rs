//! Crawler module for paginated listing traversal
//!
//! This module contains the core crawling logic, including:
//! - Fetch clients (plain HTTP, or a rendering browser session)
//! - Listing parsing into records plus a next-page pointer
//! - Jobs, one per visited page
//! - The spider that walks a page record's pagination chain

mod browser;
mod fetcher;
mod job;
mod parser;
mod snapshot;
mod spider;

pub use browser::{BrowserSession, NavigateOptions, RenderedFetchClient, WaitUntil};
pub use fetcher::{build_http_client, FetchClient, FetchError, HttpFetchClient};
pub use job::Job;
pub use parser::{ExtractedRecord, NextPage, ParseError, Parser, ParserResult, SelectorParser};
pub use snapshot::{save_snapshot, snapshot_filename};
pub use spider::{CrawlReport, Spider, StopReason};

use crate::config::{Config, SpiderConfig};
use crate::state::{PageLeases, PageStatus};
use crate::storage::{open_storage, JobStore, PageRecord, PageRecordStore};
use crate::SpiderError;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// Crawls page records from the configured database
///
/// With `page_id` set only that record is crawled; otherwise every record
/// currently WAITING is. Uses the HTTP fetch client and the selector parser
/// built from the configuration.
///
/// # Example
///
/// ```no_run
/// use listing_spider::config::load_config;
/// use listing_spider::crawler::run_crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("spider.toml"))?;
/// let reports = run_crawl(&config, None).await?;
/// println!("{} records crawled", reports.len());
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(
    config: &Config,
    page_id: Option<i64>,
) -> Result<Vec<CrawlReport>, SpiderError> {
    let storage = Arc::new(open_storage(Path::new(&config.output.database_path))?);

    let fetcher = HttpFetchClient::new(&config.user_agent, &config.spider).map_err(|e| {
        SpiderError::Configuration(format!("failed to build HTTP client: {}", e))
    })?;
    let parser = SelectorParser::new(&config.parser)?;

    let targets = match page_id {
        Some(id) => vec![storage.get_page(id).await?],
        None => storage.list_pages_by_status(PageStatus::Waiting).await?,
    };
    tracing::info!("{} page record(s) to crawl", targets.len());

    Ok(crawl_pages(
        targets,
        Arc::new(fetcher),
        parser,
        storage.clone(),
        storage,
        &config.spider,
    )
    .await)
}

/// Runs one spider per distinct page record, several at a time
///
/// At most `max_concurrent_spiders` traversals run at once. All spiders share
/// one lease registry, so a record is never walked twice concurrently. Records
/// that cannot start are logged and left out of the returned reports, which
/// are ordered by page record ID.
pub async fn crawl_pages<F, P>(
    targets: Vec<PageRecord>,
    fetcher: Arc<F>,
    parser: P,
    pages: Arc<dyn PageRecordStore>,
    jobs: Arc<dyn JobStore>,
    settings: &SpiderConfig,
) -> Vec<CrawlReport>
where
    F: FetchClient + ?Sized + 'static,
    P: Parser + Clone + 'static,
{
    let limit = settings.max_concurrent_spiders.max(1) as usize;
    let leases = PageLeases::new();
    let mut seen = HashSet::new();
    let mut running = JoinSet::new();
    let mut reports = Vec::new();

    for page in targets {
        if !seen.insert(page.id) {
            tracing::debug!("Page record {} listed twice; crawling it once", page.id);
            continue;
        }

        while running.len() >= limit {
            if let Some(joined) = running.join_next().await {
                collect_report(joined, &mut reports);
            }
        }

        let mut spider = Spider::new(
            Arc::clone(&fetcher),
            parser.clone(),
            Arc::clone(&pages),
            Arc::clone(&jobs),
        )
        .with_leases(leases.clone())
        .with_max_pages(settings.max_pages)
        .with_page_delay(Duration::from_millis(settings.page_delay_ms));

        running.spawn(async move {
            let page_id = page.id;
            spider.bind(page);
            (page_id, spider.run().await)
        });
    }

    while let Some(joined) = running.join_next().await {
        collect_report(joined, &mut reports);
    }

    reports.sort_by_key(|report| report.page_id);
    reports
}

fn collect_report(
    joined: Result<(i64, Result<CrawlReport, SpiderError>), tokio::task::JoinError>,
    reports: &mut Vec<CrawlReport>,
) {
    match joined {
        Ok((_, Ok(report))) => reports.push(report),
        Ok((page_id, Err(e))) => {
            tracing::warn!("Page record {} was not crawled: {}", page_id, e);
        }
        Err(e) => {
            tracing::error!("Spider task aborted: {}", e);
        }
    }
}
