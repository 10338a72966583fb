//! Spider - walks one page record's pagination chain
//!
//! For each page: mark the record PROCESSING, fetch, parse, record the result
//! on the page's job, stamp and save the job, then move on to the next page
//! if the parser found one. Whatever happens, the record ends up WAITING.

use crate::crawler::fetcher::FetchClient;
use crate::crawler::job::Job;
use crate::crawler::parser::Parser;
use crate::state::PageLeases;
use crate::storage::{JobStore, PageRecord, PageRecordStore};
use crate::SpiderError;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Why a traversal stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The last page had no next page
    Exhausted,

    /// The configured page cap was reached
    PageLimit { max_pages: u32 },

    /// The next page had already been visited in this traversal
    Revisited { page_url: String },

    /// A fetch, parse or save failed; the chain was abandoned at this page
    Failed {
        page_number: u32,
        page_url: String,
        error: String,
    },
}

/// Outcome of one `Spider::run`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlReport {
    pub page_id: i64,
    /// Jobs saved during the traversal
    pub pages_saved: u32,
    /// Records across all saved jobs
    pub records_saved: usize,
    pub stop: StopReason,
    /// Set if returning the record to WAITING failed
    pub release_error: Option<String>,
}

impl CrawlReport {
    /// True if the chain ran to its end and the record was released
    pub fn is_complete(&self) -> bool {
        !matches!(self.stop, StopReason::Failed { .. }) && self.release_error.is_none()
    }
}

/// Drives the fetch → parse → save → next-page loop for a bound page record
pub struct Spider<F, P> {
    fetcher: F,
    parser: P,
    pages: Arc<dyn PageRecordStore>,
    jobs: Arc<dyn JobStore>,
    leases: Option<PageLeases>,
    max_pages: Option<u32>,
    page_delay: Duration,
    page: Option<Arc<PageRecord>>,
    job: Option<Job>,
}

impl<F: FetchClient, P: Parser> Spider<F, P> {
    pub fn new(
        fetcher: F,
        parser: P,
        pages: Arc<dyn PageRecordStore>,
        jobs: Arc<dyn JobStore>,
    ) -> Self {
        Self {
            fetcher,
            parser,
            pages,
            jobs,
            leases: None,
            max_pages: None,
            page_delay: Duration::ZERO,
            page: None,
            job: None,
        }
    }

    /// Refuses to run while another spider sharing `leases` holds the same record
    pub fn with_leases(mut self, leases: PageLeases) -> Self {
        self.leases = Some(leases);
        self
    }

    /// Stops a traversal after `max_pages` saved pages
    pub fn with_max_pages(mut self, max_pages: Option<u32>) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Waits `delay` between two pages of a traversal
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Binds a page record and queues its first page
    ///
    /// Any earlier binding, including a job left from it, is discarded.
    pub fn bind(&mut self, page: PageRecord) {
        let page = Arc::new(page);
        self.job = Some(Job::new(
            Arc::clone(&page),
            page.url.clone(),
            page.page_starts_at,
        ));
        self.page = Some(page);
    }

    /// The bound page record, if any
    pub fn page(&self) -> Option<&PageRecord> {
        self.page.as_deref()
    }

    /// The job the next `run` starts from, if any
    pub fn pending_job(&self) -> Option<&Job> {
        self.job.as_ref()
    }

    /// Crawls the bound record's pagination chain to the end
    ///
    /// Returns `Err` only when the spider cannot start: nothing is bound, or
    /// the record is leased by another spider. In both cases storage is left
    /// untouched. Failures during the chain are logged and reported in the
    /// returned `CrawlReport`. The pending job is consumed; bind again to
    /// crawl the record another time.
    pub async fn run(&mut self) -> Result<CrawlReport, SpiderError> {
        let page = self
            .page
            .clone()
            .ok_or_else(|| SpiderError::Configuration("no page record is bound".to_string()))?;

        let _lease = match &self.leases {
            Some(leases) => Some(
                leases
                    .try_acquire(page.id)
                    .ok_or(SpiderError::PageBusy(page.id))?,
            ),
            None => None,
        };

        let mut job = self.job.take().ok_or_else(|| {
            SpiderError::Configuration(format!(
                "no pending job for page record {}; call bind() first",
                page.id
            ))
        })?;

        tracing::info!(
            "Starting traversal of page record {} at {} (page {})",
            page.id,
            job.page_url(),
            job.page_number()
        );

        let mut pages_saved = 0u32;
        let mut records_saved = 0usize;
        let mut visited = HashSet::new();

        let stop = loop {
            visited.insert(job.page_url().to_string());

            if let Err(e) = self.process(&page, &mut job).await {
                tracing::error!(
                    "Traversal of page record {} stopped at page {} ({}): {}",
                    page.id,
                    job.page_number(),
                    job.page_url(),
                    e
                );
                break StopReason::Failed {
                    page_number: job.page_number(),
                    page_url: job.page_url().to_string(),
                    error: e.to_string(),
                };
            }

            pages_saved += 1;
            records_saved += job.records().len();
            tracing::info!(
                "Saved page {} of record {}: {} records",
                job.page_number(),
                page.id,
                job.records().len()
            );

            let Some(next) = job.next_page().cloned() else {
                break StopReason::Exhausted;
            };

            if visited.contains(&next.page_url) {
                tracing::warn!(
                    "Pagination of record {} loops back to {}; stopping",
                    page.id,
                    next.page_url
                );
                break StopReason::Revisited {
                    page_url: next.page_url,
                };
            }

            if let Some(max_pages) = self.max_pages {
                if pages_saved >= max_pages {
                    tracing::info!(
                        "Page limit {} reached for record {}; not following {}",
                        max_pages,
                        page.id,
                        next.page_url
                    );
                    break StopReason::PageLimit { max_pages };
                }
            }

            if !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }

            job = Job::new(Arc::clone(&page), next.page_url, next.page_number);
        };

        let release_error = match self.pages.mark_waiting(&page).await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(
                    "Failed to return page record {} to WAITING: {}",
                    page.id,
                    e
                );
                Some(e.to_string())
            }
        };

        tracing::info!(
            "Traversal of page record {} finished: {} pages, {} records, {:?}",
            page.id,
            pages_saved,
            records_saved,
            stop
        );

        Ok(CrawlReport {
            page_id: page.id,
            pages_saved,
            records_saved,
            stop,
            release_error,
        })
    }

    /// One page: mark, fetch, parse, finish, save
    async fn process(&mut self, page: &PageRecord, job: &mut Job) -> Result<(), SpiderError> {
        self.pages.mark_processing(page).await?;

        let content = self
            .fetcher
            .fetch(job.page_url())
            .await
            .map_err(|source| SpiderError::Fetch {
                url: job.page_url().to_string(),
                source,
            })?;

        self.parser.setup(page, job.page_url(), job.page_number());
        let result = self.parser.parse(&content)?;

        job.record_result(result);
        job.record_finished_at()?;
        job.save(self.jobs.as_ref()).await?;
        Ok(())
    }
}
