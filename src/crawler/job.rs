//! A single page of work within a traversal

use crate::crawler::parser::{ExtractedRecord, NextPage, ParserResult};
use crate::storage::{JobStore, PageRecord};
use crate::SpiderError;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// One listing page to crawl, and what was found on it
///
/// A job is created right before its page is fetched, absorbs the parser's
/// output, is stamped finished and saved. The next page, if any, gets a fresh job.
#[derive(Debug, Clone)]
pub struct Job {
    page: Arc<PageRecord>,
    page_url: String,
    page_number: u32,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    records: Vec<ExtractedRecord>,
    next_page: Option<NextPage>,
    result_recorded: bool,
}

impl Job {
    pub fn new(page: Arc<PageRecord>, page_url: impl Into<String>, page_number: u32) -> Self {
        Self {
            page,
            page_url: page_url.into(),
            page_number,
            started_at: Utc::now(),
            finished_at: None,
            records: Vec::new(),
            next_page: None,
            result_recorded: false,
        }
    }

    /// The page record this job belongs to
    pub fn page(&self) -> &PageRecord {
        &self.page
    }

    pub fn page_url(&self) -> &str {
        &self.page_url
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn records(&self) -> &[ExtractedRecord] {
        &self.records
    }

    pub fn next_page(&self) -> Option<&NextPage> {
        self.next_page.as_ref()
    }

    /// Merges a parse result into the job
    pub fn record_result(&mut self, result: ParserResult) {
        self.records.extend(result.records);
        self.next_page = result.next_page;
        self.result_recorded = true;
    }

    /// Stamps the completion time
    ///
    /// Only valid once, and only after a result has been recorded.
    pub fn record_finished_at(&mut self) -> Result<DateTime<Utc>, SpiderError> {
        if !self.result_recorded {
            return Err(SpiderError::InvalidState(format!(
                "job for {} has no parse result to finish",
                self.page_url
            )));
        }
        if self.finished_at.is_some() {
            return Err(SpiderError::InvalidState(format!(
                "job for {} is already finished",
                self.page_url
            )));
        }

        // Wall clocks can step backwards; never finish before we started.
        let finished_at = Utc::now().max(self.started_at);
        self.finished_at = Some(finished_at);
        Ok(finished_at)
    }

    /// Persists the finished job
    pub async fn save(&self, store: &dyn JobStore) -> Result<i64, SpiderError> {
        Ok(store.save_job(self).await?)
    }
}
