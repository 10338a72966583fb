//! Storage traits and error types
//!
//! The spider only ever talks to storage through these two capabilities, so
//! any backend that implements them can sit behind a crawl.

use crate::crawler::Job;
use crate::state::PageStatus;
use crate::storage::{JobRecord, PageRecord};
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Page record not found: {0}")]
    PageNotFound(i64),

    #[error("Job for {0} has not finished and cannot be saved")]
    IncompleteJob(String),

    #[error("Invalid status in database: {0}")]
    InvalidStatus(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence of crawl targets and their lifecycle status
#[async_trait]
pub trait PageRecordStore: Send + Sync {
    /// Creates a new page record in the WAITING status
    ///
    /// # Arguments
    ///
    /// * `url` - The listing's entry URL
    /// * `page_starts_at` - The page number `url` corresponds to
    ///
    /// # Returns
    ///
    /// The stored record, including its new ID and timestamps
    async fn create_page(&self, url: &str, page_starts_at: u32) -> StorageResult<PageRecord>;

    /// Gets a page record by ID
    ///
    /// Fails with `PageNotFound` if no such record exists.
    async fn get_page(&self, page_id: i64) -> StorageResult<PageRecord>;

    /// Gets all page records currently in `status`, ordered by ID
    async fn list_pages_by_status(&self, status: PageStatus) -> StorageResult<Vec<PageRecord>>;

    /// Moves the record to PROCESSING
    ///
    /// Idempotent: marking a record that is already PROCESSING succeeds and
    /// changes nothing.
    ///
    /// # Arguments
    ///
    /// * `page` - The record to mark; only its ID is used
    async fn mark_processing(&self, page: &PageRecord) -> StorageResult<()>;

    /// Moves the record to WAITING
    ///
    /// Idempotent like `mark_processing`. Fails with `PageNotFound` if the
    /// record has been removed.
    ///
    /// # Arguments
    ///
    /// * `page` - The record to mark; only its ID is used
    async fn mark_waiting(&self, page: &PageRecord) -> StorageResult<()>;
}

/// Persistence of finished jobs and the records they extracted
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Saves a finished job together with its extracted records
    ///
    /// Either the job and all of its records are stored, or nothing is.
    ///
    /// # Arguments
    ///
    /// * `job` - A job whose result and completion time have been recorded
    ///
    /// # Returns
    ///
    /// The ID of the newly stored job, or `IncompleteJob` if the job has no
    /// completion time
    async fn save_job(&self, job: &Job) -> StorageResult<i64>;

    /// Gets every saved job for a page record, oldest first
    ///
    /// Records within each job keep the order the parser produced them in.
    async fn jobs_for_page(&self, page_id: i64) -> StorageResult<Vec<JobRecord>>;
}
