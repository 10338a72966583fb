//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the spider, including:
//! - SQLite database initialization and schema management
//! - Page record lifecycle status (waiting / processing)
//! - Finished jobs and the records they extracted

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{JobStore, PageRecordStore, StorageError, StorageResult};

use crate::crawler::{ExtractedRecord, NextPage};
use crate::state::PageStatus;
use crate::SpiderError;

use std::path::Path;

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> Result<SqliteStorage, SpiderError> {
    Ok(SqliteStorage::new(path)?)
}

/// A crawl target: an entry URL plus the page number it starts at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    pub id: i64,
    pub url: String,
    pub page_starts_at: u32,
    pub status: PageStatus,
    pub created_at: String,
    pub updated_at: String,
}

/// A job as read back from the database
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: i64,
    pub page_id: i64,
    pub page_url: String,
    pub page_number: u32,
    pub started_at: String,
    pub finished_at: String,
    pub records: Vec<ExtractedRecord>,
    pub next_page: Option<NextPage>,
}
