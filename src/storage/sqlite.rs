//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the storage traits.

use crate::crawler::{ExtractedRecord, Job, NextPage};
use crate::state::PageStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{JobStore, PageRecordStore, StorageError, StorageResult};
use crate::storage::{JobRecord, PageRecord};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const PAGE_COLUMNS: &str = "id, url, page_starts_at, status, created_at, updated_at";

/// SQLite storage backend
///
/// The connection sits behind a mutex so one storage can be shared by every
/// spider in the process. No lock is held across an await point.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Opens (or creates) the database at `path` and applies the schema
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_status(&self, page_id: i64, status: PageStatus) -> StorageResult<()> {
        let conn = self.lock();
        let now = Utc::now().to_rfc3339();
        let changed = conn.execute(
            "UPDATE pages SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status != ?1",
            params![status.to_db_string(), now, page_id],
        )?;

        if changed == 0 {
            // Either already in the target status, or the row is missing.
            let exists: Option<i64> = conn
                .query_row("SELECT id FROM pages WHERE id = ?1", params![page_id], |row| {
                    row.get(0)
                })
                .optional()?;
            if exists.is_none() {
                return Err(StorageError::PageNotFound(page_id));
            }
        }

        Ok(())
    }
}

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<(PageRecord, String)> {
    let status: String = row.get(3)?;
    Ok((
        PageRecord {
            id: row.get(0)?,
            url: row.get(1)?,
            page_starts_at: row.get(2)?,
            status: PageStatus::Waiting,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        },
        status,
    ))
}

fn with_status((mut page, status): (PageRecord, String)) -> StorageResult<PageRecord> {
    page.status = PageStatus::from_db_string(&status)
        .ok_or_else(|| StorageError::InvalidStatus(status.clone()))?;
    Ok(page)
}

#[async_trait]
impl PageRecordStore for SqliteStorage {
    async fn create_page(&self, url: &str, page_starts_at: u32) -> StorageResult<PageRecord> {
        let id = {
            let conn = self.lock();
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO pages (url, page_starts_at, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![url, page_starts_at, PageStatus::Waiting.to_db_string(), now],
            )?;
            conn.last_insert_rowid()
        };
        self.get_page(id).await
    }

    async fn get_page(&self, page_id: i64) -> StorageResult<PageRecord> {
        let conn = self.lock();
        let raw = conn
            .query_row(
                &format!("SELECT {} FROM pages WHERE id = ?1", PAGE_COLUMNS),
                params![page_id],
                page_from_row,
            )
            .optional()?
            .ok_or(StorageError::PageNotFound(page_id))?;
        with_status(raw)
    }

    async fn list_pages_by_status(&self, status: PageStatus) -> StorageResult<Vec<PageRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM pages WHERE status = ?1 ORDER BY id",
            PAGE_COLUMNS
        ))?;

        let rows = stmt
            .query_map(params![status.to_db_string()], page_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(with_status).collect()
    }

    async fn mark_processing(&self, page: &PageRecord) -> StorageResult<()> {
        self.set_status(page.id, PageStatus::Processing)
    }

    async fn mark_waiting(&self, page: &PageRecord) -> StorageResult<()> {
        self.set_status(page.id, PageStatus::Waiting)
    }
}

#[async_trait]
impl JobStore for SqliteStorage {
    async fn save_job(&self, job: &Job) -> StorageResult<i64> {
        let finished_at = job
            .finished_at()
            .ok_or_else(|| StorageError::IncompleteJob(job.page_url().to_string()))?;

        let payloads = job
            .records()
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;

        let mut conn = self.lock();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO jobs (page_id, page_url, page_number, started_at, finished_at,
             record_count, next_page_url, next_page_number)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                job.page().id,
                job.page_url(),
                job.page_number(),
                job.started_at().to_rfc3339(),
                finished_at.to_rfc3339(),
                payloads.len() as i64,
                job.next_page().map(|next| next.page_url.as_str()),
                job.next_page().map(|next| next.page_number),
            ],
        )?;
        let job_id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare(
                "INSERT INTO job_records (job_id, position, payload) VALUES (?1, ?2, ?3)",
            )?;
            for (position, payload) in payloads.iter().enumerate() {
                stmt.execute(params![job_id, position as i64, payload])?;
            }
        }

        tx.commit()?;
        Ok(job_id)
    }

    async fn jobs_for_page(&self, page_id: i64) -> StorageResult<Vec<JobRecord>> {
        let conn = self.lock();

        let mut stmt = conn.prepare(
            "SELECT id, page_id, page_url, page_number, started_at, finished_at,
             next_page_url, next_page_number
             FROM jobs WHERE page_id = ?1 ORDER BY id",
        )?;
        let mut jobs = stmt
            .query_map(params![page_id], |row| {
                let next_url: Option<String> = row.get(6)?;
                let next_number: Option<u32> = row.get(7)?;
                Ok(JobRecord {
                    id: row.get(0)?,
                    page_id: row.get(1)?,
                    page_url: row.get(2)?,
                    page_number: row.get(3)?,
                    started_at: row.get(4)?,
                    finished_at: row.get(5)?,
                    records: Vec::new(),
                    next_page: next_url.zip(next_number).map(|(page_url, page_number)| {
                        NextPage {
                            page_url,
                            page_number,
                        }
                    }),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut records_stmt = conn
            .prepare("SELECT payload FROM job_records WHERE job_id = ?1 ORDER BY position")?;
        for job in &mut jobs {
            let payloads = records_stmt
                .query_map(params![job.id], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            job.records = payloads
                .iter()
                .map(|payload| serde_json::from_str::<ExtractedRecord>(payload))
                .collect::<Result<Vec<_>, _>>()?;
        }

        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::ParserResult;
    use std::sync::Arc;

    fn finished_job(page: &PageRecord, number: u32, ids: &[&str]) -> Job {
        let mut job = Job::new(
            Arc::new(page.clone()),
            format!("{}?p={}", page.url, number),
            number,
        );
        job.record_result(ParserResult {
            records: ids
                .iter()
                .map(|id| ExtractedRecord::new().with_field("id", *id))
                .collect(),
            next_page: None,
        });
        job.record_finished_at().unwrap();
        job
    }

    #[test]
    fn test_create_in_memory() {
        let storage = SqliteStorage::new_in_memory();
        assert!(storage.is_ok());
    }

    #[tokio::test]
    async fn test_create_page_starts_waiting() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let page = storage.create_page("https://x.test/list", 1).await.unwrap();

        assert!(page.id > 0);
        assert_eq!(page.url, "https://x.test/list");
        assert_eq!(page.page_starts_at, 1);
        assert_eq!(page.status, PageStatus::Waiting);
    }

    #[tokio::test]
    async fn test_status_transitions() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let page = storage.create_page("https://x.test/list", 1).await.unwrap();

        storage.mark_processing(&page).await.unwrap();
        assert_eq!(
            storage.get_page(page.id).await.unwrap().status,
            PageStatus::Processing
        );

        storage.mark_waiting(&page).await.unwrap();
        assert_eq!(
            storage.get_page(page.id).await.unwrap().status,
            PageStatus::Waiting
        );
    }

    #[tokio::test]
    async fn test_mark_waiting_is_idempotent() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let page = storage.create_page("https://x.test/list", 1).await.unwrap();

        storage.mark_waiting(&page).await.unwrap();
        storage.mark_waiting(&page).await.unwrap();
        storage.mark_processing(&page).await.unwrap();
        storage.mark_processing(&page).await.unwrap();

        assert_eq!(
            storage.get_page(page.id).await.unwrap().status,
            PageStatus::Processing
        );
    }

    #[tokio::test]
    async fn test_mark_missing_page() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let mut page = storage.create_page("https://x.test/list", 1).await.unwrap();
        page.id = 999;

        let result = storage.mark_waiting(&page).await;
        assert!(matches!(result, Err(StorageError::PageNotFound(999))));
    }

    #[tokio::test]
    async fn test_list_pages_by_status() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let a = storage.create_page("https://a.test/", 1).await.unwrap();
        let b = storage.create_page("https://b.test/", 3).await.unwrap();
        storage.mark_processing(&a).await.unwrap();

        let waiting = storage
            .list_pages_by_status(PageStatus::Waiting)
            .await
            .unwrap();
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].id, b.id);
        assert_eq!(waiting[0].page_starts_at, 3);
    }

    #[tokio::test]
    async fn test_save_and_load_jobs() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let page = storage.create_page("https://x.test/list", 1).await.unwrap();

        storage
            .save_job(&finished_job(&page, 1, &["a", "b"]))
            .await
            .unwrap();
        storage
            .save_job(&finished_job(&page, 2, &["c"]))
            .await
            .unwrap();

        let jobs = storage.jobs_for_page(page.id).await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].page_number, 1);
        assert_eq!(jobs[0].records.len(), 2);
        assert_eq!(jobs[0].records[1].get("id"), Some("b"));
        assert_eq!(jobs[1].page_url, "https://x.test/list?p=2");
        assert!(jobs[1].next_page.is_none());
    }

    #[tokio::test]
    async fn test_save_unfinished_job_is_rejected() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let page = storage.create_page("https://x.test/list", 1).await.unwrap();
        let job = Job::new(Arc::new(page.clone()), page.url.clone(), 1);

        let result = storage.save_job(&job).await;
        assert!(matches!(result, Err(StorageError::IncompleteJob(_))));
        assert!(storage.jobs_for_page(page.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_job_for_missing_page_fails() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let mut page = storage.create_page("https://x.test/list", 1).await.unwrap();
        page.id = 42;

        let result = storage.save_job(&finished_job(&page, 1, &["a"])).await;
        assert!(matches!(result, Err(StorageError::Sqlite(_))));
    }
}
