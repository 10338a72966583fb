//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Listing-Spider database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Crawl targets and their lifecycle status
CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    page_starts_at INTEGER NOT NULL DEFAULT 1,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pages_status ON pages(status);

-- One row per listing page visited
CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id INTEGER NOT NULL REFERENCES pages(id),
    page_url TEXT NOT NULL,
    page_number INTEGER NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    record_count INTEGER NOT NULL DEFAULT 0,
    next_page_url TEXT,
    next_page_number INTEGER
);

CREATE INDEX IF NOT EXISTS idx_jobs_page ON jobs(page_id);

-- Records extracted from a job's page, in document order
CREATE TABLE IF NOT EXISTS job_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id INTEGER NOT NULL REFERENCES jobs(id),
    position INTEGER NOT NULL,
    payload TEXT NOT NULL,
    UNIQUE(job_id, position)
);

CREATE INDEX IF NOT EXISTS idx_job_records_job ON job_records(job_id);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
