//! Listing-Spider: a paginated listing crawler
//!
//! This crate walks a paginated listing site one page at a time: fetch the
//! page, parse out the records and the link to the next page, persist the
//! result, and move on until pagination ends.

pub mod config;
pub mod crawler;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Listing-Spider operations
#[derive(Debug, Error)]
pub enum SpiderError {
    #[error("Spider is not configured: {0}")]
    Configuration(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch failed for {url}: {source}")]
    Fetch {
        url: String,
        source: crawler::FetchError,
    },

    #[error(transparent)]
    Parse(#[from] crawler::ParseError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] storage::StorageError),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Page record {0} is already being crawled")]
    PageBusy(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid CSS selector: {0}")]
    InvalidSelector(String),
}

/// Result type alias for Listing-Spider operations
pub type Result<T> = std::result::Result<T, SpiderError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlReport, Job, Spider, StopReason};
pub use state::PageStatus;
pub use storage::PageRecord;
