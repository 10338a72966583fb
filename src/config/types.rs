use serde::Deserialize;
use std::collections::BTreeMap;

/// Main configuration structure for Listing-Spider
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub spider: SpiderConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    pub parser: ParserConfig,
}

/// Spider behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SpiderConfig {
    /// Total timeout for a single page fetch (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Connect timeout for a single page fetch (seconds)
    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Upper bound on pages visited in one traversal (unbounded when absent)
    #[serde(rename = "max-pages", default)]
    pub max_pages: Option<u32>,

    /// Number of page records crawled at the same time
    #[serde(rename = "max-concurrent-spiders", default = "default_max_concurrent")]
    pub max_concurrent_spiders: u32,

    /// Pause between two pages of the same traversal (milliseconds)
    #[serde(rename = "page-delay-ms", default)]
    pub page_delay_ms: u64,
}

impl Default for SpiderConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            max_pages: None,
            max_concurrent_spiders: default_max_concurrent(),
            page_delay_ms: 0,
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_concurrent() -> u32 {
    4
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the header value: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory that page snapshots are written to
    #[serde(rename = "snapshot-dir", default)]
    pub snapshot_dir: Option<String>,
}

/// Record extraction rules for listing pages
#[derive(Debug, Clone, Deserialize)]
pub struct ParserConfig {
    /// Selector matching one element per listed record
    #[serde(rename = "item-selector")]
    pub item_selector: String,

    /// Selector matching the link to the next page
    #[serde(rename = "next-selector")]
    pub next_selector: String,

    /// Field name -> selector, relative to the item element.
    /// A trailing `@attr` reads that attribute instead of the text.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}
