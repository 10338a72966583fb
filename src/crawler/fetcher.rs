//! Fetch clients
//!
//! A fetch client turns a URL into page content. The spider does not care how:
//! `HttpFetchClient` issues a plain GET, while `RenderedFetchClient` (see the
//! `browser` module) drives a rendering session. Both satisfy `FetchClient`.

use crate::config::{SpiderConfig, UserAgentConfig};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors a fetch client can report
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Browser session is not launched")]
    NotLaunched,

    #[error("Browser session has been closed")]
    ClosedSession,

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Navigation failed: {0}")]
    Navigation(String),
}

/// Capability to fetch the content of a page
#[async_trait]
pub trait FetchClient: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

#[async_trait]
impl<T: FetchClient + ?Sized> FetchClient for Arc<T> {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        (**self).fetch(url).await
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use listing_spider::config::{SpiderConfig, UserAgentConfig};
/// use listing_spider::crawler::build_http_client;
///
/// let user_agent = UserAgentConfig {
///     crawler_name: "ListingSpider".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&user_agent, &SpiderConfig::default()).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    settings: &SpiderConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(Duration::from_secs(settings.request_timeout_secs))
        .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Plain HTTP GET fetch client
#[derive(Debug, Clone)]
pub struct HttpFetchClient {
    client: Client,
}

impl HttpFetchClient {
    pub fn new(user_agent: &UserAgentConfig, settings: &SpiderConfig) -> Result<Self, reqwest::Error> {
        build_http_client(user_agent, settings).map(Self::from_client)
    }

    /// Wraps an already configured reqwest client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FetchClient for HttpFetchClient {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| classify(url, e))
    }
}

fn classify(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Http {
            url: url.to_string(),
            source: error,
        }
    }
}
