//! Rendered-page fetching through a browser session
//!
//! Launching and tearing down the browser process belongs to whoever
//! implements `BrowserSession`. This module only adapts a live session to the
//! `FetchClient` contract so the spider can use it like any other client.

use crate::crawler::fetcher::{FetchClient, FetchError};
use async_trait::async_trait;
use std::time::Duration;

/// Navigation milestone to wait for before reading the content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    Load,
    DomContentLoaded,
    /// No more than two network connections for at least 500ms
    NetworkIdle,
}

/// Options passed along with each navigation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigateOptions {
    pub wait_until: Vec<WaitUntil>,
    pub referer: Option<String>,
    pub timeout: Option<Duration>,
}

impl Default for NavigateOptions {
    fn default() -> Self {
        Self {
            wait_until: vec![WaitUntil::DomContentLoaded, WaitUntil::NetworkIdle],
            referer: None,
            timeout: None,
        }
    }
}

/// A navigation-capable rendering session
///
/// Implementations report `FetchError::NotLaunched` when used before the
/// session is set up and `FetchError::ClosedSession` after `shutdown`.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Loads `url` in the session's active page
    async fn navigate(&self, url: &str, options: &NavigateOptions) -> Result<(), FetchError>;

    /// Returns the rendered markup of the active page
    async fn current_content(&self) -> Result<String, FetchError>;

    /// Returns the URL the active page ended up on, if any page is open
    async fn current_url(&self) -> Result<Option<String>, FetchError>;

    /// Tears the session down; later calls fail with `ClosedSession`
    async fn shutdown(&self) -> Result<(), FetchError>;
}

/// `FetchClient` backed by a rendering session
pub struct RenderedFetchClient<S> {
    session: S,
    options: NavigateOptions,
}

impl<S: BrowserSession> RenderedFetchClient<S> {
    pub fn new(session: S) -> Self {
        Self {
            session,
            options: NavigateOptions::default(),
        }
    }

    pub fn with_options(mut self, options: NavigateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// Shuts the underlying session down
    pub async fn shutdown(&self) -> Result<(), FetchError> {
        self.session.shutdown().await
    }
}

#[async_trait]
impl<S: BrowserSession> FetchClient for RenderedFetchClient<S> {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        tracing::debug!("Navigating to {}", url);
        self.session.navigate(url, &self.options).await?;
        self.session.current_content().await
    }
}
