//! Single-page snapshots
//!
//! Fetches one URL and writes the content to disk, which is handy when
//! writing selectors for a new listing site.

use crate::crawler::fetcher::FetchClient;
use crate::SpiderError;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::io::AsyncWriteExt;

static SEQUENCE: AtomicU32 = AtomicU32::new(0);

/// Builds `<millis>_<sequence>_<sanitised-url>.html`
///
/// The scheme is dropped and every non-alphanumeric character becomes `_`.
/// The sequence keeps two snapshots taken in the same millisecond apart.
pub fn snapshot_filename(url: &str, timestamp_millis: i64, sequence: u32) -> String {
    let without_scheme = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);

    let cleaned: String = without_scheme
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();

    format!(
        "{}_{}_{}.html",
        timestamp_millis,
        sequence,
        cleaned.trim_end_matches('_')
    )
}

/// Fetches `url` and writes it under `dir`, returning the file path
///
/// An existing file is never overwritten.
pub async fn save_snapshot<F: FetchClient + ?Sized>(
    fetcher: &F,
    url: &str,
    dir: &Path,
) -> Result<PathBuf, SpiderError> {
    let content = fetcher
        .fetch(url)
        .await
        .map_err(|source| SpiderError::Fetch {
            url: url.to_string(),
            source,
        })?;

    tokio::fs::create_dir_all(dir).await?;
    let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let path = dir.join(snapshot_filename(url, Utc::now().timestamp_millis(), sequence));

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .await?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await?;

    tracing::info!("Page source for {} saved to {}", url, path.display());
    Ok(path)
}
