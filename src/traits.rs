use crate::model::ExtractionResult;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Failed to parse content: {0}")]
    InvalidContent(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request to {url} failed: {reason}")]
    Request { url: String, reason: String },
    #[error("Request to {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("Request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },
    #[error("Not a regular file: {0}")]
    NotAFile(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Search request failed: {0}")]
    Request(String),
    #[error("Search provider returned status {0}")]
    Status(u16),
}

/// A metadata extractor for one content family.
///
/// Implementations are stateless with respect to the pipeline and run on a
/// blocking thread, so they may do synchronous file I/O.
pub trait MetadataExtractor: Send + Sync {
    /// Returns the name used in logs (e.g., "image", "pdf").
    fn name(&self) -> &'static str;

    /// File types (lower-case extensions) this extractor accepts.
    fn handled_types(&self) -> &'static [&'static str];

    fn handles(&self, file_type: &str) -> bool {
        self.handled_types().contains(&file_type)
    }

    /// Extracts metadata from the file at `path`.
    ///
    /// Must return `Ok(None)` without touching `path` when `file_type` is not
    /// one of [`handled_types`](Self::handled_types).
    fn parse_data(
        &self,
        path: &Path,
        file_type: &str,
    ) -> Result<Option<ExtractionResult>, ExtractionError>;
}

/// Finds candidate document URLs for a search query.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// May return more than `max_results` URLs; callers truncate.
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        identity: &str,
    ) -> Result<Vec<String>, SearchError>;
}

/// Downloads raw bytes for a URL.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        timeout: Duration,
        identity: &str,
    ) -> Result<Vec<u8>, FetchError>;
}
