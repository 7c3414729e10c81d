//! Remote source of raw item records
//!
//! The coordinator only sees the [`RemoteSource`] trait; [`HttpSource`] is the
//! reqwest-backed implementation that talks to the hiring endpoint.

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

use super::RawRecord;
use crate::config::FetchConfig;

/// Path of the item list relative to the base URL
const ITEMS_PATH: &str = "hiring.json";

/// Errors that can occur when fetching raw records
#[derive(Debug, Error)]
pub enum SourceError {
    /// Connection, timeout or transport failure
    #[error("HTTP request failed: {0}")]
    Network(String),

    /// The server answered with a non-success status
    #[error("Unexpected HTTP status: {0}")]
    Status(u16),

    /// The payload was not a JSON array of records
    #[error("Failed to parse API response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => SourceError::Status(status.as_u16()),
            None => SourceError::Network(err.to_string()),
        }
    }
}

/// Fetches the full raw record set in one call
///
/// Implementations either return every record or fail; there are no partial
/// results.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<RawRecord>, SourceError>;
}

/// Client for fetching the item list over HTTP
#[derive(Debug, Clone)]
pub struct HttpSource {
    /// HTTP client for making requests
    http_client: Client,
    /// Base URL for the API (allows override for testing)
    base_url: String,
}

impl HttpSource {
    /// Creates a new HttpSource from configuration
    ///
    /// The request timeout from `config` is applied to both connecting and
    /// reading the response.
    pub fn new(config: &FetchConfig) -> Result<Self, SourceError> {
        let http_client = Client::builder()
            .connect_timeout(config.request_timeout)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self::with_client(http_client, config.base_url.clone()))
    }

    /// Creates a new HttpSource with a custom HTTP client
    pub fn with_client(http_client: Client, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into(),
        }
    }

    fn items_url(&self) -> String {
        if self.base_url.ends_with('/') {
            format!("{}{}", self.base_url, ITEMS_PATH)
        } else {
            format!("{}/{}", self.base_url, ITEMS_PATH)
        }
    }
}

#[async_trait]
impl RemoteSource for HttpSource {
    async fn fetch_all(&self) -> Result<Vec<RawRecord>, SourceError> {
        let url = self.items_url();
        tracing::debug!(%url, "fetching item list");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await?
            .error_for_status()?;
        let text = response.text().await?;
        let records: Vec<RawRecord> = serde_json::from_str(&text)?;

        tracing::debug!(count = records.len(), "fetched raw records");
        Ok(records)
    }
}
