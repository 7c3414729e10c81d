//! Configuration for the fetch coordinator and its collaborators

use std::path::PathBuf;
use std::time::Duration;

/// Base URL of the hiring items endpoint
pub const DEFAULT_BASE_URL: &str = "https://hiring.fetch.com/";

/// How long a cached snapshot is trusted before a refresh is required
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

/// Connect and read timeout for the HTTP client
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for building a coordinator
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Base URL the item list is fetched from, with or without a trailing `/`
    pub base_url: String,
    /// Maximum age of the cached snapshot
    pub ttl: Duration,
    /// Timeout applied to HTTP connect and read
    pub request_timeout: Duration,
    /// Directory holding the persisted store, `None` for the XDG cache dir
    pub store_dir: Option<PathBuf>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            ttl: DEFAULT_TTL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            store_dir: None,
        }
    }
}

impl FetchConfig {
    /// TTL in epoch milliseconds, the unit timestamps are stored in
    pub fn ttl_millis(&self) -> i64 {
        i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX)
    }
}
