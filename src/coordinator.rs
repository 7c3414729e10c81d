//! Cache-aside fetch coordinator
//!
//! Decides on every call whether the cached snapshot can be served or the
//! remote source has to be hit, persists fresh results and falls back to the
//! cache when the network fails.

use futures::stream::{self, Stream};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::cache::{CacheStore, StorageError};
use crate::config::FetchConfig;
use crate::data::{normalize, HttpSource, Item, RemoteSource, SourceError};

/// Terminal failure of a fetch: no network result and no cached data
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Items unavailable: {0}")]
    Unavailable(#[source] SourceError),
}

impl FetchError {
    /// The network or decode failure that caused this error
    pub fn cause(&self) -> &SourceError {
        match self {
            FetchError::Unavailable(source) => source,
        }
    }
}

/// Where the items returned by a fetch came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Freshly fetched from the remote source
    Network,
    /// Served from a snapshot that is still within its TTL
    Cache,
    /// Served from the cache after a failed refresh; may be stale
    Fallback,
}

/// Items returned by a fetch along with their origin
#[derive(Debug, Clone)]
pub struct Fetched {
    pub items: Vec<Item>,
    pub origin: Origin,
}

/// Source of the current time in epoch milliseconds
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(now_millis),
        }
    }

    pub fn set(&self, now_millis: i64) {
        self.now.store(now_millis, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Receives persistence failures the coordinator does not surface to callers
pub trait SaveObserver: Send + Sync {
    fn on_save_failed(&self, error: &StorageError);
}

/// Observer that logs failed saves
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl SaveObserver for LogObserver {
    fn on_save_failed(&self, error: &StorageError) {
        tracing::warn!(error = %error, "failed to persist fetched items");
    }
}

/// Single entry point for reading the item list
///
/// Holds no state of its own between calls; everything it knows about
/// previous fetches lives in the [`CacheStore`]. Concurrent calls are allowed
/// and are not coalesced: each refresh hits the source once and saves its own
/// result.
pub struct FetchCoordinator {
    source: Arc<dyn RemoteSource>,
    store: Arc<CacheStore>,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn SaveObserver>,
    ttl_millis: i64,
}

impl FetchCoordinator {
    /// Creates a coordinator with the default TTL, wall clock and log observer
    pub fn new(source: Arc<dyn RemoteSource>, store: Arc<CacheStore>) -> Self {
        Self {
            source,
            store,
            clock: Arc::new(SystemClock),
            observer: Arc::new(LogObserver),
            ttl_millis: FetchConfig::default().ttl_millis(),
        }
    }

    /// Builds an HTTP-backed coordinator from configuration
    pub fn from_config(config: &FetchConfig) -> Result<Self, ConfigError> {
        let source = HttpSource::new(config)?;
        let store = CacheStore::from_config(config)?;
        Ok(Self::new(Arc::new(source), Arc::new(store)).with_ttl_millis(config.ttl_millis()))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SaveObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_ttl_millis(mut self, ttl_millis: i64) -> Self {
        self.ttl_millis = ttl_millis;
        self
    }

    /// The store this coordinator reads and writes
    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Returns the item list, refreshing from the network when needed
    ///
    /// # Returns
    /// * `Ok(items)` - fresh items, cached items within the TTL, or cached
    ///   items after a failed refresh
    /// * `Err(FetchError)` - the refresh failed and the cache is empty
    pub async fn get_data(&self, force_refresh: bool) -> Result<Vec<Item>, FetchError> {
        self.fetch(force_refresh).await.map(|fetched| fetched.items)
    }

    /// Same as [`get_data`](Self::get_data) as a lazy single-item stream
    ///
    /// Nothing is read or fetched until the stream is polled.
    pub fn data_stream(
        &self,
        force_refresh: bool,
    ) -> impl Stream<Item = Result<Vec<Item>, FetchError>> + '_ {
        stream::once(self.get_data(force_refresh))
    }

    /// Returns the item list along with where it came from
    pub async fn fetch(&self, force_refresh: bool) -> Result<Fetched, FetchError> {
        if !force_refresh {
            if let Some(items) = self.fresh_cache().await {
                tracing::debug!(count = items.len(), "serving items from cache");
                return Ok(Fetched {
                    items,
                    origin: Origin::Cache,
                });
            }
        }

        tracing::debug!(force_refresh, "refreshing items from remote source");
        match self.source.fetch_all().await {
            Ok(raw) => {
                let items = normalize(raw);
                if let Err(err) = self.store.save(&items, self.clock.now_millis()).await {
                    self.observer.on_save_failed(&err);
                }
                Ok(Fetched {
                    items,
                    origin: Origin::Network,
                })
            }
            Err(err) => {
                let cached = self.store.load().await;
                if cached.is_empty() {
                    tracing::warn!(error = %err, "refresh failed and no cached items exist");
                    return Err(FetchError::Unavailable(err));
                }
                tracing::warn!(
                    error = %err,
                    count = cached.len(),
                    "refresh failed; serving cached items"
                );
                Ok(Fetched {
                    items: cached,
                    origin: Origin::Fallback,
                })
            }
        }
    }

    /// Cached items if the snapshot is non-empty and no older than the TTL
    ///
    /// An age exactly equal to the TTL still counts as fresh.
    async fn fresh_cache(&self) -> Option<Vec<Item>> {
        let fetched_at = self.store.load_timestamp().await;
        let age = self.clock.now_millis().saturating_sub(fetched_at);
        if age > self.ttl_millis {
            return None;
        }
        let items = self.store.load().await;
        if items.is_empty() {
            None
        } else {
            Some(items)
        }
    }
}

/// Errors that can occur when building a coordinator from configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to build HTTP client: {0}")]
    Source(#[from] SourceError),

    #[error("Failed to open cache store: {0}")]
    Store(#[from] StorageError),
}
