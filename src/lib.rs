//! Fetchlist
//!
//! Fetches the item list from a remote endpoint, normalizes it and serves it
//! from a local snapshot while the snapshot is fresh, falling back to the
//! snapshot when the network is unavailable.

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod data;

pub use cache::{CacheStore, StorageError};
pub use config::FetchConfig;
pub use coordinator::{
    Clock, ConfigError, FetchCoordinator, FetchError, Fetched, LogObserver, ManualClock, Origin,
    SaveObserver, SystemClock,
};
pub use data::{group_by_list, normalize, HttpSource, Item, RawRecord, RemoteSource, SourceError};
