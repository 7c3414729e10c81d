//! Cache module for persisting the fetched item list
//!
//! This module provides the store that keeps exactly one snapshot of the
//! normalized items together with its fetch timestamp. Reads degrade to an
//! empty snapshot instead of failing, so the coordinator can always fall back
//! to whatever was last committed.

pub mod codec;
mod store;

pub use store::{CacheStore, StorageError};
