//! Core data models for the item list
//!
//! Raw records come straight off the wire; items are the validated, sorted
//! form handed to consumers and persisted by the cache.

pub mod normalize;
pub mod source;

pub use normalize::normalize;
pub use source::{HttpSource, RemoteSource, SourceError};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// A single record as returned by the remote endpoint
///
/// `name` may be absent, `null` or empty; such records are dropped by
/// [`normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawRecord {
    pub id: i64,
    #[serde(rename = "listId")]
    pub list_id: i64,
    #[serde(default)]
    pub name: Option<String>,
}

/// A validated item with a non-empty name
///
/// Identity is the `id` field: two items with the same `id` hash and compare
/// equal regardless of their other fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    #[serde(rename = "listId")]
    pub list_id: i64,
    pub name: String,
}

impl Item {
    pub fn new(id: i64, list_id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            list_id,
            name: name.into(),
        }
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Item {}

impl Hash for Item {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Groups items into sections keyed by `listId`
///
/// Sections iterate in ascending `listId` order and keep the relative order
/// of the input within each section.
pub fn group_by_list(items: &[Item]) -> BTreeMap<i64, Vec<Item>> {
    let mut groups: BTreeMap<i64, Vec<Item>> = BTreeMap::new();
    for item in items {
        groups.entry(item.list_id).or_default().push(item.clone());
    }
    groups
}

/// `(id, listId, name)` per item, for assertions that must see every field
#[cfg(test)]
pub(crate) fn item_fields(items: &[Item]) -> Vec<(i64, i64, &str)> {
    items
        .iter()
        .map(|item| (item.id, item.list_id, item.name.as_str()))
        .collect()
}
