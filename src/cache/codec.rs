//! Versioned string encoding for the cached item list

use serde::{Deserialize, Serialize};

use crate::data::Item;

/// Current schema version written by [`encode_items`]
pub const ITEMS_SCHEMA_VERSION: u32 = 1;

#[derive(Serialize)]
struct EncodedItems<'a> {
    version: u32,
    items: &'a [Item],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredItems {
    Versioned { version: u32, items: Vec<Item> },
    /// Unversioned bare array, also the value of a store that was never written
    Legacy(Vec<Item>),
}

/// Encodes items as `{"version":1,"items":[...]}`
pub fn encode_items(items: &[Item]) -> Result<String, serde_json::Error> {
    serde_json::to_string(&EncodedItems {
        version: ITEMS_SCHEMA_VERSION,
        items,
    })
}

/// Decodes a stored item list
///
/// Returns `None` for malformed payloads and for schema versions this build
/// does not know how to read.
pub fn decode_items(encoded: &str) -> Option<Vec<Item>> {
    match serde_json::from_str::<StoredItems>(encoded).ok()? {
        StoredItems::Versioned { version, items } if version == ITEMS_SCHEMA_VERSION => {
            Some(items)
        }
        StoredItems::Versioned { .. } => None,
        StoredItems::Legacy(items) => Some(items),
    }
}
