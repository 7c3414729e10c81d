//! Normalization of raw records into items

use super::{Item, RawRecord};

/// Maps raw records to validated, sorted items
///
/// Records with a missing or empty name are dropped. The rest are sorted by
/// `listId` then by `name`, comparing names byte-wise. The sort is stable, so
/// exact ties keep their input order.
pub fn normalize(raw: Vec<RawRecord>) -> Vec<Item> {
    let mut items: Vec<Item> = raw
        .into_iter()
        .filter_map(|record| match record.name {
            Some(name) if !name.is_empty() => Some(Item {
                id: record.id,
                list_id: record.list_id,
                name,
            }),
            _ => None,
        })
        .collect();

    items.sort_by(|a, b| {
        a.list_id
            .cmp(&b.list_id)
            .then_with(|| a.name.as_bytes().cmp(b.name.as_bytes()))
    });
    items
}
