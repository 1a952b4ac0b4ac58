//! Helpers for collections sorted by an explicit `order_position`.

use crate::entity::Ordered;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One `(id, position)` pair of a reorder request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderEntry {
    pub id: String,
    pub order_position: i64,
}

impl ReorderEntry {
    pub fn new(id: impl Into<String>, order_position: i64) -> Self {
        Self {
            id: id.into(),
            order_position,
        }
    }
}

/// Stable ascending sort by `order_position`.
pub fn sort_by_position<T: Ordered>(items: &mut [T]) {
    items.sort_by_key(|item| item.order_position());
}

/// Upsert by id, then restore position order.
pub fn insert_sorted<T: Ordered>(items: &mut Vec<T>, entity: T) {
    match items.iter().position(|item| item.id() == entity.id()) {
        Some(at) => items[at] = entity,
        None => items.push(entity),
    }
    sort_by_position(items);
}

/// Apply new positions to the matching entities and re-sort.
///
/// Entries naming ids that are not present are skipped. Returns how many
/// entities were updated.
pub fn apply_positions<T: Ordered>(items: &mut [T], entries: &[ReorderEntry]) -> usize {
    let positions: HashMap<&str, i64> = entries
        .iter()
        .map(|e| (e.id.as_str(), e.order_position))
        .collect();

    let mut updated = 0;
    for item in items.iter_mut() {
        if let Some(&position) = positions.get(item.id()) {
            item.set_order_position(position);
            updated += 1;
        }
    }

    sort_by_position(items);
    updated
}

/// Position for an entity appended after the current last one.
pub fn next_position<T: Ordered>(items: &[T]) -> i64 {
    items
        .iter()
        .map(|item| item.order_position())
        .max()
        .map_or(1, |max| max + 1)
}
