//! Snapshot assembly.
//!
//! Turns raw per-store, per-timestamp price rows into the presentation
//! shape: one row per (product, store), grouped by product, cheapest first.
//
//  This module is deliberately pure: no async, no IO.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::model::{PriceRecord, ProductId, ProductPrices, StoreId};

/// Builds the grouped, price-sorted view from an arbitrary row set.
///
/// - Only the most recent row per (product, store) survives. On an exact
///   timestamp tie the row seen first wins.
/// - Rows are grouped by product id.
/// - Each group is sorted ascending by price; equal prices keep the order in
///   which their (product, store) pair was first seen (stable sort).
pub fn assemble_snapshot<I>(rows: I) -> ProductPrices
where
    I: IntoIterator<Item = PriceRecord>,
{
    let mut latest: Vec<PriceRecord> = Vec::new();
    let mut slots: HashMap<(ProductId, StoreId), usize> = HashMap::new();

    for row in rows {
        match slots.entry((row.product_id, row.store_id)) {
            Entry::Occupied(slot) => {
                let current = &mut latest[*slot.get()];
                if row.timestamp > current.timestamp {
                    *current = row;
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(latest.len());
                latest.push(row);
            }
        }
    }

    let mut grouped = ProductPrices::new();
    for row in latest {
        grouped.entry(row.product_id).or_default().push(row);
    }

    for group in grouped.values_mut() {
        group.sort_by(|a, b| a.price.total_cmp(&b.price));
    }

    grouped
}
