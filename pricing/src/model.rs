use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ProductId = i64;
pub type StoreId = i64;
pub type SourceId = i64;

/// Best-known price of one product at one store, with the display fields
/// joined in from the catalogue tables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub store_id: StoreId,
    pub product_id: ProductId,
    pub price: f64,

    /// Spot ask captured when the observation was written.
    pub spot_price: Option<f64>,

    pub timestamp: DateTime<Utc>,

    pub store_name: String,
    pub store_url: String,
    pub product_name: String,
    pub product_url: String,
}

/// Latest records grouped by product, each group sorted ascending by price.
pub type ProductPrices = BTreeMap<ProductId, Vec<PriceRecord>>;

/// Immutable view pushed to subscribers on every flush and served by `GET /prices`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub products: ProductPrices,
    pub spot: Option<f64>,
}

impl Snapshot {
    pub fn record_count(&self) -> usize {
        self.products.values().map(Vec::len).sum()
    }
}

/// A validated price observation ready to be persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    pub source_id: SourceId,
    pub observed_at: DateTime<Utc>,
    pub store_id: StoreId,
    pub product_id: ProductId,
    pub price: f64,
}
