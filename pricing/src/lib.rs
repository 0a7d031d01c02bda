//! Price domain: observations, latest-price snapshots and their persistence.

pub mod assembly;
pub mod model;
pub mod schema;
pub mod store;

pub use assembly::assemble_snapshot;
pub use model::{
    Observation, PriceRecord, ProductId, ProductPrices, Snapshot, SourceId, StoreId,
};
pub use store::{PriceStore, sql_store::SqlPriceStore};
