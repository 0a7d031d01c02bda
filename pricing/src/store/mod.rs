pub mod sql_store;

use async_trait::async_trait;

use crate::assembly::assemble_snapshot;
use crate::model::{Observation, PriceRecord, ProductId, ProductPrices};

/// Persistence seam for observations and the reads the snapshot is built from.
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Persists one observation, stamping it with the current spot ask.
    async fn record_observation(&self, observation: &Observation) -> anyhow::Result<()>;

    /// Latest row per (product, store), optionally restricted to one product,
    /// ordered by product id then store id.
    async fn latest_rows(&self, product: Option<ProductId>) -> anyhow::Result<Vec<PriceRecord>>;

    /// Most recent spot ask for the configured symbol, if any was ever quoted.
    async fn latest_spot(&self) -> anyhow::Result<Option<f64>>;

    async fn latest_prices(&self, product: Option<ProductId>) -> anyhow::Result<ProductPrices> {
        let rows = self.latest_rows(product).await?;
        Ok(assemble_snapshot(rows))
    }
}
