use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use pricing::{PriceStore, ProductId, Snapshot};
use scheduler::{DataAccessError, SnapshotSource};

/// Builds snapshots from persisted state: latest prices and the spot ask,
/// read concurrently.
#[derive(Clone)]
pub struct StoreSnapshotSource {
    store: Arc<dyn PriceStore>,
}

impl StoreSnapshotSource {
    pub fn new(store: Arc<dyn PriceStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SnapshotSource for StoreSnapshotSource {
    #[instrument(skip(self), level = "debug")]
    async fn fetch(&self, product: Option<ProductId>) -> Result<Snapshot, DataAccessError> {
        let (products, spot) =
            tokio::try_join!(self.store.latest_prices(product), self.store.latest_spot())?;

        Ok(Snapshot { products, spot })
    }
}
