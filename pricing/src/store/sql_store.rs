//! SQL-backed `PriceStore`.
//!
//! Runs on the sqlx `Any` driver so one implementation serves PostgreSQL in
//! production and SQLite in tests. Only types both backends share are bound
//! or decoded: `i64`, `f64`, `String`. Timestamps travel as epoch milliseconds.

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{AnyPool, Row};
use tracing::{debug, instrument};

use super::PriceStore;
use crate::model::{Observation, PriceRecord, ProductId, StoreId};

const LATEST_ROWS_SQL: &str = r#"
SELECT
  pr.store_id, pr.product_id, pr.price, pr.spot_price, pr.observed_ms,
  s.name AS store_name, s.url AS store_url,
  p.name AS product_name, sp.url AS product_url
FROM prices_real_time pr
JOIN stores s ON s.id = pr.store_id
JOIN products p ON p.id = pr.product_id
JOIN store_products sp ON sp.store_id = pr.store_id AND sp.product_id = pr.product_id
WHERE pr.observed_ms = (
  SELECT MAX(latest.observed_ms)
  FROM prices_real_time latest
  WHERE latest.store_id = pr.store_id AND latest.product_id = pr.product_id
)
"#;

pub struct SqlPriceStore {
    pool: AnyPool,
    spot_symbol: String,
}

impl SqlPriceStore {
    pub fn new(pool: AnyPool, spot_symbol: impl Into<String>) -> Self {
        Self {
            pool,
            spot_symbol: spot_symbol.into(),
        }
    }

    pub async fn upsert_store(&self, id: StoreId, name: &str, url: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
INSERT INTO stores (id, name, url) VALUES ($1, $2, $3)
ON CONFLICT (id) DO UPDATE SET name = excluded.name, url = excluded.url;
"#,
        )
        .bind(id)
        .bind(name)
        .bind(url)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn upsert_product(&self, id: ProductId, name: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
INSERT INTO products (id, name) VALUES ($1, $2)
ON CONFLICT (id) DO UPDATE SET name = excluded.name;
"#,
        )
        .bind(id)
        .bind(name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Lists `product_id` as sold by `store_id` at `url`.
    pub async fn link_store_product(
        &self,
        store_id: StoreId,
        product_id: ProductId,
        url: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
INSERT INTO store_products (store_id, product_id, url) VALUES ($1, $2, $3)
ON CONFLICT (store_id, product_id) DO UPDATE SET url = excluded.url;
"#,
        )
        .bind(store_id)
        .bind(product_id)
        .bind(url)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Appends a spot quote for the configured symbol.
    pub async fn record_spot(&self, ask: f64, quoted_at: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query(
            r#"
INSERT INTO spot_prices_real_time (symbol, ask, quoted_ms) VALUES ($1, $2, $3);
"#,
        )
        .bind(self.spot_symbol.as_str())
        .bind(ask)
        .bind(quoted_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl PriceStore for SqlPriceStore {
    #[instrument(
        skip(self, observation),
        fields(store_id = observation.store_id, product_id = observation.product_id),
        level = "debug"
    )]
    async fn record_observation(&self, observation: &Observation) -> anyhow::Result<()> {
        sqlx::query(
            r#"
INSERT INTO prices_real_time (observed_ms, store_id, product_id, source_id, price, spot_price)
VALUES ($1, $2, $3, $4, $5, (
  SELECT ask
  FROM spot_prices_real_time
  WHERE symbol = $6
  ORDER BY quoted_ms DESC
  LIMIT 1
));
"#,
        )
        .bind(observation.observed_at.timestamp_millis())
        .bind(observation.store_id)
        .bind(observation.product_id)
        .bind(observation.source_id)
        .bind(observation.price)
        .bind(self.spot_symbol.as_str())
        .execute(&self.pool)
        .await
        .context("insert price observation")?;

        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn latest_rows(&self, product: Option<ProductId>) -> anyhow::Result<Vec<PriceRecord>> {
        let rows = match product {
            Some(product_id) => {
                let sql = format!(
                    "{LATEST_ROWS_SQL} AND pr.product_id = $1 ORDER BY pr.product_id, pr.store_id, pr.observed_ms DESC"
                );
                sqlx::query(&sql)
                    .bind(product_id)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "{LATEST_ROWS_SQL} ORDER BY pr.product_id, pr.store_id, pr.observed_ms DESC"
                );
                sqlx::query(&sql).fetch_all(&self.pool).await?
            }
        };

        // A row that does not decode fails the read; publishing a snapshot
        // with a store silently missing would look like a delisting.
        let out = rows
            .iter()
            .map(row_to_record)
            .collect::<anyhow::Result<Vec<_>>>()
            .context("decode latest price row")?;

        debug!(rows = out.len(), "latest price rows loaded");
        Ok(out)
    }

    async fn latest_spot(&self) -> anyhow::Result<Option<f64>> {
        let row = sqlx::query(
            r#"
SELECT ask
FROM spot_prices_real_time
WHERE symbol = $1
ORDER BY quoted_ms DESC
LIMIT 1;
"#,
        )
        .bind(self.spot_symbol.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(r.try_get::<f64, _>("ask")?)),
            None => Ok(None),
        }
    }
}

/* =========================
Row mapping
========================= */

fn row_to_record(r: &sqlx::any::AnyRow) -> anyhow::Result<PriceRecord> {
    let observed_ms: i64 = r.try_get("observed_ms")?;

    Ok(PriceRecord {
        store_id: r.try_get("store_id")?,
        product_id: r.try_get("product_id")?,
        price: r.try_get("price")?,
        spot_price: r.try_get::<Option<f64>, _>("spot_price")?,
        timestamp: ms_to_datetime(observed_ms)?,
        store_name: r.try_get("store_name")?,
        store_url: r.try_get("store_url")?,
        product_name: r.try_get("product_name")?,
        product_url: r.try_get("product_url")?,
    })
}

fn ms_to_datetime(ms: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| anyhow!("timestamp out of range: {ms}"))
}
