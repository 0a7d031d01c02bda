use sqlx::AnyPool;

/// Creates the price tables if they do not exist yet.
///
/// The DDL sticks to types both PostgreSQL and SQLite accept so the same
/// statements run in production and in the in-memory test databases.
pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    // Catalogue
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS stores (
  id BIGINT PRIMARY KEY,
  name TEXT NOT NULL,
  url TEXT NOT NULL DEFAULT ''
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS products (
  id BIGINT PRIMARY KEY,
  name TEXT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS store_products (
  store_id BIGINT NOT NULL,
  product_id BIGINT NOT NULL,
  url TEXT NOT NULL DEFAULT '',
  PRIMARY KEY (store_id, product_id)
);
"#,
    )
    .execute(pool)
    .await?;

    // Observations
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS prices_real_time (
  observed_ms BIGINT NOT NULL,
  store_id BIGINT NOT NULL,
  product_id BIGINT NOT NULL,
  source_id BIGINT NOT NULL,
  price DOUBLE PRECISION NOT NULL,
  spot_price DOUBLE PRECISION
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS spot_prices_real_time (
  symbol TEXT NOT NULL,
  ask DOUBLE PRECISION NOT NULL,
  quoted_ms BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_prices_pair_time ON prices_real_time(product_id, store_id, observed_ms);"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_spot_symbol_time ON spot_prices_real_time(symbol, quoted_ms);"#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
