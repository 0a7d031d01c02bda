use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use common::logger::init_logger;
use pricing::{PriceStore, SqlPriceStore};
use troy_backend::{
    api::{self, AppState},
    config::AppConfig,
    db::Db,
};

/// Connects, migrates and returns the store every route and flush reads from.
async fn init_store(cfg: &AppConfig) -> anyhow::Result<Arc<dyn PriceStore>> {
    let db = Db::connect(&cfg.database_url).await?;
    db.migrate().await?;

    Ok(Arc::new(SqlPriceStore::new(db.pool, cfg.spot_symbol.clone())))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = AppConfig::from_env()?;
    init_logger("troy-backend", cfg.log_format);

    tracing::info!(
        listen = %cfg.listen_addr,
        static_dir = %cfg.static_dir.display(),
        spot_symbol = %cfg.spot_symbol,
        "Starting price feed backend..."
    );

    let store = init_store(&cfg).await?;
    let state = AppState::new(store, cfg.scheduler, cfg.event_channel_capacity);

    let ticker = state.scheduler.spawn_force_ticker();

    let app = api::router(state, &cfg.static_dir);
    let listener = TcpListener::bind(cfg.listen_addr)
        .await
        .with_context(|| format!("bind {}", cfg.listen_addr))?;

    tracing::info!(addr = %cfg.listen_addr, "Server is running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    ticker.abort();
    Ok(())
}
