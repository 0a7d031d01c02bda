use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use common::logger::LogFormat;
use scheduler::SchedulerConfig;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Address the HTTP server binds to.
    pub listen_addr: SocketAddr,

    /// Database connection string (PostgreSQL or SQLite).
    pub database_url: String,

    /// Directory served for every path no route claims. `/` maps to its
    /// `index.html`.
    pub static_dir: PathBuf,

    /// Spot symbol whose latest ask is stamped on each observation and
    /// returned by `GET /spot`.
    pub spot_symbol: String,

    /// Buffered events per SSE subscriber before it starts lagging.
    ///
    /// A lagging subscriber skips the oldest snapshots; every snapshot is a
    /// full view, so skipping one loses nothing the next one does not carry.
    pub event_channel_capacity: usize,

    // =========================
    // Flush scheduling
    // =========================
    pub scheduler: SchedulerConfig,

    /// `APP_ENV=production` switches to JSON logs.
    pub log_format: LogFormat,
}

impl AppConfig {
    pub const DEFAULT_PORT: u16 = 3000;
    pub const DEFAULT_STATIC_DIR: &'static str = "public";
    pub const DEFAULT_SPOT_SYMBOL: &'static str = "XAU/CAD";
    pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;
    pub const DEFAULT_SQLITE_URL: &'static str = "sqlite://troy_dev.db?mode=rwc";

    /// Reads the process environment, after loading `.env` if one exists.
    pub fn from_env() -> Result<Self> {
        // A missing .env file is normal outside local development.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let listen_addr = match get("LISTEN_ADDR") {
            Some(addr) => addr
                .parse()
                .with_context(|| format!("invalid LISTEN_ADDR {addr:?}"))?,
            None => {
                let port: u16 = parse_or(&get, "PORT", Self::DEFAULT_PORT)?;
                SocketAddr::from(([0, 0, 0, 0], port))
            }
        };

        let scheduler = SchedulerConfig {
            debounce_interval: millis_or(
                &get,
                "DEBOUNCE_INTERVAL_MS",
                SchedulerConfig::DEFAULT_DEBOUNCE_INTERVAL,
            )?,
            force_flush_interval: millis_or(
                &get,
                "FORCE_FLUSH_INTERVAL_MS",
                SchedulerConfig::DEFAULT_FORCE_FLUSH_INTERVAL,
            )?,
            force_check_interval: millis_or(
                &get,
                "FORCE_CHECK_INTERVAL_MS",
                SchedulerConfig::DEFAULT_FORCE_CHECK_INTERVAL,
            )?,
        };
        scheduler
            .validate()
            .context("invalid scheduler configuration")?;

        let event_channel_capacity: usize = parse_or(
            &get,
            "EVENT_CHANNEL_CAPACITY",
            Self::DEFAULT_EVENT_CHANNEL_CAPACITY,
        )?;
        anyhow::ensure!(
            event_channel_capacity > 0,
            "EVENT_CHANNEL_CAPACITY must be greater than zero"
        );

        let log_format = match get("APP_ENV").as_deref() {
            Some("production") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            listen_addr,
            database_url: database_url(&get),
            static_dir: get("STATIC_DIR")
                .unwrap_or_else(|| Self::DEFAULT_STATIC_DIR.to_string())
                .into(),
            spot_symbol: get("SPOT_SYMBOL").unwrap_or_else(|| Self::DEFAULT_SPOT_SYMBOL.to_string()),
            event_channel_capacity,
            scheduler,
            log_format,
        })
    }
}

/// `DATABASE_URL` wins. Otherwise a PostgreSQL URL is composed from the
/// `DB_*` variables when `DB_HOST` is set, and a local SQLite file is used
/// when it is not.
fn database_url(get: &impl Fn(&str) -> Option<String>) -> String {
    if let Some(url) = get("DATABASE_URL") {
        return url;
    }

    let Some(host) = get("DB_HOST") else {
        return AppConfig::DEFAULT_SQLITE_URL.to_string();
    };

    let user = get("DB_USER").unwrap_or_else(|| "postgres".to_string());
    let port = get("DB_PORT").unwrap_or_else(|| "5432".to_string());
    let name = get("DB_NAME").unwrap_or_else(|| "troy".to_string());

    match get("DB_PASS") {
        Some(pass) => format!("postgres://{user}:{pass}@{host}:{port}/{name}"),
        None => format!("postgres://{user}@{host}:{port}/{name}"),
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {key} {raw:?}")),
        None => Ok(default),
    }
}

fn millis_or(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration> {
    let ms: u64 = parse_or(get, key, default.as_millis() as u64)?;
    Ok(Duration::from_millis(ms))
}
