use std::time::Duration;

use thiserror::Error;

/// The snapshot source could not produce a snapshot.
#[derive(Error, Debug)]
pub enum DataAccessError {
    #[error("snapshot query failed: {0}")]
    Query(String),
}

impl From<anyhow::Error> for DataAccessError {
    fn from(err: anyhow::Error) -> Self {
        DataAccessError::Query(format!("{err:#}"))
    }
}

/// The publisher could not hand the snapshot to any subscriber.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("no subscribers connected")]
    NoSubscribers,

    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name} must be greater than zero")]
    ZeroInterval { name: &'static str },

    #[error("{name} must not exceed {max:?}")]
    IntervalTooLarge { name: &'static str, max: Duration },
}
