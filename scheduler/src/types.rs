//! Shared types used by the scheduler subsystem.

use std::fmt;

use async_trait::async_trait;
use pricing::{ProductId, Snapshot};

use crate::error::{DataAccessError, TransportError};

/// Produces the current best-price snapshot.
///
/// Implementations re-read persisted state on every call; the scheduler never
/// hands them a payload.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self, product: Option<ProductId>) -> Result<Snapshot, DataAccessError>;
}

/// Fans a snapshot out to every connected subscriber. Best effort.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn broadcast(&self, snapshot: Snapshot) -> Result<(), TransportError>;
}

/// Aggregate scheduler state as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing changed since the last flush.
    Idle,
    /// At least one update is waiting for a flush.
    Pending,
}

/// What caused a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// The stream went quiet for the debounce interval.
    Debounce,
    /// The force-flush ticker found a pending burst older than the bound.
    Force,
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushTrigger::Debounce => f.write_str("debounce"),
            FlushTrigger::Force => f.write_str("force"),
        }
    }
}
