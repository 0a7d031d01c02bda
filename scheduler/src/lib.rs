//! Update-coalescing notification scheduler.
//!
//! Write paths call [`CoalescingScheduler::notify_update`] after every
//! persisted observation. The scheduler turns that bursty signal into a
//! bounded-rate stream of flushes, each of which fetches a fresh snapshot
//! and hands it to the publisher.

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
mod state;
pub mod types;

pub use config::SchedulerConfig;
pub use engine::CoalescingScheduler;
pub use error::{ConfigError, DataAccessError, TransportError};
pub use metrics::SchedulerCounters;
pub use types::{FlushTrigger, Phase, Publisher, SnapshotSource};
