use std::time::Duration;

use crate::error::ConfigError;

/// Timing knobs for the coalescing scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Quiet period after the last update before a flush fires.
    /// Every new update pushes the deadline out again.
    pub debounce_interval: Duration,

    /// Upper bound on staleness while updates keep arriving.
    /// A pending burst is flushed once this much time has passed since the
    /// previous flush, even if the stream never goes quiet.
    pub force_flush_interval: Duration,

    /// Period of the background ticker that checks the force-flush bound.
    /// Worst-case latency under continuous load is
    /// `force_flush_interval + force_check_interval`.
    pub force_check_interval: Duration,
}

impl SchedulerConfig {
    pub const DEFAULT_DEBOUNCE_INTERVAL: Duration = Duration::from_secs(10);
    pub const DEFAULT_FORCE_FLUSH_INTERVAL: Duration = Duration::from_secs(30);
    pub const DEFAULT_FORCE_CHECK_INTERVAL: Duration = Duration::from_secs(5);

    /// Longest accepted value for any interval.
    pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("debounce_interval", self.debounce_interval),
            ("force_flush_interval", self.force_flush_interval),
            ("force_check_interval", self.force_check_interval),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ZeroInterval { name });
            }
            if value > Self::MAX_INTERVAL {
                return Err(ConfigError::IntervalTooLarge {
                    name,
                    max: Self::MAX_INTERVAL,
                });
            }
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce_interval: Self::DEFAULT_DEBOUNCE_INTERVAL,
            force_flush_interval: Self::DEFAULT_FORCE_FLUSH_INTERVAL,
            force_check_interval: Self::DEFAULT_FORCE_CHECK_INTERVAL,
        }
    }
}
