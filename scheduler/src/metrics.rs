use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Minimal counters for operational visibility.
#[derive(Clone, Default, Debug)]
pub struct SchedulerCounters {
    pub notifications: Arc<AtomicU64>,
    pub cancelled_timers: Arc<AtomicU64>,

    pub debounce_flushes: Arc<AtomicU64>,
    pub force_flushes: Arc<AtomicU64>,

    // flush outcomes
    pub failed_fetches: Arc<AtomicU64>,
    pub failed_broadcasts: Arc<AtomicU64>,
}

impl SchedulerCounters {
    pub fn flushes(&self) -> u64 {
        self.debounce_flushes.load(Ordering::Relaxed) + self.force_flushes.load(Ordering::Relaxed)
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
