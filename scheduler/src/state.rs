//! Internal scheduler state.
//!
//! `SchedulerState` is only ever touched under the engine's mutex, so every
//! method here is a plain synchronous read-modify-write.

use tokio::task::AbortHandle;
use tokio::time::{Duration, Instant};

use crate::types::{FlushTrigger, Phase};

/// The single live debounce timer.
///
/// Owned exclusively by `SchedulerState`. Replacing or clearing it is the only
/// way a timer gets cancelled.
#[derive(Debug)]
pub(crate) struct ArmedTimer {
    generation: u64,
    deadline: Instant,
    handle: AbortHandle,
}

impl ArmedTimer {
    pub(crate) fn new(generation: u64, deadline: Instant, handle: AbortHandle) -> Self {
        Self {
            generation,
            deadline,
            handle,
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Aborts the timer task. A task that already woke up and is waiting on
    /// the state lock is not stopped here; it fails the generation check.
    pub(crate) fn cancel(self) {
        self.handle.abort();
    }
}

#[derive(Debug)]
pub(crate) struct SchedulerState {
    pending: bool,
    last_update: Option<Instant>,
    last_flush: Instant,
    debounce: Option<ArmedTimer>,
    generation: u64,
}

impl SchedulerState {
    /// `started_at` doubles as the first `last_flush`, so the force bound is
    /// measured from process start until the first flush happens.
    pub(crate) fn new(started_at: Instant) -> Self {
        Self {
            pending: false,
            last_update: None,
            last_flush: started_at,
            debounce: None,
            generation: 0,
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        if self.pending {
            Phase::Pending
        } else {
            Phase::Idle
        }
    }

    pub(crate) fn armed_deadline(&self) -> Option<Instant> {
        self.debounce.as_ref().map(ArmedTimer::deadline)
    }

    pub(crate) fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Marks the state pending and installs `timer` as the live debounce
    /// timer. Returns true if a previous timer was cancelled.
    pub(crate) fn record_update(&mut self, now: Instant, timer: ArmedTimer) -> bool {
        debug_assert!(
            self.last_update.is_none_or(|prev| prev <= now),
            "last_update moved backwards"
        );
        debug_assert!(
            self.debounce.as_ref().is_none_or(|t| t.generation() < timer.generation()),
            "debounce generation went backwards"
        );

        self.pending = true;
        self.last_update = Some(now);

        let replaced = match self.debounce.replace(timer) {
            Some(previous) => {
                previous.cancel();
                true
            }
            None => false,
        };

        self.check_invariants();
        replaced
    }

    /// Whether the debounce timer `generation` may flush at `now`.
    pub(crate) fn debounce_due(&self, generation: u64, now: Instant, quiet: Duration) -> bool {
        let is_live = self
            .debounce
            .as_ref()
            .is_some_and(|t| t.generation() == generation);

        let quiet_elapsed = self
            .last_update
            .is_some_and(|at| now.saturating_duration_since(at) >= quiet);

        self.pending && is_live && quiet_elapsed
    }

    /// Whether a pending burst has waited at least `max_latency` since the last flush.
    pub(crate) fn force_due(&self, now: Instant, max_latency: Duration) -> bool {
        self.pending && now.saturating_duration_since(self.last_flush) >= max_latency
    }

    /// Claims the pending burst for one flush.
    ///
    /// Clears `pending`, drops the debounce timer and stamps `last_flush`.
    /// Returns false when nothing is pending, which is how the second of two
    /// racing triggers turns into a no-op.
    pub(crate) fn begin_flush(&mut self, now: Instant, trigger: FlushTrigger) -> bool {
        if !self.pending {
            return false;
        }

        self.pending = false;
        self.last_flush = now;

        if let Some(timer) = self.debounce.take() {
            // A debounce flush runs on the timer task itself; aborting it
            // here would cancel the fetch that is about to start.
            if trigger == FlushTrigger::Force {
                timer.cancel();
            }
        }

        self.check_invariants();
        true
    }

    fn check_invariants(&self) {
        debug_assert!(
            self.debounce.is_none() || self.pending,
            "debounce timer armed while idle"
        );
    }
}
