//! The coalescing scheduler engine.
//!
//! Two independent triggers bound flush latency:
//!   1. A debounce timer, re-armed on every update, flushes once the stream
//!      has been quiet for `debounce_interval`.
//!   2. A periodic force ticker flushes a pending burst once
//!      `force_flush_interval` has passed since the previous flush, so a
//!      stream that never goes quiet is still published.
//!
//! All three events (update, debounce fire, force tick) serialize on one
//! mutex. The state transition that claims a flush happens under that mutex;
//! the fetch and broadcast run after it is released, so a slow database or
//! transport never blocks `notify_update`.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep_until};
use tracing::{debug, error, info, instrument, trace, warn};

use common::logger::warn_if_slow;

use crate::config::SchedulerConfig;
use crate::metrics::SchedulerCounters;
use crate::state::{ArmedTimer, SchedulerState};
use crate::types::{FlushTrigger, Phase, Publisher, SnapshotSource};

const SLOW_FETCH: Duration = Duration::from_millis(500);

/// Deadline used when `now + debounce_interval` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Turns a bursty stream of update signals into bounded-rate snapshot flushes.
///
/// Cheap to clone; clones share one state. `notify_update` spawns the
/// debounce timer, so it must be called from within a Tokio runtime.
#[derive(Clone)]
pub struct CoalescingScheduler {
    shared: Arc<Shared>,
}

struct Shared {
    cfg: SchedulerConfig,
    state: Mutex<SchedulerState>,
    source: Arc<dyn SnapshotSource>,
    publisher: Arc<dyn Publisher>,
    counters: SchedulerCounters,
}

impl CoalescingScheduler {
    pub fn new(
        cfg: SchedulerConfig,
        source: Arc<dyn SnapshotSource>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                cfg,
                state: Mutex::new(SchedulerState::new(Instant::now())),
                source,
                publisher,
                counters: SchedulerCounters::default(),
            }),
        }
    }

    pub fn counters(&self) -> &SchedulerCounters {
        &self.shared.counters
    }

    pub fn phase(&self) -> Phase {
        self.shared.state.lock().phase()
    }

    /// Deadline of the live debounce timer, if one is armed.
    pub fn debounce_deadline(&self) -> Option<Instant> {
        self.shared.state.lock().armed_deadline()
    }

    /// Signals that persisted prices changed.
    ///
    /// Marks the state pending and (re)arms the debounce timer, cancelling the
    /// previous one. Never blocks on I/O and never fails.
    pub fn notify_update(&self) {
        let (generation, replaced) = {
            let mut state = self.shared.state.lock();

            // Read under the lock so timestamps follow generation order.
            let now = Instant::now();
            let deadline = deadline_after(now, self.shared.cfg.debounce_interval);
            let generation = state.next_generation();

            let shared = Arc::clone(&self.shared);
            let task = tokio::spawn(async move {
                sleep_until(deadline).await;
                shared.on_debounce_fire(generation).await;
            });

            let timer = ArmedTimer::new(generation, deadline, task.abort_handle());
            (generation, state.record_update(now, timer))
        };

        SchedulerCounters::bump(&self.shared.counters.notifications);
        if replaced {
            SchedulerCounters::bump(&self.shared.counters.cancelled_timers);
        }

        trace!(generation, replaced, "debounce timer armed");
    }

    /// One force-flush check. Flushes if an update is pending and the last
    /// flush is at least `force_flush_interval` old.
    ///
    /// Returns whether this tick performed a flush.
    pub async fn force_flush_tick(&self) -> bool {
        self.shared.on_force_tick().await
    }

    /// Starts the background force-flush ticker.
    ///
    /// The first tick fires immediately; missed ticks are skipped rather than
    /// replayed in a burst.
    pub fn spawn_force_ticker(&self) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);

        tokio::spawn(async move {
            let period = shared.cfg.force_check_interval;
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(
                every_ms = period.as_millis() as u64,
                force_after_ms = shared.cfg.force_flush_interval.as_millis() as u64,
                "force-flush ticker started"
            );

            loop {
                ticker.tick().await;
                shared.on_force_tick().await;
            }
        })
    }
}

fn deadline_after(now: Instant, quiet: Duration) -> Instant {
    now.checked_add(quiet)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

impl Shared {
    async fn on_debounce_fire(&self, generation: u64) -> bool {
        let now = Instant::now();

        let claimed = {
            let mut state = self.state.lock();
            state.debounce_due(generation, now, self.cfg.debounce_interval)
                && state.begin_flush(now, FlushTrigger::Debounce)
        };

        if !claimed {
            trace!(generation, "debounce timer superseded; no flush");
            return false;
        }

        SchedulerCounters::bump(&self.counters.debounce_flushes);
        self.publish_snapshot(FlushTrigger::Debounce).await;
        true
    }

    async fn on_force_tick(&self) -> bool {
        let now = Instant::now();

        let claimed = {
            let mut state = self.state.lock();
            state.force_due(now, self.cfg.force_flush_interval)
                && state.begin_flush(now, FlushTrigger::Force)
        };

        if !claimed {
            return false;
        }

        SchedulerCounters::bump(&self.counters.force_flushes);
        self.publish_snapshot(FlushTrigger::Force).await;
        true
    }

    /// Fetch + broadcast for a flush that was already claimed.
    ///
    /// Failures are logged and counted, never retried: `pending` stays clear
    /// and the next update starts a fresh cycle.
    #[instrument(skip_all, target = "scheduler", fields(trigger = %trigger))]
    async fn publish_snapshot(&self, trigger: FlushTrigger) {
        debug!("flushing snapshot");

        let fetched = warn_if_slow("snapshot_fetch", SLOW_FETCH, self.source.fetch(None)).await;

        let snapshot = match fetched {
            Ok(s) => s,
            Err(e) => {
                SchedulerCounters::bump(&self.counters.failed_fetches);
                error!(error = %e, "snapshot fetch failed; flush abandoned");
                return;
            }
        };

        let records = snapshot.record_count();

        match self.publisher.broadcast(snapshot).await {
            Ok(()) => info!(records, "snapshot published"),
            Err(e) => {
                SchedulerCounters::bump(&self.counters.failed_broadcasts);
                warn!(error = %e, records, "snapshot broadcast failed");
            }
        }
    }
}
