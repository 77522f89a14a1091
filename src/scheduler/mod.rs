//! Expiry scheduler for TTL-bearing caches.
//!
//! Holds `(expires_at, reap)` entries in one queue sorted soonest-first and
//! runs at most one timer at a time: the driver pops the soonest entry,
//! sleeps until it is due, fires its reap callback and moves on to the next.
//!
//! Registration is deferred. [`ExpiryScheduler::schedule`] only buffers the
//! entry; a flush step (a spawned task for the tokio driver, an explicit
//! [`ExpiryScheduler::flush`] for the manual one) merges the whole burst
//! into the queue with a single sort.
//!
//! There is no cancellation. An entry fires even if the cache it targets
//! has been cleared or refilled since, so reap callbacks must tolerate
//! that.

mod clock;

pub use clock::{Clock, ManualClock, TokioClock};

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::debug;

use crate::sync::lock;

/// Callback fired when an entry becomes due.
pub type ReapCallback = Box<dyn FnOnce() + Send + 'static>;

struct ExpiryEntry {
    expires_at: u64,
    reap: ReapCallback,
}

#[derive(Default)]
struct SchedulerState {
    /// Entries registered since the last flush.
    incoming: Vec<ExpiryEntry>,

    /// Entries visible to the driver, ascending by `expires_at`.
    queue: VecDeque<ExpiryEntry>,

    flush_pending: bool,
    timer_armed: bool,
}

impl SchedulerState {
    /// Moves buffered entries into the sorted queue.
    fn merge_incoming(&mut self) -> usize {
        let merged = self.incoming.len();
        if merged == 0 {
            return 0;
        }

        self.queue.extend(self.incoming.drain(..));
        // stable: equal timestamps keep registration order
        self.queue.make_contiguous().sort_by_key(|e| e.expires_at);
        merged
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Driver {
    Tokio,
    Manual,
}

struct Inner {
    state: Mutex<SchedulerState>,
    clock: Arc<dyn Clock>,
    driver: Driver,
}

/// Shared handle to an expiry queue. Clones refer to the same queue.
#[derive(Clone)]
pub struct ExpiryScheduler {
    inner: Arc<Inner>,
}

impl ExpiryScheduler {
    /// Scheduler driven by tokio timers.
    ///
    /// Entries registered outside a tokio runtime stay buffered until
    /// [`ExpiryScheduler::run_due`] is called; expired results are still
    /// rejected on access.
    pub fn tokio() -> Self {
        Self::with_clock(Arc::new(TokioClock::new()), Driver::Tokio)
    }

    /// Scheduler that never arms timers; call [`ExpiryScheduler::run_due`].
    pub fn manual(clock: ManualClock) -> Self {
        Self::with_clock(Arc::new(clock), Driver::Manual)
    }

    /// Process-wide tokio scheduler used when none is injected.
    pub fn shared() -> Self {
        static SHARED: OnceLock<ExpiryScheduler> = OnceLock::new();
        SHARED.get_or_init(Self::tokio).clone()
    }

    fn with_clock(clock: Arc<dyn Clock>, driver: Driver) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SchedulerState::default()),
                clock,
                driver,
            }),
        }
    }

    /// Current time on this scheduler's clock, in milliseconds.
    pub fn now_ms(&self) -> u64 {
        self.inner.clock.now_ms()
    }

    /// Returns true for schedulers created with [`ExpiryScheduler::manual`].
    pub fn is_manual(&self) -> bool {
        self.inner.driver == Driver::Manual
    }

    /// Registers `reap` to run once `now_ms() >= expires_at`.
    ///
    /// The entry is not visible to the driver until the deferred flush ran.
    pub fn schedule(&self, expires_at: u64, reap: impl FnOnce() + Send + 'static) {
        let handle = {
            let mut state = lock(&self.inner.state);
            state.incoming.push(ExpiryEntry {
                expires_at,
                reap: Box::new(reap),
            });

            if self.inner.driver != Driver::Tokio || state.flush_pending {
                return;
            }

            match Handle::try_current() {
                Ok(handle) => {
                    state.flush_pending = true;
                    handle
                }
                Err(_) => {
                    debug!(expires_at, "No tokio runtime, expiry entry stays buffered");
                    return;
                }
            }
        };

        // built before spawning so a task dropped unpolled still resets;
        // spawned unlocked because that drop takes the state lock
        let task = DriverTask::new(self.clone());
        handle.spawn(task.run());
    }

    /// Applies buffered registrations. Returns how many were merged.
    pub fn flush(&self) -> usize {
        let merged = lock(&self.inner.state).merge_incoming();
        if merged > 0 {
            debug!(merged, "Expiry queue flushed");
        }
        merged
    }

    /// Fires every entry due at the current time, soonest first.
    ///
    /// Buffered registrations are flushed first. Returns the number fired.
    pub fn run_due(&self) -> usize {
        let now = self.now_ms();
        let due: Vec<ExpiryEntry> = {
            let mut state = lock(&self.inner.state);
            state.merge_incoming();
            let count = state
                .queue
                .iter()
                .take_while(|e| e.expires_at <= now)
                .count();
            state.queue.drain(..count).collect()
        };

        let fired = due.len();
        for entry in due {
            debug!(expires_at = entry.expires_at, now, "Reaping expired cache");
            (entry.reap)();
        }
        fired
    }

    /// Entries in the sorted queue (excludes unflushed registrations and
    /// the entry the timer is currently waiting on).
    pub fn pending(&self) -> usize {
        lock(&self.inner.state).queue.len()
    }
}

/// Flush-and-drive task of the tokio driver.
///
/// The task lives on whichever runtime called [`ExpiryScheduler::schedule`].
/// When that runtime shuts down the task is dropped mid-flight; dropping it
/// releases `flush_pending`/`timer_armed` and requeues the entry it was
/// waiting on, so the next `schedule` from any runtime arms a new timer.
struct DriverTask {
    scheduler: ExpiryScheduler,
    flushing: bool,
    driving: bool,
    current: Option<ExpiryEntry>,
}

impl DriverTask {
    fn new(scheduler: ExpiryScheduler) -> Self {
        Self {
            scheduler,
            flushing: true,
            driving: false,
            current: None,
        }
    }

    async fn run(mut self) {
        if self.flush_and_arm() {
            self.drive().await;
        }
    }

    /// Flush step. Returns true when this task must become the timer.
    fn flush_and_arm(&mut self) -> bool {
        let mut state = lock(&self.scheduler.inner.state);
        let merged = state.merge_incoming();
        state.flush_pending = false;
        self.flushing = false;
        debug!(merged, queued = state.queue.len(), "Expiry queue flushed");

        if state.timer_armed || state.queue.is_empty() {
            return false;
        }
        state.timer_armed = true;
        self.driving = true;
        true
    }

    /// Single timer loop: one entry at a time until the queue drains.
    async fn drive(&mut self) {
        loop {
            let expires_at = {
                let mut state = lock(&self.scheduler.inner.state);
                match state.queue.pop_front() {
                    Some(entry) => {
                        let expires_at = entry.expires_at;
                        self.current = Some(entry);
                        expires_at
                    }
                    None => {
                        state.timer_armed = false;
                        self.driving = false;
                        return;
                    }
                }
            };

            let delay = expires_at.saturating_sub(self.scheduler.now_ms());
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            if let Some(entry) = self.current.take() {
                debug!(expires_at, "Reaping expired cache");
                (entry.reap)();
            }
        }
    }
}

impl Drop for DriverTask {
    fn drop(&mut self) {
        if !self.flushing && !self.driving {
            return;
        }

        let mut state = lock(&self.scheduler.inner.state);
        if self.flushing {
            state.flush_pending = false;
        }
        if self.driving {
            state.timer_armed = false;
        }
        if let Some(entry) = self.current.take() {
            state.incoming.push(entry);
            state.merge_incoming();
        }
        debug!(queued = state.queue.len(), "Expiry driver stopped before draining");
    }
}

impl fmt::Debug for ExpiryScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("ExpiryScheduler")
            .field("driver", &self.inner.driver)
            .field("clock", &self.inner.clock)
            .field("incoming", &state.incoming.len())
            .field("pending", &state.queue.len())
            .field("timer_armed", &state.timer_armed)
            .finish()
    }
}
