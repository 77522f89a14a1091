//! Selector statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of a selector's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectorStats {
    /// Calls made through any cache instance of the selector.
    pub calls: u64,

    /// Calls answered with the previously computed result.
    pub hits: u64,

    /// Calls that ran the result transform.
    pub misses: u64,

    /// Result slots dropped because a cache was over capacity.
    pub evictions: u64,

    /// Reaps that cleared a non-empty cache.
    pub expirations: u64,

    /// Times the key tree was reset because `max_keys` was reached.
    pub key_resets: u64,
}

impl SelectorStats {
    /// Hit rate over all calls.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Live counters, shared by every cache instance of one selector.
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    calls: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    key_resets: AtomicU64,
}

impl StatsRecorder {
    pub(crate) fn record_hit(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_expiration(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_key_reset(&self) {
        self.key_resets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> SelectorStats {
        SelectorStats {
            calls: self.calls.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            key_resets: self.key_resets.load(Ordering::Relaxed),
        }
    }
}
