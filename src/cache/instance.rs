//! Cache instance: one bounded result cache plus the shared selector core.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

use crate::cache::detector::ChangeDetector;
use crate::cache::equality::EqualityPolicy;
use crate::cache::slots::{BoundedResultCache, Computed};
use crate::cache::stats::StatsRecorder;
use crate::scheduler::ExpiryScheduler;
use crate::sync::lock;
use crate::types::{FieldMap, Value};

pub(crate) type TransformFn<R> = dyn Fn(&FieldMap, &[Value]) -> R + Send + Sync;

/// Configuration frozen at build time, shared by every instance of a selector.
pub(crate) struct SelectorCore<I, R> {
    pub(crate) name: Arc<str>,
    pub(crate) detector: ChangeDetector<I>,
    pub(crate) transform: Arc<TransformFn<R>>,
    pub(crate) equality: EqualityPolicy<I>,
    pub(crate) capacity: usize,
    pub(crate) ttl: Option<Duration>,
    /// Present iff `ttl` is set.
    pub(crate) scheduler: Option<ExpiryScheduler>,
    pub(crate) stats: StatsRecorder,
}

impl<I, R> SelectorCore<I, R> {
    fn now_ms(&self) -> u64 {
        self.scheduler.as_ref().map_or(0, ExpiryScheduler::now_ms)
    }

    fn ttl_ms(&self) -> Option<u64> {
        self.ttl
            .map(|ttl| u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX))
    }
}

/// A callable cache for one key tuple.
///
/// Cloning is cheap; clones share the same result slots. User functions run
/// while the instance is locked, so they must not call back into the same
/// instance.
pub struct CacheInstance<I, R> {
    core: Arc<SelectorCore<I, R>>,
    slots: Arc<Mutex<BoundedResultCache<I, R>>>,
    key: Arc<[Value]>,
}

impl<I, R> Clone for CacheInstance<I, R> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            slots: self.slots.clone(),
            key: self.key.clone(),
        }
    }
}

impl<I, R> CacheInstance<I, R>
where
    I: Clone + Send + 'static,
    R: Send + Sync + 'static,
{
    pub(crate) fn new(core: Arc<SelectorCore<I, R>>, key: Arc<[Value]>) -> Self {
        let slots = BoundedResultCache::new(core.capacity);
        Self {
            core,
            slots: Arc::new(Mutex::new(slots)),
            key,
        }
    }

    /// Returns the cached result for `input`, recomputing when needed.
    ///
    /// Input functions run on every call. The result transform only runs
    /// when the slot is new or expired, or some field changed identity; if
    /// nothing changed the very same `Arc` is returned.
    ///
    /// A panic in a user function propagates and leaves the previous result
    /// of the slot untouched. Slot promotion and eviction happen before any
    /// user function runs, so a new input that panics has still pushed out
    /// the oldest slot when the cache was full.
    pub fn call(&self, input: &I) -> Arc<R> {
        let core = &self.core;
        let now = core.now_ms();

        let mut slots = lock(&self.slots);
        let (slot, lookup) = slots.insert_or_promote(input, &core.equality);
        if lookup.evicted {
            core.stats.record_eviction();
            debug!(selector = %core.name, capacity = core.capacity, "Evicted oldest result slot");
        }
        if lookup.created {
            debug!(selector = %core.name, "Created result slot");
        }

        let detection = {
            let previous = slot.live(now).map(|computed| &computed.fields);
            core.detector.detect(previous, input, &self.key)
        };

        if !detection.changed {
            if let Some(computed) = slot.live(now) {
                core.stats.record_hit();
                return computed.result.clone();
            }
        }

        let result = Arc::new((core.transform)(&detection.fields, &self.key));
        slot.computed = Some(Computed {
            fields: detection.fields,
            result: result.clone(),
        });
        slot.expires_at = None;
        core.stats.record_miss();
        debug!(selector = %core.name, key_len = self.key.len(), "Recomputed result");

        if let (Some(ttl), Some(scheduler)) = (core.ttl_ms(), core.scheduler.as_ref()) {
            let expires_at = now.saturating_add(ttl);
            slot.expires_at = Some(expires_at);
            scheduler.schedule(expires_at, self.reaper());
        }

        result
    }

    /// Reap callback: clears the whole cache if it still exists.
    fn reaper(&self) -> impl FnOnce() + Send + 'static {
        let slots = Arc::downgrade(&self.slots);
        let core = Arc::downgrade(&self.core);
        move || {
            let Some(slots) = slots.upgrade() else {
                return;
            };
            let dropped = lock(&slots).clear();
            if dropped == 0 {
                return;
            }
            if let Some(core) = core.upgrade() {
                core.stats.record_expiration();
                debug!(selector = %core.name, dropped, "TTL elapsed, cache cleared");
            }
        }
    }
}

impl<I, R> CacheInstance<I, R> {
    /// Drops every cached result of this instance.
    pub fn clear(&self) {
        lock(&self.slots).clear();
    }

    /// Number of result slots currently held.
    pub fn len(&self) -> usize {
        lock(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.slots).is_empty()
    }

    /// The key tuple this instance serves (empty when unkeyed).
    pub fn key(&self) -> &[Value] {
        &self.key
    }

    pub(crate) fn core(&self) -> &Arc<SelectorCore<I, R>> {
        &self.core
    }
}

impl<I, R> fmt::Debug for CacheInstance<I, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheInstance")
            .field("selector", &self.core.name)
            .field("key", &self.key)
            .field("slots", &self.len())
            .finish()
    }
}
