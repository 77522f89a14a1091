//! Bounded result cache: the result slots of one cache instance.
//!
//! Slots are kept most-recent-first. A lookup that matches promotes the
//! slot to the front; a miss pushes a fresh slot to the front and drops the
//! back one when the capacity is exceeded. Capacity `0` disables eviction.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::cache::equality::EqualityPolicy;
use crate::types::FieldMap;

/// Field map and result produced together by one recomputation.
pub(crate) struct Computed<R> {
    pub(crate) fields: FieldMap,
    pub(crate) result: Arc<R>,
}

/// One cached computation.
pub(crate) struct ResultSlot<I, R> {
    pub(crate) input: I,
    pub(crate) computed: Option<Computed<R>>,
    /// `None` until a TTL-bearing computation armed it.
    pub(crate) expires_at: Option<u64>,
}

impl<I, R> ResultSlot<I, R> {
    fn new(input: I) -> Self {
        Self {
            input,
            computed: None,
            expires_at: None,
        }
    }

    /// True once the armed expiry is not in the future anymore.
    pub(crate) fn is_expired(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }

    /// The computation, if there is one and it has not expired.
    pub(crate) fn live(&self, now: u64) -> Option<&Computed<R>> {
        if self.is_expired(now) {
            None
        } else {
            self.computed.as_ref()
        }
    }
}

/// What [`BoundedResultCache::insert_or_promote`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotLookup {
    pub(crate) created: bool,
    pub(crate) evicted: bool,
}

pub(crate) struct BoundedResultCache<I, R> {
    slots: VecDeque<ResultSlot<I, R>>,
    capacity: usize,
}

impl<I: Clone, R> BoundedResultCache<I, R> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            slots: VecDeque::new(),
            capacity,
        }
    }

    /// Position of the first slot whose input matches, scanning from the
    /// most recent.
    pub(crate) fn find(&self, input: &I, eq: &EqualityPolicy<I>) -> Option<usize> {
        self.slots.iter().position(|slot| eq.matches(&slot.input, input))
    }

    /// Returns the slot for `input`, now at the front.
    pub(crate) fn insert_or_promote(
        &mut self,
        input: &I,
        eq: &EqualityPolicy<I>,
    ) -> (&mut ResultSlot<I, R>, SlotLookup) {
        let lookup = match self.find(input, eq) {
            Some(0) => SlotLookup {
                created: false,
                evicted: false,
            },
            Some(index) => {
                if let Some(slot) = self.slots.remove(index) {
                    self.slots.push_front(slot);
                }
                SlotLookup {
                    created: false,
                    evicted: false,
                }
            }
            None => {
                self.slots.push_front(ResultSlot::new(input.clone()));
                let evicted = self.capacity > 0 && self.slots.len() > self.capacity;
                if evicted {
                    self.slots.pop_back();
                }
                SlotLookup {
                    created: true,
                    evicted,
                }
            }
        };

        (&mut self.slots[0], lookup)
    }
}

impl<I, R> BoundedResultCache<I, R> {
    /// Drops every slot. Returns how many were dropped.
    pub(crate) fn clear(&mut self) -> usize {
        let dropped = self.slots.len();
        self.slots.clear();
        dropped
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
