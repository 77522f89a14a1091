//! Memoized selectors.
//!
//! A [`Selector`] wraps a single cache instance. A [`KeyedSelector`] routes
//! each call through a key function to one instance per key tuple, so
//! callers with different keys never evict each other's results.

mod builder;

pub use builder::SelectorBuilder;

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::cache::instance::SelectorCore;
use crate::cache::key_tree::KeyTree;
use crate::cache::{CacheInstance, SelectorStats};
use crate::sync::lock;
use crate::types::Value;
use crate::SelcacheResult;

pub(crate) type KeyFn<A> = dyn Fn(&A) -> Vec<Value> + Send + Sync;

/// Unkeyed selector: every call shares one cache instance.
pub struct Selector<I, R> {
    instance: CacheInstance<I, R>,
}

impl<I, R> Selector<I, R>
where
    I: Clone + Send + 'static,
    R: Send + Sync + 'static,
{
    /// Returns the memoized result for `input`.
    pub fn call(&self, input: &I) -> Arc<R> {
        self.instance.call(input)
    }
}

impl<I, R> Selector<I, R> {
    /// Drops every cached result.
    pub fn clear(&self) {
        let dropped = self.instance.len();
        self.instance.clear();
        info!(selector = %self.name(), dropped, "Selector cleared");
    }

    /// Number of result slots held.
    pub fn len(&self) -> usize {
        self.instance.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instance.is_empty()
    }

    pub fn stats(&self) -> SelectorStats {
        self.instance.core().stats.snapshot()
    }

    pub fn name(&self) -> &str {
        &self.instance.core().name
    }

    /// The underlying cache instance. Clones share its slots.
    pub fn instance(&self) -> &CacheInstance<I, R> {
        &self.instance
    }
}

impl<I, R> fmt::Debug for Selector<I, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selector")
            .field("name", &self.name())
            .field("slots", &self.len())
            .finish()
    }
}

/// Keyed selector: `key(args)` picks the cache instance, which then
/// memoizes over the primary input.
pub struct KeyedSelector<A, I, R> {
    key_fn: Arc<KeyFn<A>>,
    tree: Mutex<KeyTree<I, R>>,
    core: Arc<SelectorCore<I, R>>,
    _args: PhantomData<fn(&A)>,
}

impl<A, I, R> KeyedSelector<A, I, R>
where
    I: Clone + Send + 'static,
    R: Send + Sync + 'static,
{
    /// Cache instance for the tuple `key(args)` returns.
    ///
    /// The key function runs before the tree is locked, so it may call
    /// other selectors.
    pub fn key(&self, args: &A) -> SelcacheResult<CacheInstance<I, R>> {
        let key = (self.key_fn)(args);
        self.key_tuple(key)
    }

    /// Cache instance for an explicit key tuple, bypassing the key function.
    pub fn key_tuple(&self, key: Vec<Value>) -> SelcacheResult<CacheInstance<I, R>> {
        lock(&self.tree).resolve(key)
    }

    /// Resolves the instance for `args` and calls it with `input`.
    ///
    /// Fails only when the key tuple length differs from earlier tuples.
    pub fn call(&self, args: &A, input: &I) -> SelcacheResult<Arc<R>> {
        let instance = self.key(args)?;
        Ok(instance.call(input))
    }
}

impl<A, I, R> KeyedSelector<A, I, R> {
    /// Drops every key and cached result. Previously obtained instances are
    /// emptied as well.
    pub fn clear(&self) {
        let dropped = lock(&self.tree).clear();
        info!(selector = %self.core.name, dropped, "Keyed selector cleared");
    }

    /// Number of distinct non-empty key tuples currently cached.
    pub fn key_count(&self) -> usize {
        lock(&self.tree).len()
    }

    pub fn stats(&self) -> SelectorStats {
        self.core.stats.snapshot()
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }
}

impl<A, I, R> fmt::Debug for KeyedSelector<A, I, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedSelector")
            .field("name", &self.name())
            .field("keys", &self.key_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_sum(runs: Arc<AtomicUsize>) -> SelectorBuilder<(i64, i64), i64> {
        SelectorBuilder::<(i64, i64)>::new()
            .field("a", |input: &(i64, i64), _| Value::Int(input.0))
            .field("b", |input: &(i64, i64), _| Value::Int(input.1))
            .result(move |fields: &FieldMap, _| {
                runs.fetch_add(1, Ordering::SeqCst);
                fields.int("a").unwrap_or_default() + fields.int("b").unwrap_or_default()
            })
    }

    #[test]
    fn test_selector_clear_forces_recompute() {
        let runs = Arc::new(AtomicUsize::new(0));
        let selector = counting_sum(runs.clone()).name("sum").build().unwrap();

        let first = selector.call(&(1, 2));
        assert_eq!(*first, 3);
        selector.clear();
        assert!(selector.is_empty());

        let second = selector.call(&(1, 2));
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(selector.name(), "sum");
    }

    #[test]
    fn test_keyed_selector_routes_by_key() {
        let runs = Arc::new(AtomicUsize::new(0));
        let selector = counting_sum(runs.clone())
            .build_keyed(|list: &&str| vec![Value::from(*list)])
            .unwrap();

        let inbox = selector.call(&"inbox", &(1, 1)).unwrap();
        let sent = selector.call(&"sent", &(2, 2)).unwrap();
        let inbox_again = selector.call(&"inbox", &(1, 1)).unwrap();

        assert_eq!((*inbox, *sent), (2, 4));
        assert!(Arc::ptr_eq(&inbox, &inbox_again));
        assert_eq!(selector.key_count(), 2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        let stats = selector.stats();
        assert_eq!((stats.calls, stats.hits, stats.misses), (3, 1, 2));
    }

    #[test]
    fn test_keyed_selector_clear() {
        let runs = Arc::new(AtomicUsize::new(0));
        let selector = counting_sum(runs)
            .build_keyed(|id: &i64| vec![Value::Int(*id)])
            .unwrap();

        let handle = selector.key(&1).unwrap();
        handle.call(&(0, 0));
        selector.clear();

        assert_eq!(selector.key_count(), 0);
        assert!(handle.is_empty());
    }
}
