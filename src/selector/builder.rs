//! Fluent configuration of selectors.

use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

use crate::cache::detector::{ChangeDetector, InputFunction};
use crate::cache::equality::{EqualityPolicy, Identity};
use crate::cache::instance::{CacheInstance, SelectorCore, TransformFn};
use crate::cache::key_tree::KeyTree;
use crate::cache::stats::StatsRecorder;
use crate::scheduler::ExpiryScheduler;
use crate::types::config::SelectorConfig;
use crate::types::{FieldMap, Value};
use crate::{SelcacheError, SelcacheResult};

use super::{KeyedSelector, Selector};

const DEFAULT_NAME: &str = "selector";

/// Collects input functions, result transform and cache settings, then
/// freezes them with [`SelectorBuilder::build`] or
/// [`SelectorBuilder::build_keyed`].
///
/// Without [`SelectorBuilder::result`] the field map itself is the result.
///
/// ```
/// use selcache::{SelectorBuilder, Value};
///
/// let double = SelectorBuilder::<i64>::new()
///     .field("value", |x: &i64, _| Value::Int(*x))
///     .result(|fields, _| fields.int("value").unwrap_or_default() * 2)
///     .build()
///     .unwrap();
///
/// let first = double.call(&1);
/// assert_eq!(*first, 2);
/// assert!(std::sync::Arc::ptr_eq(&first, &double.call(&1)));
/// ```
pub struct SelectorBuilder<I, R = FieldMap> {
    name: Option<String>,
    inputs: Vec<InputFunction<I>>,
    transform: Arc<TransformFn<R>>,
    equality: EqualityPolicy<I>,
    capacity: usize,
    ttl: Option<Duration>,
    max_keys: Option<usize>,
    scheduler: Option<ExpiryScheduler>,
}

impl<I: Identity> SelectorBuilder<I, FieldMap> {
    /// Builder comparing primary inputs by identity.
    pub fn new() -> Self {
        Self::with_equality(EqualityPolicy::identity())
    }
}

impl<I: Identity> Default for SelectorBuilder<I, FieldMap> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> SelectorBuilder<I, FieldMap> {
    /// Builder for inputs without an [`Identity`] implementation.
    pub fn with_equality(equality: EqualityPolicy<I>) -> Self {
        let defaults = SelectorConfig::default();
        Self {
            name: None,
            inputs: Vec::new(),
            transform: Arc::new(|fields: &FieldMap, _: &[Value]| fields.clone()),
            equality,
            capacity: defaults.capacity,
            ttl: None,
            max_keys: None,
            scheduler: None,
        }
    }
}

impl<I, R> SelectorBuilder<I, R> {
    /// Name used in logs.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Registers an input function producing the field `name`.
    ///
    /// It receives the primary input and the key tuple.
    pub fn field(
        mut self,
        name: &str,
        select: impl Fn(&I, &[Value]) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.inputs.push(InputFunction::Field {
            name: Arc::from(name),
            select: Arc::new(select),
        });
        self
    }

    /// Registers an input function producing several fields at once.
    pub fn field_group(
        mut self,
        group: impl Fn(&I, &[Value]) -> FieldMap + Send + Sync + 'static,
    ) -> Self {
        self.inputs.push(InputFunction::Group(Arc::new(group)));
        self
    }

    /// Sets the result transform, called with the field map and key tuple.
    pub fn result<T>(
        self,
        transform: impl Fn(&FieldMap, &[Value]) -> T + Send + Sync + 'static,
    ) -> SelectorBuilder<I, T> {
        SelectorBuilder {
            name: self.name,
            inputs: self.inputs,
            transform: Arc::new(transform),
            equality: self.equality,
            capacity: self.capacity,
            ttl: self.ttl,
            max_keys: self.max_keys,
            scheduler: self.scheduler,
        }
    }

    /// Result slots per cache instance; `0` means unbounded. Default `1`.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Expire computed results after `ttl`. Expiry clears the whole cache
    /// instance, not just the stale slot.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn no_ttl(mut self) -> Self {
        self.ttl = None;
        self
    }

    /// Replaces the equality policy with a custom predicate.
    pub fn equality(mut self, eq: impl Fn(&I, &I) -> bool + Send + Sync + 'static) -> Self {
        self.equality = EqualityPolicy::new(eq);
        self
    }

    pub fn equality_policy(mut self, policy: EqualityPolicy<I>) -> Self {
        self.equality = policy;
        self
    }

    /// Resets the key tree once this many key tuples are cached.
    pub fn max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = Some(max_keys);
        self
    }

    /// Scheduler reaping expired caches. Defaults to
    /// [`ExpiryScheduler::shared`] when a TTL is set.
    pub fn scheduler(mut self, scheduler: ExpiryScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Applies a file-loaded profile.
    pub fn config(mut self, config: &SelectorConfig) -> Self {
        self.capacity = config.capacity;
        self.ttl = config.ttl();
        self.max_keys = config.max_keys;
        self
    }

    fn validate(&self) -> SelcacheResult<()> {
        if self.inputs.is_empty() {
            return Err(SelcacheError::config(
                "at least one input function must be registered",
            ));
        }

        let mut seen = HashSet::new();
        for input in &self.inputs {
            if let InputFunction::Field { name, .. } = input {
                if name.is_empty() {
                    return Err(SelcacheError::config("field names must not be empty"));
                }
                if !seen.insert(name.clone()) {
                    return Err(SelcacheError::config(format!(
                        "field '{}' registered twice",
                        name
                    )));
                }
            }
        }

        if self.max_keys == Some(0) {
            return Err(SelcacheError::config(
                "max_keys must be greater than 0 when set",
            ));
        }

        Ok(())
    }

    fn into_core(self) -> SelcacheResult<(Arc<SelectorCore<I, R>>, Option<usize>)> {
        self.validate()?;

        let scheduler = self
            .ttl
            .map(|_| self.scheduler.unwrap_or_else(ExpiryScheduler::shared));
        let core = SelectorCore {
            name: Arc::from(self.name.as_deref().unwrap_or(DEFAULT_NAME)),
            detector: ChangeDetector::new(self.inputs),
            transform: self.transform,
            equality: self.equality,
            capacity: self.capacity,
            ttl: self.ttl,
            scheduler,
            stats: StatsRecorder::default(),
        };

        debug!(
            selector = %core.name,
            capacity = core.capacity,
            ttl_ms = ?core.ttl.map(|ttl| ttl.as_millis()),
            equality = ?core.equality,
            "Selector built"
        );

        Ok((Arc::new(core), self.max_keys))
    }
}

impl<I, R> SelectorBuilder<I, R>
where
    I: Clone + Send + 'static,
    R: Send + Sync + 'static,
{
    /// Freezes the configuration into an unkeyed selector.
    pub fn build(self) -> SelcacheResult<Selector<I, R>> {
        let (core, max_keys) = self.into_core()?;
        if max_keys.is_some() {
            debug!(selector = %core.name, "max_keys ignored for unkeyed selector");
        }

        Ok(Selector {
            instance: CacheInstance::new(core, Arc::from(Vec::new())),
        })
    }

    /// Installs `key` as the key function and freezes the configuration
    /// into a keyed selector.
    ///
    /// Every tuple `key` returns must have the same length.
    pub fn build_keyed<A>(
        self,
        key: impl Fn(&A) -> Vec<Value> + Send + Sync + 'static,
    ) -> SelcacheResult<KeyedSelector<A, I, R>> {
        let (core, max_keys) = self.into_core()?;

        Ok(KeyedSelector {
            key_fn: Arc::new(key),
            tree: Mutex::new(KeyTree::new(core.clone(), max_keys)),
            core,
            _args: PhantomData,
        })
    }
}
