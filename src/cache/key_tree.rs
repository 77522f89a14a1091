//! Key tree routing key tuples to independent cache instances.
//!
//! Each level maps one tuple element (by key identity) to the next level;
//! the node reached by the last element owns the cache instance. Nodes are
//! created on first visit and only go away with [`KeyTree::clear`], so the
//! tree grows with the number of distinct tuples seen unless `max_keys`
//! bounds it.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::cache::instance::{CacheInstance, SelectorCore};
use crate::types::value::KeyIdentity;
use crate::types::Value;
use crate::{SelcacheError, SelcacheResult};

struct KeyNode<I, R> {
    children: HashMap<KeyIdentity, KeyNode<I, R>>,
    instance: Option<CacheInstance<I, R>>,
}

impl<I, R> Default for KeyNode<I, R> {
    fn default() -> Self {
        Self {
            children: HashMap::new(),
            instance: None,
        }
    }
}

impl<I, R> KeyNode<I, R> {
    fn find(&self, key: &[Value]) -> Option<&CacheInstance<I, R>> {
        let mut node = self;
        for element in key {
            node = node.children.get(&KeyIdentity(element.clone()))?;
        }
        node.instance.as_ref()
    }
}

pub(crate) struct KeyTree<I, R> {
    core: Arc<SelectorCore<I, R>>,
    /// Serves the empty tuple; created with the tree.
    default: CacheInstance<I, R>,
    root: KeyNode<I, R>,
    /// Tuple length fixed by the first resolution.
    arity: Option<usize>,
    instances: usize,
    max_keys: Option<usize>,
}

impl<I, R> KeyTree<I, R>
where
    I: Clone + Send + 'static,
    R: Send + Sync + 'static,
{
    pub(crate) fn new(core: Arc<SelectorCore<I, R>>, max_keys: Option<usize>) -> Self {
        let default = CacheInstance::new(core.clone(), Arc::from(Vec::new()));
        Self {
            core,
            default,
            root: KeyNode::default(),
            arity: None,
            instances: 0,
            max_keys,
        }
    }

    /// Returns the instance for `key`, creating intermediate nodes and the
    /// instance itself on first visit.
    pub(crate) fn resolve(&mut self, key: Vec<Value>) -> SelcacheResult<CacheInstance<I, R>> {
        match self.arity {
            Some(expected) if expected != key.len() => {
                return Err(SelcacheError::KeyArity {
                    expected,
                    actual: key.len(),
                });
            }
            Some(_) => {}
            None => self.arity = Some(key.len()),
        }

        if key.is_empty() {
            return Ok(self.default.clone());
        }

        if let Some(instance) = self.root.find(&key) {
            return Ok(instance.clone());
        }

        if let Some(max) = self.max_keys {
            if self.instances >= max {
                let dropped = self.clear();
                self.core.stats.record_key_reset();
                debug!(selector = %self.core.name, dropped, max, "Key limit reached, key tree reset");
            }
        }

        let mut node = &mut self.root;
        for element in &key {
            node = node.children.entry(KeyIdentity(element.clone())).or_default();
        }

        let instance = CacheInstance::new(self.core.clone(), Arc::from(key));
        node.instance = Some(instance.clone());
        self.instances += 1;
        debug!(selector = %self.core.name, instances = self.instances, "Created keyed cache instance");

        Ok(instance)
    }
}

impl<I, R> KeyTree<I, R> {
    /// Discards every keyed instance and empties the default one.
    ///
    /// Detached instances are emptied too, so handles obtained before the
    /// clear start cold. Returns the number of keyed instances dropped.
    pub(crate) fn clear(&mut self) -> usize {
        self.default.clear();

        let mut stack = vec![std::mem::take(&mut self.root)];
        while let Some(node) = stack.pop() {
            if let Some(instance) = node.instance {
                instance.clear();
            }
            stack.extend(node.children.into_values());
        }

        let dropped = self.instances;
        self.instances = 0;
        dropped
    }

    /// Number of keyed instances (the default one excluded).
    pub(crate) fn len(&self) -> usize {
        self.instances
    }
}
