//! Recorded workloads replayed through a selector.
//!
//! A workload is a JSON document naming the fields to select (as JSON
//! pointers into each call's input) and the sequence of calls:
//!
//! ```json
//! {
//!   "selector": "todos",
//!   "fields": ["/todos", "/filter"],
//!   "calls": [
//!     { "input": { "todos": [1, 2], "filter": "all" } },
//!     { "input": { "todos": [1, 2], "filter": "all" }, "key": ["inbox"] },
//!     { "input": { "todos": [1, 2], "filter": "done" }, "advance_ms": 60 }
//!   ]
//! }
//! ```
//!
//! JSON values are interned: equal arrays and objects map to the same
//! shared allocation, so a recorded state that did not change keeps its
//! identity from one call to the next.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::scheduler::ExpiryScheduler;
use crate::selector::SelectorBuilder;
use crate::sync::lock;
use crate::types::config::SelectorConfig;
use crate::types::{FieldMap, Value};
use crate::{SelcacheError, SelcacheResult, SelectorStats};

/// A recorded call sequence.
#[derive(Debug, Clone, Deserialize)]
pub struct Workload {
    /// Selector profile to replay with.
    #[serde(default)]
    pub selector: Option<String>,

    /// JSON pointers, one field each.
    pub fields: Vec<String>,

    #[serde(default)]
    pub calls: Vec<WorkloadCall>,
}

/// One recorded call.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkloadCall {
    /// Primary input.
    pub input: JsonValue,

    /// Key tuple; calls carrying one go through the keyed selector.
    #[serde(default)]
    pub key: Option<Vec<JsonValue>>,

    /// Milliseconds to wait before the call.
    #[serde(default)]
    pub advance_ms: Option<u64>,
}

impl Workload {
    /// Loads and validates a workload file.
    pub fn load<P: AsRef<Path>>(path: P) -> SelcacheResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let workload: Workload = serde_json::from_str(&content)?;
        workload.validate()?;
        Ok(workload)
    }

    pub fn validate(&self) -> SelcacheResult<()> {
        if self.fields.is_empty() {
            return Err(SelcacheError::workload("at least one field pointer is required"));
        }

        for pointer in &self.fields {
            if !pointer.starts_with('/') {
                return Err(SelcacheError::workload(format!(
                    "field '{}' is not a JSON pointer (must start with '/')",
                    pointer
                )));
            }
        }

        Ok(())
    }

    fn is_keyed(&self) -> bool {
        self.calls.iter().any(|call| call.key.is_some())
    }
}

/// Maps JSON values to [`Value`]s, reusing one allocation per distinct
/// array or object.
#[derive(Debug, Default)]
pub struct Interner {
    shared: HashMap<String, Value>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scalars and strings become primitives; arrays and objects become
    /// shared references keyed by their serialized form.
    pub fn intern(&mut self, json: &JsonValue) -> Value {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Value::from(s.as_str()),
            JsonValue::Array(_) | JsonValue::Object(_) => self
                .shared
                .entry(json.to_string())
                .or_insert_with(|| Value::shared(json.clone()))
                .clone(),
        }
    }

    /// Distinct arrays and objects seen so far.
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.is_empty()
    }
}

/// What happened to one replayed call.
#[derive(Debug, Clone, Serialize)]
pub struct CallOutcome {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub hit: bool,
}

/// Result of a replay.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub selector: String,
    pub calls: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub key_resets: u64,
    pub hit_rate: f64,
    /// Distinct non-empty key tuples cached at the end.
    pub keys: usize,
    /// Distinct arrays and objects interned.
    pub interned: usize,
    pub outcomes: Vec<CallOutcome>,
}

impl ReplayReport {
    fn new(selector: &str, stats: SelectorStats, keys: usize, interned: usize, outcomes: Vec<CallOutcome>) -> Self {
        Self {
            selector: selector.to_string(),
            calls: stats.calls,
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            expirations: stats.expirations,
            key_resets: stats.key_resets,
            hit_rate: stats.hit_rate(),
            keys,
            interned,
            outcomes,
        }
    }
}

fn sum(a: SelectorStats, b: SelectorStats) -> SelectorStats {
    SelectorStats {
        calls: a.calls + b.calls,
        hits: a.hits + b.hits,
        misses: a.misses + b.misses,
        evictions: a.evictions + b.evictions,
        expirations: a.expirations + b.expirations,
        key_resets: a.key_resets + b.key_resets,
    }
}

fn builder(
    name: &str,
    pointers: &[String],
    interner: &Arc<Mutex<Interner>>,
    profile: &SelectorConfig,
    scheduler: &ExpiryScheduler,
) -> SelectorBuilder<Value, FieldMap> {
    let mut builder = SelectorBuilder::<Value>::new()
        .name(name)
        .config(profile)
        .scheduler(scheduler.clone());

    for pointer in pointers {
        let path = pointer.clone();
        let interner = interner.clone();
        builder = builder.field(pointer, move |input: &Value, _| {
            match input
                .downcast_ref::<JsonValue>()
                .and_then(|json| json.pointer(&path))
            {
                Some(found) => lock(&interner).intern(found),
                None => Value::Null,
            }
        });
    }

    builder
}

/// Replays `workload` with `profile`, sleeping on the tokio clock for
/// every `advance_ms`.
pub async fn replay(
    workload: &Workload,
    name: &str,
    profile: &SelectorConfig,
) -> SelcacheResult<ReplayReport> {
    workload.validate()?;
    profile.validate()?;

    let interner = Arc::new(Mutex::new(Interner::new()));
    let scheduler = ExpiryScheduler::tokio();

    let plain = builder(name, &workload.fields, &interner, profile, &scheduler).build()?;
    let keyed = if workload.is_keyed() {
        let keyed = builder(name, &workload.fields, &interner, profile, &scheduler)
            .build_keyed(|key: &Vec<Value>| key.clone())?;
        Some(keyed)
    } else {
        None
    };

    let mut outcomes = Vec::with_capacity(workload.calls.len());
    for (index, call) in workload.calls.iter().enumerate() {
        if let Some(ms) = call.advance_ms {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }

        let input = lock(&interner).intern(&call.input);
        let outcome = match (&call.key, &keyed) {
            (Some(key), Some(keyed)) => {
                let key: Vec<Value> = {
                    let mut interner = lock(&interner);
                    key.iter().map(|element| interner.intern(element)).collect()
                };
                let label = key
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");

                let before = keyed.stats().hits;
                keyed
                    .call(&key, &input)
                    .map_err(|e| SelcacheError::workload(format!("call {}: {}", index, e)))?;
                CallOutcome {
                    index,
                    key: Some(format!("[{}]", label)),
                    hit: keyed.stats().hits > before,
                }
            }
            _ => {
                let before = plain.stats().hits;
                plain.call(&input);
                CallOutcome {
                    index,
                    key: None,
                    hit: plain.stats().hits > before,
                }
            }
        };

        debug!(index, hit = outcome.hit, "Replayed call");
        outcomes.push(outcome);
    }

    let (stats, keys) = match &keyed {
        Some(keyed) => (sum(plain.stats(), keyed.stats()), keyed.key_count()),
        None => (plain.stats(), 0),
    };
    let interned = lock(&interner).len();

    Ok(ReplayReport::new(name, stats, keys, interned, outcomes))
}
