//! Dynamic values flowing through selectors.
//!
//! Field functions and key functions produce [`Value`]s. Scalars and strings
//! behave like primitives and compare by content; everything else is shared
//! behind an `Arc` and compares by pointer identity, so a field is only
//! "unchanged" when the selector hands back the very same allocation.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A field value or key tuple element.
#[derive(Clone, Default)]
pub enum Value {
    /// Absent value.
    #[default]
    Null,

    /// Boolean primitive.
    Bool(bool),

    /// Integer primitive.
    Int(i64),

    /// Floating point primitive.
    Float(f64),

    /// String primitive (compared by content).
    Str(Arc<str>),

    /// Shared reference (compared by pointer).
    Ref(Arc<dyn Any + Send + Sync>),
}

impl Value {
    /// Wraps `value` in a fresh shared reference.
    ///
    /// Every call allocates a new identity: two `Value::shared(vec![1])`
    /// are never identical. Keep the returned value (or the `Arc`) around
    /// to get stable identity across calls.
    pub fn shared<T: Any + Send + Sync>(value: T) -> Self {
        Value::Ref(Arc::new(value))
    }

    /// Reuses an existing `Arc`, preserving its identity.
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Value::Ref(value)
    }

    /// Strict identity, used for field change detection.
    ///
    /// Floats follow IEEE equality, so `NaN` is never identical to itself.
    pub fn is_identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Identity used to route key tuple elements.
    ///
    /// Same as [`Value::is_identical`] except that `NaN` matches `NaN`,
    /// otherwise a `NaN` key would create a new branch on every call.
    pub fn is_same_key(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            _ => self.is_identical(other),
        }
    }

    /// Returns true for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float view; integers are widened.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Borrows the shared payload as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Ref(any) => any.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Clones the shared payload `Arc` as `Arc<T>` (same identity).
    pub fn downcast_arc<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            Value::Ref(any) => any.clone().downcast::<T>().ok(),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Ref(_) => "ref",
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(i) => write!(f, "Int({})", i),
            Value::Float(x) => write!(f, "Float({})", x),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Ref(any) => write!(f, "Ref({:p})", Arc::as_ptr(any) as *const ()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::Ref(_) => write!(f, "<{}>", self.kind()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(Arc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(Arc::from(value))
    }
}

impl From<Arc<str>> for Value {
    fn from(value: Arc<str>) -> Self {
        Value::Str(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Hashable wrapper routing a [`Value`] by key identity.
///
/// Holding the value keeps any `Ref` allocation alive, so its address
/// cannot be reused by another key while it sits in a map.
#[derive(Clone, Debug)]
pub(crate) struct KeyIdentity(pub(crate) Value);

impl PartialEq for KeyIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.0.is_same_key(&other.0)
    }
}

impl Eq for KeyIdentity {}

impl Hash for KeyIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(&self.0).hash(state);
        match &self.0 {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(x) => {
                // -0.0 == 0.0 and all NaNs route together
                let bits = if *x == 0.0 {
                    0u64
                } else if x.is_nan() {
                    f64::NAN.to_bits()
                } else {
                    x.to_bits()
                };
                bits.hash(state);
            }
            Value::Str(s) => s.hash(state),
            Value::Ref(any) => (Arc::as_ptr(any) as *const () as usize).hash(state),
        }
    }
}

/// Named field values selected for one evaluation.
#[derive(Clone, Default)]
pub struct FieldMap {
    fields: HashMap<Arc<str>, Value>,
}

impl FieldMap {
    /// Creates an empty field map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field, returning the previous value.
    pub fn insert(&mut self, name: impl Into<Arc<str>>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    /// Builder-style [`FieldMap::insert`].
    pub fn with(mut self, name: impl Into<Arc<str>>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates fields in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_ref(), value))
    }

    /// Field names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.fields.keys().map(|k| k.as_ref()).collect();
        names.sort_unstable();
        names
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_int)
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_float)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Borrows a `Ref` field as `T`.
    pub fn downcast<T: Any>(&self, name: &str) -> Option<&T> {
        self.get(name).and_then(Value::downcast_ref::<T>)
    }

    /// Moves every entry of `other` into this map.
    pub fn extend(&mut self, other: FieldMap) {
        self.fields.extend(other.fields);
    }

    /// True when any field differs by strict identity from `previous`,
    /// or when either side has a field the other lacks.
    pub fn differs_from(&self, previous: &FieldMap) -> bool {
        if self.fields.len() != previous.fields.len() {
            return true;
        }

        self.fields.iter().any(|(name, value)| {
            previous
                .fields
                .get(name)
                .map_or(true, |old| !old.is_identical(value))
        })
    }
}

impl fmt::Debug for FieldMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for name in self.names() {
            map.entry(&name, &self.fields[name]);
        }
        map.finish()
    }
}

impl<K: Into<Arc<str>>, V: Into<Value>> FromIterator<(K, V)> for FieldMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}
