//! Change detection across the registered input functions.

use std::fmt;
use std::sync::Arc;

use crate::types::{FieldMap, Value};

pub(crate) type FieldFn<I> = dyn Fn(&I, &[Value]) -> Value + Send + Sync;
pub(crate) type GroupFn<I> = dyn Fn(&I, &[Value]) -> FieldMap + Send + Sync;

/// A registered input function.
pub(crate) enum InputFunction<I> {
    /// Produces one named field.
    Field { name: Arc<str>, select: Arc<FieldFn<I>> },

    /// Produces several fields at once; each entry is diffed on its own.
    Group(Arc<GroupFn<I>>),
}

impl<I> Clone for InputFunction<I> {
    fn clone(&self) -> Self {
        match self {
            InputFunction::Field { name, select } => InputFunction::Field {
                name: name.clone(),
                select: select.clone(),
            },
            InputFunction::Group(group) => InputFunction::Group(group.clone()),
        }
    }
}

impl<I> fmt::Debug for InputFunction<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputFunction::Field { name, .. } => write!(f, "Field({})", name),
            InputFunction::Group(_) => write!(f, "Group"),
        }
    }
}

/// Outcome of one detection pass.
pub(crate) struct Detection {
    pub(crate) fields: FieldMap,
    pub(crate) changed: bool,
}

/// Evaluates input functions and diffs their output against a previous
/// field map.
#[derive(Debug)]
pub(crate) struct ChangeDetector<I> {
    inputs: Vec<InputFunction<I>>,
}

impl<I> ChangeDetector<I> {
    pub(crate) fn new(inputs: Vec<InputFunction<I>>) -> Self {
        Self { inputs }
    }

    /// Runs every input function with `(input, key...)` into a fresh map.
    ///
    /// Later registrations win when a group and a field share a name.
    pub(crate) fn evaluate(&self, input: &I, key: &[Value]) -> FieldMap {
        let mut fields = FieldMap::new();
        for function in &self.inputs {
            match function {
                InputFunction::Field { name, select } => {
                    fields.insert(name.clone(), select(input, key));
                }
                InputFunction::Group(group) => fields.extend(group(input, key)),
            }
        }
        fields
    }

    /// Evaluates and compares with `previous`. A missing previous map
    /// always counts as changed.
    pub(crate) fn detect(&self, previous: Option<&FieldMap>, input: &I, key: &[Value]) -> Detection {
        let fields = self.evaluate(input, key);
        let changed = previous.map_or(true, |old| fields.differs_from(old));
        Detection { fields, changed }
    }
}
