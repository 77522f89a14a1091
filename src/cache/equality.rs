//! Equality policies deciding whether a call's primary input matches a
//! cached slot.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::types::Value;

/// Identity comparison, the default equality policy.
///
/// Shared pointers compare by address; scalars and strings compare by
/// content, like primitives.
pub trait Identity {
    /// Returns true when `self` and `other` are the same input.
    fn is_identical(&self, other: &Self) -> bool;
}

impl<T: ?Sized> Identity for Arc<T> {
    fn is_identical(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

impl<T: ?Sized> Identity for Rc<T> {
    fn is_identical(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }
}

impl Identity for Value {
    fn is_identical(&self, other: &Self) -> bool {
        Value::is_identical(self, other)
    }
}

impl<T: Identity> Identity for Option<T> {
    fn is_identical(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.is_identical(b),
            (None, None) => true,
            _ => false,
        }
    }
}

macro_rules! primitive_identity {
    ($($t:ty),* $(,)?) => {
        $(
            impl Identity for $t {
                fn is_identical(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

primitive_identity!(
    (), bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
    String, &'static str,
);

// tuples of inputs are identical when every element is
macro_rules! tuple_identity {
    ($(($($name:ident $idx:tt),+)),* $(,)?) => {
        $(
            impl<$($name: Identity),+> Identity for ($($name,)+) {
                fn is_identical(&self, other: &Self) -> bool {
                    $(self.$idx.is_identical(&other.$idx))&&+
                }
            }
        )*
    };
}

tuple_identity!(
    (A 0),
    (A 0, B 1),
    (A 0, B 1, C 2),
    (A 0, B 1, C 2, D 3),
);

type EqualityFn<I> = dyn Fn(&I, &I) -> bool + Send + Sync;

/// Pluggable two-argument predicate over primary inputs.
pub struct EqualityPolicy<I> {
    eq: Arc<EqualityFn<I>>,
    label: &'static str,
}

impl<I> EqualityPolicy<I> {
    /// Custom predicate.
    pub fn new(eq: impl Fn(&I, &I) -> bool + Send + Sync + 'static) -> Self {
        Self {
            eq: Arc::new(eq),
            label: "custom",
        }
    }

    /// Identity comparison through [`Identity`].
    pub fn identity() -> Self
    where
        I: Identity,
    {
        Self {
            eq: Arc::new(|a: &I, b: &I| a.is_identical(b)),
            label: "identity",
        }
    }

    /// Structural comparison through `PartialEq`. Opt-in only.
    pub fn by_value() -> Self
    where
        I: PartialEq,
    {
        Self {
            eq: Arc::new(|a: &I, b: &I| a == b),
            label: "by_value",
        }
    }

    /// Applies the policy.
    pub fn matches(&self, a: &I, b: &I) -> bool {
        (self.eq)(a, b)
    }
}

impl<I> Clone for EqualityPolicy<I> {
    fn clone(&self) -> Self {
        Self {
            eq: self.eq.clone(),
            label: self.label,
        }
    }
}

impl<I> fmt::Debug for EqualityPolicy<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EqualityPolicy").field(&self.label).finish()
    }
}
