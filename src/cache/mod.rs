//! Memoization core: result slots, change detection and key routing.
//!
//! A selector owns one [`CacheInstance`] per key tuple. Each instance keeps
//! a bounded, most-recent-first list of result slots and recomputes a slot
//! only when one of its input fields changed identity.

pub(crate) mod detector;
pub mod equality;
pub(crate) mod instance;
pub(crate) mod key_tree;
pub(crate) mod slots;
pub(crate) mod stats;

pub use equality::{EqualityPolicy, Identity};
pub use instance::CacheInstance;
pub use stats::SelectorStats;
