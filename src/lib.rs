//! # selcache
//!
//! Memoized selectors over immutable inputs.
//!
//! A selector derives a result from a primary input through a set of input
//! functions and a result transform. The input functions run on every call;
//! the transform only runs when one of their outputs changed identity, so
//! unchanged inputs hand back the very same `Arc`.
//!
//! ## Modules
//!
//! - [`selector`] - Selector builder and the unkeyed/keyed selector handles
//! - [`cache`] - Result slots, change detection and key routing
//! - [`scheduler`] - TTL expiry queue with a single timer
//! - [`types`] - Values, field maps, configuration and errors
//! - `cli` - Command line front end (feature `cli`)

pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod scheduler;
pub mod selector;
mod sync;
pub mod types;

pub use cache::{CacheInstance, EqualityPolicy, Identity, SelectorStats};
pub use scheduler::{ExpiryScheduler, ManualClock};
pub use selector::{KeyedSelector, Selector, SelectorBuilder};
pub use types::config::Config;
pub use types::errors::{SelcacheError, SelcacheResult};
pub use types::{FieldMap, Value};
