//! Shared types.

pub mod config;
pub mod errors;
pub mod value;

pub use value::{FieldMap, Value};
