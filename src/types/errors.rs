//! Error types for selcache.

use thiserror::Error;

/// Default result type for selcache.
pub type SelcacheResult<T> = Result<T, SelcacheError>;

/// Errors surfaced by selcache.
///
/// Cache lookups themselves never fail: panics raised by caller-supplied
/// functions propagate unchanged and are not represented here.
#[derive(Error, Debug)]
pub enum SelcacheError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Key tuple has {actual} element(s), expected {expected}")]
    KeyArity { expected: usize, actual: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid workload: {0}")]
    Workload(String),

    #[error("Selector profile '{0}' not found in configuration")]
    SelectorNotFound(String),

    #[error("{0}")]
    Other(String),
}

impl SelcacheError {
    /// Creates a generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }

    /// Creates a configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a workload error.
    pub fn workload<S: Into<String>>(msg: S) -> Self {
        Self::Workload(msg.into())
    }
}
