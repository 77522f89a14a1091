//! Configuration for selcache.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::{SelcacheError, SelcacheResult};

/// Default configuration file name.
pub const CONFIG_FILE: &str = "selcache.toml";

/// Main configuration for selcache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Profile applied to selectors without a named profile.
    #[serde(default)]
    pub defaults: SelectorConfig,

    /// Named selector profiles.
    #[serde(default)]
    pub selectors: BTreeMap<String, SelectorConfig>,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: [&str; 2] = ["text", "json"];

/// Cache settings for one selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Result slots kept per cache instance (0 = unbounded).
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Time to live of a computed result, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_ms: Option<u64>,

    /// Upper bound on distinct key tuples before the key tree is reset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_keys: Option<usize>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            ttl_ms: None,
            max_keys: None,
        }
    }
}

fn default_capacity() -> usize {
    1
}

impl SelectorConfig {
    /// TTL as a `Duration`.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_ms.map(Duration::from_millis)
    }

    /// Validates the profile.
    pub fn validate(&self) -> SelcacheResult<()> {
        if self.max_keys == Some(0) {
            return Err(SelcacheError::config(
                "max_keys must be greater than 0 when set",
            ));
        }

        Ok(())
    }
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> SelcacheResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> SelcacheResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Creates default configuration.
    pub fn default_config() -> Self {
        Self {
            general: GeneralConfig::default(),
            defaults: SelectorConfig::default(),
            selectors: BTreeMap::new(),
        }
    }

    /// Tries to load configuration from current directory or uses default.
    pub fn load_or_default() -> Self {
        Self::load(CONFIG_FILE).unwrap_or_else(|_| Self::default_config())
    }

    /// Returns the named profile, or the defaults when `name` is `None`.
    pub fn selector(&self, name: Option<&str>) -> SelcacheResult<&SelectorConfig> {
        match name {
            None => Ok(&self.defaults),
            Some(name) => self
                .selectors
                .get(name)
                .ok_or_else(|| SelcacheError::SelectorNotFound(name.to_string())),
        }
    }

    /// Validates general settings and every selector profile.
    pub fn validate(&self) -> SelcacheResult<()> {
        if !LOG_LEVELS.contains(&self.general.log_level.as_str()) {
            return Err(SelcacheError::config(format!(
                "unknown log_level '{}'",
                self.general.log_level
            )));
        }

        if !LOG_FORMATS.contains(&self.general.log_format.as_str()) {
            return Err(SelcacheError::config(format!(
                "unknown log_format '{}'",
                self.general.log_format
            )));
        }

        self.defaults.validate()?;
        for (name, profile) in &self.selectors {
            profile
                .validate()
                .map_err(|e| SelcacheError::config(format!("selectors.{}: {}", name, e)))?;
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
