//! CLI command implementations.

use std::path::{Path, PathBuf};

use crate::cli::workload::{replay as replay_workload, ReplayReport, Workload};
use crate::types::config::{Config, SelectorConfig, CONFIG_FILE};
use crate::{SelcacheError, SelcacheResult};

/// Writes a default configuration in the specified directory.
pub async fn init(path: Option<PathBuf>) -> SelcacheResult<()> {
    let target_dir = path.unwrap_or_else(|| PathBuf::from("."));

    if !target_dir.exists() {
        std::fs::create_dir_all(&target_dir)?;
        tracing::info!("Directory created: {}", target_dir.display());
    }

    let config_path = target_dir.join(CONFIG_FILE);

    if config_path.exists() {
        println!("Configuration already exists at: {}", config_path.display());
        println!("Use 'selcache config' to inspect it.");
        return Ok(());
    }

    let config = Config::default_config();
    config.save(&config_path)?;

    println!("selcache initialized successfully!");
    println!("Configuration created at: {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Add selector profiles under [selectors.<name>]");
    println!("  2. Check them: selcache doctor");
    println!("  3. Replay a workload: selcache replay workload.json --selector <name>");

    Ok(())
}

/// Prints the effective configuration as TOML.
pub async fn config_cmd(config_path: &Path) -> SelcacheResult<()> {
    let config = if config_path.exists() {
        Config::load(config_path)?
    } else {
        tracing::debug!("No configuration at {}, showing defaults", config_path.display());
        Config::default_config()
    };

    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn describe(profile: &SelectorConfig) -> String {
    let capacity = match profile.capacity {
        0 => "unbounded".to_string(),
        n => n.to_string(),
    };
    let ttl = profile
        .ttl_ms
        .map_or_else(|| "none".to_string(), |ms| format!("{}ms", ms));
    let max_keys = profile
        .max_keys
        .map_or_else(|| "unbounded".to_string(), |n| n.to_string());

    format!("capacity={}, ttl={}, max_keys={}", capacity, ttl, max_keys)
}

fn profile_warnings(name: &str, profile: &SelectorConfig, warnings: &mut Vec<String>) {
    if profile.capacity == 0 && profile.ttl_ms.is_none() {
        warnings.push(format!(
            "{}: unbounded capacity without ttl_ms, results are never released",
            name
        ));
    }
    if profile.ttl_ms == Some(0) {
        warnings.push(format!("{}: ttl_ms = 0 expires every result immediately", name));
    }
}

/// Validates the configuration and reports each selector profile.
///
/// Fails when the configuration cannot be loaded or is invalid.
pub async fn doctor(config_path: &Path) -> SelcacheResult<()> {
    println!("Checking selcache configuration...\n");

    let mut issues: Vec<String> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();

    let config = if config_path.exists() {
        match Config::load(config_path) {
            Ok(config) => {
                println!("✓ Configuration loaded from {}", config_path.display());
                config
            }
            Err(e) => {
                issues.push(format!("{}: {}", config_path.display(), e));
                Config::default_config()
            }
        }
    } else {
        warnings.push(format!(
            "{} not found, using defaults (run 'selcache init')",
            config_path.display()
        ));
        Config::default_config()
    };

    if let Err(e) = config.validate() {
        issues.push(e.to_string());
    }

    println!(
        "  log: level={}, format={}",
        config.general.log_level, config.general.log_format
    );
    println!("  defaults: {}", describe(&config.defaults));
    profile_warnings("defaults", &config.defaults, &mut warnings);

    for (name, profile) in &config.selectors {
        println!("  selectors.{}: {}", name, describe(profile));
        profile_warnings(&format!("selectors.{}", name), profile, &mut warnings);
    }

    println!();
    if issues.is_empty() && warnings.is_empty() {
        println!("✓ All good!");
    } else {
        if !warnings.is_empty() {
            println!("Warnings:");
            for warning in &warnings {
                println!("  ⚠ {}", warning);
            }
        }
        if !issues.is_empty() {
            println!("Problems:");
            for issue in &issues {
                println!("  ✗ {}", issue);
            }
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(SelcacheError::config(format!(
            "{} problem(s) found",
            issues.len()
        )))
    }
}

fn print_report(report: &ReplayReport) {
    println!("Replay of '{}'\n", report.selector);
    for outcome in &report.outcomes {
        let status = if outcome.hit { "hit" } else { "miss" };
        match &outcome.key {
            Some(key) => println!("  #{:<4} {} {}", outcome.index, key, status),
            None => println!("  #{:<4} {}", outcome.index, status),
        }
    }

    println!();
    println!("calls:       {}", report.calls);
    println!("hits:        {}", report.hits);
    println!("misses:      {}", report.misses);
    println!("hit rate:    {:.1}%", report.hit_rate * 100.0);
    println!("evictions:   {}", report.evictions);
    println!("expirations: {}", report.expirations);
    println!("key resets:  {}", report.key_resets);
    println!("keys:        {}", report.keys);
    println!("interned:    {}", report.interned);
}

/// Replays a workload file through the selected profile.
pub async fn replay(
    workload_path: &Path,
    selector: Option<&str>,
    json: bool,
    config: &Config,
) -> SelcacheResult<()> {
    let workload = Workload::load(workload_path)?;

    let name = selector.or(workload.selector.as_deref());
    let profile = config.selector(name)?;
    let name = name.unwrap_or("defaults");
    tracing::debug!(selector = name, calls = workload.calls.len(), "Replaying workload");

    let report = replay_workload(&workload, name, profile).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(())
}

/// Shows version.
pub fn version() {
    println!("selcache {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Memoized selectors with bounded caches and TTL expiry");
}
