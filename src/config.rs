//! Configuration loading and validation.
//!
//! A single `config.toml` with serde defaults for every section, so a
//! minimal file (or none at all) still yields a runnable service.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level service configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Plant record database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Periodic sweep schedule.
    #[serde(default)]
    pub sweep: SweepConfig,

    /// Push notification gateway and retry policy.
    #[serde(default)]
    pub push: PushConfig,
}

/// Database location.
#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Sweep scheduling.
#[derive(Debug, Deserialize)]
pub struct SweepConfig {
    /// Cron expression deciding when a sweep is due (seconds-resolution,
    /// default hourly).
    #[serde(default = "default_sweep_cron")]
    pub cron: String,

    /// Seconds between schedule evaluations.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            cron: default_sweep_cron(),
            tick_secs: default_tick_secs(),
        }
    }
}

/// Push gateway settings.
#[derive(Debug, Deserialize)]
pub struct PushConfig {
    /// Whether notifications are sent at all.
    #[serde(default = "default_push_enabled")]
    pub enabled: bool,

    /// Gateway endpoint receiving send requests.
    #[serde(default = "default_push_endpoint")]
    pub endpoint: String,

    /// Retry policy for transient send failures.
    #[serde(default)]
    pub retry: PushRetryConfig,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: default_push_enabled(),
            endpoint: default_push_endpoint(),
            retry: PushRetryConfig::default(),
        }
    }
}

/// Bounded retry with capped exponential backoff.
#[derive(Debug, Deserialize)]
pub struct PushRetryConfig {
    /// Maximum send attempts per message.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff delay in seconds; doubles per retry.
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,

    /// Upper bound on a single backoff delay in seconds.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
}

impl Default for PushRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_secs: default_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
        }
    }
}

// Default value functions for serde

fn default_db_path() -> PathBuf {
    PathBuf::from("verdant.db")
}
fn default_sweep_cron() -> String {
    // Top of every hour.
    "0 0 * * * *".to_owned()
}
fn default_tick_secs() -> u64 {
    60
}
fn default_push_enabled() -> bool {
    true
}
fn default_push_endpoint() -> String {
    "http://127.0.0.1:8787/v1/send".to_owned()
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_secs() -> u64 {
    1
}
fn default_max_backoff_secs() -> u64 {
    8
}

/// Load the configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config at {}: {e}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config at {}: {e}", path.display()))?;
    Ok(config)
}

/// Resolve the default config directory (`~/.verdant/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".verdant"))
}
