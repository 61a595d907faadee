//! Cache configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (TABLECACHE_*)
//! 2. TOML config file (if TABLECACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Smallest accepted interval between expiration sweeps.
pub const MINIMUM_DELETION_INTERVAL_SECS: u64 = 5 * 60;

/// Cache configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (TABLECACHE_*)
/// 2. TOML config file (if TABLECACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Path to the SQLite database holding the cache table.
    ///
    /// Set via TABLECACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Schema the cache table lives in (`main` or an attached database).
    ///
    /// Set via TABLECACHE_SCHEMA_NAME environment variable.
    #[serde(default = "default_schema_name")]
    pub schema_name: String,

    /// Name of the cache table.
    ///
    /// Set via TABLECACHE_TABLE_NAME environment variable.
    #[serde(default = "default_table_name")]
    pub table_name: String,

    /// Sliding expiration applied to writes that specify no expiration.
    ///
    /// Set via TABLECACHE_DEFAULT_SLIDING_EXPIRATION_SECS environment variable.
    #[serde(default = "default_sliding_expiration_secs")]
    pub default_sliding_expiration_secs: u64,

    /// Minimum time between two background sweeps of expired entries.
    ///
    /// Set via TABLECACHE_EXPIRED_ITEMS_DELETION_INTERVAL_SECS environment variable.
    #[serde(default = "default_deletion_interval_secs")]
    pub expired_items_deletion_interval_secs: u64,

    /// How long a statement waits on a locked database before failing.
    ///
    /// Set via TABLECACHE_BUSY_TIMEOUT_MS environment variable.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./tablecache.sqlite")
}

fn default_schema_name() -> String {
    "main".into()
}

fn default_table_name() -> String {
    "cache_entries".into()
}

fn default_sliding_expiration_secs() -> u64 {
    20 * 60
}

fn default_deletion_interval_secs() -> u64 {
    30 * 60
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            schema_name: default_schema_name(),
            table_name: default_table_name(),
            default_sliding_expiration_secs: default_sliding_expiration_secs(),
            expired_items_deletion_interval_secs: default_deletion_interval_secs(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl CacheConfig {
    /// Config pointing at `db_path` with every other field defaulted.
    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        Self { db_path: db_path.into(), ..Default::default() }
    }

    pub fn default_sliding_expiration(&self) -> Duration {
        Duration::from_secs(self.default_sliding_expiration_secs)
    }

    pub fn expired_items_deletion_interval(&self) -> Duration {
        Duration::from_secs(self.expired_items_deletion_interval_secs)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `TABLECACHE_`
    /// 2. TOML file from `TABLECACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("TABLECACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("TABLECACHE_")
                .ignore(&["config_file"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
