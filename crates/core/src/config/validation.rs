//! Configuration validation rules.
//!
//! This module provides validation logic for `CacheConfig` values
//! after they have been loaded from environment, files, or defaults.

use super::{CacheConfig, MINIMUM_DELETION_INTERVAL_SECS};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl CacheConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `db_path`, `schema_name` or `table_name` is empty
    /// - `default_sliding_expiration_secs` is 0
    /// - `expired_items_deletion_interval_secs` is below 5 minutes
    /// - `busy_timeout_ms` is 0 or exceeds 1 minute
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.db_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid { field: "db_path".into(), reason: "must not be empty".into() });
        }
        if self.schema_name.is_empty() {
            return Err(ConfigError::Invalid { field: "schema_name".into(), reason: "must not be empty".into() });
        }
        if self.table_name.is_empty() {
            return Err(ConfigError::Invalid { field: "table_name".into(), reason: "must not be empty".into() });
        }

        if self.default_sliding_expiration_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "default_sliding_expiration_secs".into(),
                reason: "the sliding expiration value must be positive".into(),
            });
        }

        if self.expired_items_deletion_interval_secs < MINIMUM_DELETION_INTERVAL_SECS {
            return Err(ConfigError::Invalid {
                field: "expired_items_deletion_interval_secs".into(),
                reason: format!("cannot be less than the minimum value of {MINIMUM_DELETION_INTERVAL_SECS} seconds"),
            });
        }

        if self.busy_timeout_ms == 0 {
            return Err(ConfigError::Invalid { field: "busy_timeout_ms".into(), reason: "must be greater than 0".into() });
        }
        if self.busy_timeout_ms > 60_000 {
            return Err(ConfigError::Invalid {
                field: "busy_timeout_ms".into(),
                reason: "must not exceed 1 minute (60000ms)".into(),
            });
        }

        Ok(())
    }
}
