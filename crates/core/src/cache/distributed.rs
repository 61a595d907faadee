//! The public cache: get, set, refresh and remove over a shared table.
//!
//! `SqliteCache` keeps no entry state in memory. Every call is a fresh round
//! trip, so any number of processes can share one table. After each
//! successful operation the cache asks its [`ExpirationSweeper`] whether a
//! background sweep of expired rows is due.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tokio_util::sync::CancellationToken;

use super::options::EntryOptions;
use super::statements::KEY_COLUMN_WIDTH;
use super::store::EntryStore;
use super::sweeper::ExpirationSweeper;
use crate::Error;
use crate::clock::{Clock, SystemClock};
use crate::config::{CacheConfig, ConfigError};

/// Distributed cache backed by a SQLite table.
///
/// Cheap to clone; clones share the sweeper state.
#[derive(Debug, Clone)]
pub struct SqliteCache {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    store: EntryStore,
    sweeper: ExpirationSweeper,
    clock: Arc<dyn Clock>,
    default_sliding_expiration: StdDuration,
}

impl SqliteCache {
    /// Build a cache using the wall clock.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the configuration fails validation.
    pub fn from_config(config: &CacheConfig) -> Result<Self, ConfigError> {
        Self::new(config, Arc::new(SystemClock))
    }

    /// Build a cache reading time from `clock`.
    ///
    /// The configuration is validated here, once; the cache never changes it
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the configuration fails validation.
    pub fn new(config: &CacheConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        config.validate()?;

        let interval = Duration::from_std(config.expired_items_deletion_interval()).map_err(|_| {
            ConfigError::Invalid { field: "expired_items_deletion_interval_secs".into(), reason: "out of range".into() }
        })?;

        let store = EntryStore::new(
            config.db_path.clone(),
            &config.schema_name,
            &config.table_name,
            Arc::clone(&clock),
            config.busy_timeout(),
        );

        Ok(Self {
            inner: Arc::new(Inner {
                store,
                sweeper: ExpirationSweeper::new(interval, Arc::clone(&clock)),
                clock,
                default_sliding_expiration: config.default_sliding_expiration(),
            }),
        })
    }

    /// Get the value for `key`, extending its sliding expiration.
    ///
    /// Returns `None` for missing and expired keys.
    pub async fn get(&self, key: &str, token: &CancellationToken) -> Result<Option<Vec<u8>>, Error> {
        validate_key(key, token)?;
        let value = self.inner.store.get_and_refresh(key, token).await?;
        self.sweep_if_due();
        Ok(value)
    }

    pub fn get_blocking(&self, key: &str, token: &CancellationToken) -> Result<Option<Vec<u8>>, Error> {
        validate_key(key, token)?;
        let value = self.inner.store.get_and_refresh_blocking(key, token)?;
        self.sweep_if_due();
        Ok(value)
    }

    /// Insert or replace `key`.
    ///
    /// Keys longer than [`KEY_COLUMN_WIDTH`] characters are dropped without
    /// an error, before the options are looked at; a later `get` simply finds
    /// nothing.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an empty key or an unusable duration.
    /// - `InvalidOperation` when the absolute expiration is not in the future.
    pub async fn set(
        &self, key: &str, value: &[u8], options: &EntryOptions, token: &CancellationToken,
    ) -> Result<(), Error> {
        validate_key(key, token)?;

        if exceeds_key_width(key) {
            tracing::debug!(key_chars = key.chars().count(), "key exceeds column width; write dropped");
        } else {
            let expiration = options.resolve(self.inner.clock.now(), self.inner.default_sliding_expiration)?;
            self.inner.store.set(key, value, &expiration, token).await?;
        }

        self.sweep_if_due();
        Ok(())
    }

    pub fn set_blocking(
        &self, key: &str, value: &[u8], options: &EntryOptions, token: &CancellationToken,
    ) -> Result<(), Error> {
        validate_key(key, token)?;

        if exceeds_key_width(key) {
            tracing::debug!(key_chars = key.chars().count(), "key exceeds column width; write dropped");
        } else {
            let expiration = options.resolve(self.inner.clock.now(), self.inner.default_sliding_expiration)?;
            self.inner.store.set_blocking(key, value, &expiration, token)?;
        }

        self.sweep_if_due();
        Ok(())
    }

    /// Extend the sliding expiration of `key` without reading it.
    pub async fn refresh(&self, key: &str, token: &CancellationToken) -> Result<(), Error> {
        validate_key(key, token)?;
        self.inner.store.refresh(key, token).await?;
        self.sweep_if_due();
        Ok(())
    }

    pub fn refresh_blocking(&self, key: &str, token: &CancellationToken) -> Result<(), Error> {
        validate_key(key, token)?;
        self.inner.store.refresh_blocking(key, token)?;
        self.sweep_if_due();
        Ok(())
    }

    /// Remove `key`. Removing a missing key succeeds.
    pub async fn remove(&self, key: &str, token: &CancellationToken) -> Result<(), Error> {
        validate_key(key, token)?;
        self.inner.store.delete(key, token).await?;
        self.sweep_if_due();
        Ok(())
    }

    pub fn remove_blocking(&self, key: &str, token: &CancellationToken) -> Result<(), Error> {
        validate_key(key, token)?;
        self.inner.store.delete_blocking(key, token)?;
        self.sweep_if_due();
        Ok(())
    }

    /// Delete every expired entry now, bypassing the sweep interval.
    ///
    /// Returns the number of deleted entries.
    pub async fn delete_expired(&self, token: &CancellationToken) -> Result<u64, Error> {
        self.inner.store.delete_expired(token).await
    }

    pub fn delete_expired_blocking(&self, token: &CancellationToken) -> Result<u64, Error> {
        self.inner.store.delete_expired_blocking(token)
    }

    /// Create the cache table if it does not exist yet.
    pub async fn ensure_table(&self, token: &CancellationToken) -> Result<(), Error> {
        self.inner.store.ensure_table(token).await
    }

    pub async fn table_exists(&self, token: &CancellationToken) -> Result<bool, Error> {
        self.inner.store.table_exists(token).await
    }

    /// Start a detached sweep if the interval has elapsed.
    ///
    /// Inside a tokio runtime the sweep is a spawned task; otherwise it runs
    /// on a short-lived thread. Failures are logged and never reach the
    /// caller.
    fn sweep_if_due(&self) {
        if !self.inner.sweeper.try_begin() {
            return;
        }

        let store = self.inner.store.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    log_sweep(store.delete_expired(&CancellationToken::new()).await);
                });
            }
            Err(_) => {
                let spawned = std::thread::Builder::new()
                    .name("tablecache-sweep".into())
                    .spawn(move || log_sweep(store.delete_expired_blocking(&CancellationToken::new())));
                if let Err(e) = spawned {
                    tracing::warn!(error = %e, "failed to start expired entry sweep");
                }
            }
        }
    }
}

fn validate_key(key: &str, token: &CancellationToken) -> Result<(), Error> {
    if key.is_empty() {
        return Err(Error::InvalidArgument("key must not be empty".to_string()));
    }
    if token.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}

fn exceeds_key_width(key: &str) -> bool {
    key.chars().count() > KEY_COLUMN_WIDTH
}

fn log_sweep(result: Result<u64, Error>) {
    match result {
        Ok(deleted) => tracing::info!(deleted, "expired cache entries swept"),
        Err(e) => tracing::warn!(error = %e, "expired cache entry sweep failed"),
    }
}
