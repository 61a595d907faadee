//! Statement execution against the backing table.
//!
//! Each operation opens its own connection, runs exactly one statement and
//! drops the connection. Nothing is pooled here; consistency across threads
//! and processes comes from SQLite executing each statement atomically.
//!
//! Every operation has an async form (run on a `tokio-rusqlite` connection
//! thread) and a `_blocking` form (plain `rusqlite` on the calling thread).
//! Both share the same statement functions.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_rusqlite::rusqlite::{self, OptionalExtension, ffi, named_params};
use tokio_rusqlite::Connection;
use tokio_util::sync::CancellationToken;

use super::options::ResolvedExpiration;
use super::statements::Statements;
use crate::Error;
use crate::clock::Clock;

/// Outcome of an insert-or-replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The row was inserted or replaced.
    Written,
    /// A concurrent writer inserted the same new key first; its row is kept.
    AlreadyInserted,
}

/// Executes cache statements against one table.
#[derive(Debug, Clone)]
pub struct EntryStore {
    path: PathBuf,
    statements: Arc<Statements>,
    clock: Arc<dyn Clock>,
    busy_timeout: Duration,
}

impl EntryStore {
    pub fn new(
        path: impl Into<PathBuf>, schema_name: &str, table_name: &str, clock: Arc<dyn Clock>, busy_timeout: Duration,
    ) -> Self {
        Self {
            path: path.into(),
            statements: Arc::new(Statements::new(schema_name, table_name)),
            clock,
            busy_timeout,
        }
    }

    fn now_micros(&self) -> i64 {
        self.clock.now().timestamp_micros()
    }

    /// Open a connection, run `op` on it, drop the connection.
    async fn round_trip<R, F>(&self, token: &CancellationToken, op: F) -> Result<R, Error>
    where
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let conn = Connection::open(self.path.clone())
            .await
            .map_err(|e| Error::Database(e.into()))?;

        let busy_timeout = self.busy_timeout;
        let call = conn.call(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            op(conn)
        });

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(Error::Cancelled),
            result = call => result.map_err(Error::Database),
        }
    }

    fn round_trip_blocking<R, F>(&self, token: &CancellationToken, op: F) -> Result<R, Error>
    where
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<R>,
    {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut conn = rusqlite::Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(op(&mut conn)?)
    }

    /// Read the value for `key` if it has not expired.
    pub async fn get(&self, key: &str, token: &CancellationToken) -> Result<Option<Vec<u8>>, Error> {
        let sql = self.statements.get.clone();
        let key = key.to_string();
        let now = self.now_micros();
        self.round_trip(token, move |conn| read_value(conn, &sql, &key, now))
            .await
    }

    pub fn get_blocking(&self, key: &str, token: &CancellationToken) -> Result<Option<Vec<u8>>, Error> {
        let now = self.now_micros();
        self.round_trip_blocking(token, |conn| read_value(conn, &self.statements.get, key, now))
    }

    /// Extend the sliding expiration of `key`.
    ///
    /// Missing keys and entries that are not eligible for extension are
    /// silently left alone.
    pub async fn refresh(&self, key: &str, token: &CancellationToken) -> Result<(), Error> {
        let sql = self.statements.refresh.clone();
        let key = key.to_string();
        let now = self.now_micros();
        let extended = self
            .round_trip(token, move |conn| extend_expiration(conn, &sql, &key, now))
            .await?;
        tracing::trace!(extended, "refresh");
        Ok(())
    }

    pub fn refresh_blocking(&self, key: &str, token: &CancellationToken) -> Result<(), Error> {
        let now = self.now_micros();
        let extended = self.round_trip_blocking(token, |conn| extend_expiration(conn, &self.statements.refresh, key, now))?;
        tracing::trace!(extended, "refresh");
        Ok(())
    }

    /// Refresh, then read: the read's own access keeps a sliding entry alive.
    ///
    /// The two round trips are not atomic together. A concurrent delete in
    /// between yields `None`. If the refresh fails, the read is not attempted.
    pub async fn get_and_refresh(&self, key: &str, token: &CancellationToken) -> Result<Option<Vec<u8>>, Error> {
        self.refresh(key, token).await?;
        self.get(key, token).await
    }

    pub fn get_and_refresh_blocking(&self, key: &str, token: &CancellationToken) -> Result<Option<Vec<u8>>, Error> {
        self.refresh_blocking(key, token)?;
        self.get_blocking(key, token)
    }

    /// Insert or replace `key`.
    ///
    /// A duplicate-key failure from a concurrent first writer is reported as
    /// [`UpsertOutcome::AlreadyInserted`]; any other failure is an error.
    /// An expiration that does not yield a future `expires_at` is rejected
    /// with `InvalidArgument` before the store is contacted.
    pub async fn set(
        &self, key: &str, value: &[u8], expiration: &ResolvedExpiration, token: &CancellationToken,
    ) -> Result<UpsertOutcome, Error> {
        let sql = self.statements.upsert.clone();
        let row = EntryRow::new(key, value, expiration)?;
        let expires_at = row.expires_at;
        let outcome = self.round_trip(token, move |conn| upsert(conn, &sql, &row)).await?;
        log_upsert(key, outcome, expires_at);
        Ok(outcome)
    }

    pub fn set_blocking(
        &self, key: &str, value: &[u8], expiration: &ResolvedExpiration, token: &CancellationToken,
    ) -> Result<UpsertOutcome, Error> {
        let row = EntryRow::new(key, value, expiration)?;
        let outcome = self.round_trip_blocking(token, |conn| upsert(conn, &self.statements.upsert, &row))?;
        log_upsert(key, outcome, row.expires_at);
        Ok(outcome)
    }

    /// Delete `key` regardless of its expiration state.
    pub async fn delete(&self, key: &str, token: &CancellationToken) -> Result<(), Error> {
        let sql = self.statements.delete.clone();
        let key = key.to_string();
        self.round_trip(token, move |conn| conn.execute(&sql, named_params! { ":id": key }))
            .await?;
        Ok(())
    }

    pub fn delete_blocking(&self, key: &str, token: &CancellationToken) -> Result<(), Error> {
        self.round_trip_blocking(token, |conn| conn.execute(&self.statements.delete, named_params! { ":id": key }))?;
        Ok(())
    }

    /// Delete every entry whose expiration has passed.
    ///
    /// Returns the number of deleted entries.
    pub async fn delete_expired(&self, token: &CancellationToken) -> Result<u64, Error> {
        let sql = self.statements.delete_expired.clone();
        let now = self.now_micros();
        let count = self
            .round_trip(token, move |conn| conn.execute(&sql, named_params! { ":now": now }))
            .await?;
        Ok(count as u64)
    }

    pub fn delete_expired_blocking(&self, token: &CancellationToken) -> Result<u64, Error> {
        let now = self.now_micros();
        let count = self.round_trip_blocking(token, |conn| {
            conn.execute(&self.statements.delete_expired, named_params! { ":now": now })
        })?;
        Ok(count as u64)
    }

    /// Whether the cache table exists.
    pub async fn table_exists(&self, token: &CancellationToken) -> Result<bool, Error> {
        let sql = self.statements.table_info.clone();
        self.round_trip(token, move |conn| {
            conn.query_row(&sql, [], |row| row.get::<_, String>(0))
                .optional()
                .map(|name| name.is_some())
        })
        .await
    }

    /// Create the cache table and its expiration index if missing.
    ///
    /// Also switches the database file to WAL so readers do not block the
    /// writer. Never called implicitly by the cache.
    pub async fn ensure_table(&self, token: &CancellationToken) -> Result<(), Error> {
        let statements = Arc::clone(&self.statements);
        self.round_trip(token, move |conn| {
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;
            conn.execute(&statements.create_table, [])?;
            conn.execute(&statements.create_index, [])?;
            Ok(())
        })
        .await
    }
}

/// Owned parameters for the upsert statement.
#[derive(Debug)]
struct EntryRow {
    id: String,
    value: Vec<u8>,
    now: i64,
    sliding: Option<i64>,
    absolute: Option<i64>,
    expires_at: DateTime<Utc>,
}

impl EntryRow {
    fn new(key: &str, value: &[u8], expiration: &ResolvedExpiration) -> Result<Self, Error> {
        let expires_at = expiration.expires_at()?;
        Ok(Self {
            id: key.to_string(),
            value: value.to_vec(),
            now: expiration.now().timestamp_micros(),
            sliding: expiration.sliding_seconds(),
            absolute: expiration.absolute_expiration().map(|at| at.timestamp_micros()),
            expires_at,
        })
    }
}

fn read_value(conn: &rusqlite::Connection, sql: &str, key: &str, now: i64) -> rusqlite::Result<Option<Vec<u8>>> {
    conn.query_row(sql, named_params! { ":id": key, ":now": now }, |row| row.get::<_, Vec<u8>>(0))
        .optional()
}

fn extend_expiration(conn: &rusqlite::Connection, sql: &str, key: &str, now: i64) -> rusqlite::Result<usize> {
    conn.execute(sql, named_params! { ":id": key, ":now": now })
}

fn upsert(conn: &rusqlite::Connection, sql: &str, row: &EntryRow) -> rusqlite::Result<UpsertOutcome> {
    let result = conn.execute(
        sql,
        named_params! {
            ":id": row.id,
            ":value": row.value,
            ":now": row.now,
            ":sliding": row.sliding,
            ":absolute": row.absolute,
        },
    );

    match result {
        Ok(_) => Ok(UpsertOutcome::Written),
        Err(err) if is_duplicate_key(&err) => Ok(UpsertOutcome::AlreadyInserted),
        Err(err) => Err(err),
    }
}

fn is_duplicate_key(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY || e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
        }
        _ => false,
    }
}

fn log_upsert(key: &str, outcome: UpsertOutcome, expires_at: DateTime<Utc>) {
    match outcome {
        UpsertOutcome::Written => {
            tracing::debug!(key_len = key.len(), %expires_at, "cache entry written");
        }
        UpsertOutcome::AlreadyInserted => {
            tracing::debug!(key_len = key.len(), "concurrent insert won the race; keeping existing entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::options::EntryOptions;
    use crate::clock::ManualClock;
    use chrono::Duration as ChronoDuration;
    use std::path::Path;

    const DEFAULT_SLIDING: Duration = Duration::from_secs(20 * 60);

    struct Fixture {
        _dir: tempfile::TempDir,
        path: PathBuf,
        clock: Arc<ManualClock>,
        store: EntryStore,
        token: CancellationToken,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.sqlite");
        let clock = Arc::new(ManualClock::new());
        let store = EntryStore::new(&path, "main", "cache_entries", clock.clone(), Duration::from_secs(5));
        let token = CancellationToken::new();
        store.ensure_table(&token).await.unwrap();
        Fixture { _dir: dir, path, clock, store, token }
    }

    /// Read the raw row, bypassing expiration checks.
    fn raw_expires_at(path: &Path, key: &str) -> Option<i64> {
        let conn = rusqlite::Connection::open(path).unwrap();
        conn.query_row("SELECT expires_at FROM cache_entries WHERE id = ?1", [key], |row| row.get(0))
            .optional()
            .unwrap()
    }

    fn row_count(path: &Path) -> i64 {
        let conn = rusqlite::Connection::open(path).unwrap();
        conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0)).unwrap()
    }

    fn resolve(f: &Fixture, opts: EntryOptions) -> ResolvedExpiration {
        opts.resolve(f.clock.now(), DEFAULT_SLIDING).unwrap()
    }

    #[tokio::test]
    async fn test_ensure_table_is_idempotent() {
        let f = fixture().await;
        f.store.ensure_table(&f.token).await.unwrap();
        assert!(f.store.table_exists(&f.token).await.unwrap());
    }

    #[tokio::test]
    async fn test_table_exists_false_for_other_table() {
        let f = fixture().await;
        let other = EntryStore::new(&f.path, "main", "missing", f.clock.clone(), Duration::from_secs(5));
        assert!(!other.table_exists(&f.token).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let f = fixture().await;
        let exp = resolve(&f, EntryOptions::new().with_sliding_expiration(Duration::from_secs(60)));
        let outcome = f.store.set("k", b"hello", &exp, &f.token).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Written);
        assert_eq!(f.store.get("k", &f.token).await.unwrap(), Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let f = fixture().await;
        assert!(f.store.get("nonexistent", &f.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_value_and_expiration() {
        let f = fixture().await;
        let first = resolve(&f, EntryOptions::new().with_sliding_expiration(Duration::from_secs(60)));
        f.store.set("k", b"old", &first, &f.token).await.unwrap();

        let second =
            resolve(&f, EntryOptions::new().with_absolute_expiration_relative_to_now(Duration::from_secs(600)));
        f.store.set("k", b"new", &second, &f.token).await.unwrap();

        assert_eq!(f.store.get("k", &f.token).await.unwrap(), Some(b"new".to_vec()));
        assert_eq!(raw_expires_at(&f.path, "k"), Some((f.clock.now() + ChronoDuration::seconds(600)).timestamp_micros()));
        assert_eq!(row_count(&f.path), 1);
    }

    #[tokio::test]
    async fn test_refresh_extends_sliding_expiration() {
        let f = fixture().await;
        let exp = resolve(&f, EntryOptions::new().with_sliding_expiration(Duration::from_secs(10)));
        f.store.set("k", b"v", &exp, &f.token).await.unwrap();

        f.clock.advance(ChronoDuration::seconds(5));
        f.store.refresh("k", &f.token).await.unwrap();

        let expected = (f.clock.now() + ChronoDuration::seconds(10)).timestamp_micros();
        assert_eq!(raw_expires_at(&f.path, "k"), Some(expected));
    }

    #[tokio::test]
    async fn test_refresh_does_not_touch_absolute_only_entry() {
        let f = fixture().await;
        let exp = resolve(&f, EntryOptions::new().with_absolute_expiration_relative_to_now(Duration::from_secs(30)));
        f.store.set("k", b"v", &exp, &f.token).await.unwrap();
        let before = raw_expires_at(&f.path, "k");

        f.clock.advance(ChronoDuration::seconds(10));
        f.store.refresh("k", &f.token).await.unwrap();

        assert_eq!(raw_expires_at(&f.path, "k"), before);
    }

    #[tokio::test]
    async fn test_refresh_clamps_to_absolute_expiration() {
        let f = fixture().await;
        let absolute = f.clock.now() + ChronoDuration::seconds(20);
        let exp = resolve(
            &f,
            EntryOptions::new()
                .with_sliding_expiration(Duration::from_secs(15))
                .with_absolute_expiration(absolute),
        );
        f.store.set("k", b"v", &exp, &f.token).await.unwrap();

        f.clock.advance(ChronoDuration::seconds(10));
        f.store.refresh("k", &f.token).await.unwrap();

        assert_eq!(raw_expires_at(&f.path, "k"), Some(absolute.timestamp_micros()));
    }

    #[tokio::test]
    async fn test_refresh_skips_expired_entry() {
        let f = fixture().await;
        let exp = resolve(&f, EntryOptions::new().with_sliding_expiration(Duration::from_secs(10)));
        f.store.set("k", b"v", &exp, &f.token).await.unwrap();
        let before = raw_expires_at(&f.path, "k");

        f.clock.advance(ChronoDuration::seconds(11));
        f.store.refresh("k", &f.token).await.unwrap();

        assert_eq!(raw_expires_at(&f.path, "k"), before);
        assert!(f.store.get("k", &f.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_missing_key_is_noop() {
        let f = fixture().await;
        f.store.refresh("missing", &f.token).await.unwrap();
        assert_eq!(row_count(&f.path), 0);
    }

    #[tokio::test]
    async fn test_get_and_refresh_keeps_boundary_entry_alive() {
        let f = fixture().await;
        let exp = resolve(&f, EntryOptions::new().with_sliding_expiration(Duration::from_secs(10)));
        f.store.set("k", b"v", &exp, &f.token).await.unwrap();

        // exactly at expires_at: still readable, and the read extends it
        f.clock.advance(ChronoDuration::seconds(10));
        assert_eq!(f.store.get_and_refresh("k", &f.token).await.unwrap(), Some(b"v".to_vec()));

        f.clock.advance(ChronoDuration::seconds(10));
        assert_eq!(f.store.get_and_refresh("k", &f.token).await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn test_delete_regardless_of_expiration() {
        let f = fixture().await;
        let exp = resolve(&f, EntryOptions::new().with_sliding_expiration(Duration::from_secs(10)));
        f.store.set("live", b"v", &exp, &f.token).await.unwrap();
        f.store.set("dead", b"v", &exp, &f.token).await.unwrap();

        f.clock.advance(ChronoDuration::seconds(30));
        f.store.delete("dead", &f.token).await.unwrap();
        f.store.delete("never-written", &f.token).await.unwrap();

        assert_eq!(raw_expires_at(&f.path, "dead"), None);
        assert!(raw_expires_at(&f.path, "live").is_some());
    }

    #[tokio::test]
    async fn test_delete_expired_only_removes_expired_rows() {
        let f = fixture().await;
        let short = resolve(&f, EntryOptions::new().with_sliding_expiration(Duration::from_secs(10)));
        let long = resolve(&f, EntryOptions::new().with_sliding_expiration(Duration::from_secs(100)));
        let boundary = resolve(&f, EntryOptions::new().with_sliding_expiration(Duration::from_secs(20)));
        f.store.set("short", b"v", &short, &f.token).await.unwrap();
        f.store.set("long", b"v", &long, &f.token).await.unwrap();
        f.store.set("boundary", b"v", &boundary, &f.token).await.unwrap();

        f.clock.advance(ChronoDuration::seconds(20));
        let deleted = f.store.delete_expired(&f.token).await.unwrap();

        assert_eq!(deleted, 1);
        assert_eq!(raw_expires_at(&f.path, "short"), None);
        assert!(raw_expires_at(&f.path, "long").is_some());
        assert!(raw_expires_at(&f.path, "boundary").is_some());
    }

    #[tokio::test]
    async fn test_cancelled_before_round_trip() {
        let f = fixture().await;
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(f.store.get("k", &token).await, Err(Error::Cancelled)));
        assert!(matches!(f.store.get_blocking("k", &token), Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancelled_does_not_open_connection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never-created.sqlite");
        let store = EntryStore::new(&path, "main", "cache_entries", Arc::new(ManualClock::new()), Duration::from_secs(1));
        let token = CancellationToken::new();
        token.cancel();

        assert!(matches!(store.delete_expired(&token).await, Err(Error::Cancelled)));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_missing_table_is_store_failure() {
        let f = fixture().await;
        let other = EntryStore::new(&f.path, "main", "missing", f.clock.clone(), Duration::from_secs(5));
        assert!(matches!(other.get("k", &f.token).await, Err(Error::Database(_))));
    }

    #[tokio::test]
    async fn test_blocking_variants_share_semantics() {
        let f = fixture().await;
        let exp = resolve(&f, EntryOptions::new().with_sliding_expiration(Duration::from_secs(10)));
        f.store.set_blocking("k", b"v", &exp, &f.token).unwrap();

        f.clock.advance(ChronoDuration::seconds(8));
        assert_eq!(f.store.get_and_refresh_blocking("k", &f.token).unwrap(), Some(b"v".to_vec()));
        let expected = (f.clock.now() + ChronoDuration::seconds(10)).timestamp_micros();
        assert_eq!(raw_expires_at(&f.path, "k"), Some(expected));

        f.clock.advance(ChronoDuration::seconds(11));
        assert_eq!(f.store.delete_expired_blocking(&f.token).unwrap(), 1);
        f.store.delete_blocking("k", &f.token).unwrap();
        assert_eq!(row_count(&f.path), 0);
    }

    #[test]
    fn test_duplicate_key_classification() {
        let pk = rusqlite::Error::SqliteFailure(ffi::Error::new(ffi::SQLITE_CONSTRAINT_PRIMARYKEY), None);
        let unique = rusqlite::Error::SqliteFailure(ffi::Error::new(ffi::SQLITE_CONSTRAINT_UNIQUE), None);
        let not_null = rusqlite::Error::SqliteFailure(ffi::Error::new(ffi::SQLITE_CONSTRAINT_NOTNULL), None);
        let check = rusqlite::Error::SqliteFailure(ffi::Error::new(ffi::SQLITE_CONSTRAINT_CHECK), None);

        assert!(is_duplicate_key(&pk));
        assert!(is_duplicate_key(&unique));
        assert!(!is_duplicate_key(&not_null));
        assert!(!is_duplicate_key(&check));
        assert!(!is_duplicate_key(&rusqlite::Error::QueryReturnedNoRows));
    }

    #[tokio::test]
    async fn test_non_duplicate_failure_propagates() {
        let f = fixture().await;
        let too_long = "a".repeat(450);
        let exp = resolve(&f, EntryOptions::new().with_sliding_expiration(Duration::from_secs(10)));
        let result = f.store.set(&too_long, b"v", &exp, &f.token).await;
        assert!(matches!(result, Err(Error::Database(_))));
    }

    #[tokio::test]
    async fn test_hand_built_expiration_never_reaches_store() {
        let f = fixture().await;
        let now = f.clock.now();
        let invalid = [
            ResolvedExpiration { now, sliding_seconds: Some(-60), absolute_expiration: None },
            ResolvedExpiration { now, sliding_seconds: Some(i64::MAX), absolute_expiration: None },
            ResolvedExpiration { now, sliding_seconds: None, absolute_expiration: None },
            ResolvedExpiration { now, sliding_seconds: None, absolute_expiration: Some(now) },
        ];

        for expiration in &invalid {
            let result = f.store.set("k", b"v", expiration, &f.token).await;
            assert!(matches!(result, Err(Error::InvalidArgument(_))), "{expiration:?}");
            assert!(matches!(f.store.set_blocking("k", b"v", expiration, &f.token), Err(Error::InvalidArgument(_))));
        }
        assert_eq!(row_count(&f.path), 0);
    }

    #[tokio::test]
    async fn test_unopenable_database_is_store_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("cache.sqlite");
        let store = EntryStore::new(&path, "main", "cache_entries", Arc::new(ManualClock::new()), Duration::from_secs(1));
        let token = CancellationToken::new();

        assert!(matches!(store.get("k", &token).await, Err(Error::Database(_))));
        assert!(matches!(store.get_blocking("k", &token), Err(Error::Database(_))));
    }
}
