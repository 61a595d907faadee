//! Distributed cache over a SQLite table.
//!
//! This module provides the entry lifecycle engine:
//!
//! - Sliding and absolute expiration, evaluated inside each statement
//! - Insert-or-replace that tolerates concurrent first writers
//! - Reads that extend sliding expiration as a side effect
//! - Rate-limited background sweeps of expired rows

pub mod distributed;
pub mod options;
pub mod statements;
pub mod store;
pub mod sweeper;

pub use crate::Error;

pub use distributed::SqliteCache;
pub use options::{EntryOptions, ResolvedExpiration};
pub use statements::{DEFAULT_VALUE_COLUMN_WIDTH, KEY_COLUMN_WIDTH, Statements};
pub use store::{EntryStore, UpsertOutcome};
pub use sweeper::ExpirationSweeper;
