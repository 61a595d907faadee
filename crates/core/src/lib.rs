//! Core types and shared functionality for tablecache.
//!
//! This crate provides:
//! - A distributed cache backed by a SQLite table
//! - A pluggable clock for expiration decisions
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;

pub use cache::{EntryOptions, SqliteCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, ConfigError};
pub use error::Error;

pub use tokio_util::sync::CancellationToken;
