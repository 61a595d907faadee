//! Unified error types for tablecache.
//!
//! Absence of a key is never an error: reads return `None` and
//! refresh/remove on a missing key succeed silently.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error type for cache operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required argument was empty or malformed.
    #[error("INVALID_ARGUMENT: {0}")]
    InvalidArgument(String),

    /// The requested expiration policy cannot be applied.
    #[error("INVALID_OPERATION: {0}")]
    InvalidOperation(String),

    /// The caller cancelled the operation.
    #[error("CANCELLED: operation was cancelled")]
    Cancelled,

    /// The backing store rejected or failed a statement.
    #[error("STORE_FAILURE: {0}")]
    Database(tokio_rusqlite::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidArgument(msg) => (-32602, msg.clone()),
            Error::InvalidOperation(msg) => (-32000, msg.clone()),
            Error::Cancelled => (-32800, "Operation cancelled".to_string()),
            Error::Database(e) => (-32002, e.to_string()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
