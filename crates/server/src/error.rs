//! Structured errors for tool input handling.
//!
//! Cache failures convert straight from `tablecache_core::Error`; these
//! cover input the tools must decode before reaching the cache.

use rmcp::model::{ErrorCode, ErrorData as McpError};

/// Errors raised while decoding tool parameters.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// A parameter could not be decoded (bad base64, bad timestamp).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Tool output could not be serialized.
    #[error("SERIALIZE_FAILED: {0}")]
    SerializeFailed(String),
}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        let (code, message) = match &err {
            ToolError::InvalidInput(msg) => (-32602, msg.clone()),
            ToolError::SerializeFailed(msg) => (-32603, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
