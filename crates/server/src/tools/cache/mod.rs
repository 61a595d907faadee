//! Cache-related MCP tools.
//!
//! This module provides tools for interacting with the shared cache table.

pub mod get;
pub mod purge;
pub mod refresh;
pub mod remove;
pub mod set;

use base64::{Engine, engine::general_purpose::STANDARD};
use rmcp::model::{CallToolResult, Content};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;

pub use get::{CacheGetParams, get_impl};
pub use purge::{CachePurgeParams, purge_impl};
pub use refresh::{CacheRefreshParams, refresh_impl};
pub use remove::{CacheRemoveParams, remove_impl};
pub use set::{CacheSetParams, set_impl};

/// How a value travels through a tool call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ValueEncoding {
    /// The value is UTF-8 text.
    #[default]
    Utf8,
    /// The value is standard base64 of arbitrary bytes.
    Base64,
}

impl ValueEncoding {
    pub fn decode(self, value: &str) -> Result<Vec<u8>, ToolError> {
        match self {
            ValueEncoding::Utf8 => Ok(value.as_bytes().to_vec()),
            ValueEncoding::Base64 => STANDARD
                .decode(value)
                .map_err(|e| ToolError::InvalidInput(format!("value is not valid base64: {e}"))),
        }
    }

    /// Text when the bytes are UTF-8, base64 otherwise.
    pub fn encode(bytes: Vec<u8>) -> (String, ValueEncoding) {
        match String::from_utf8(bytes) {
            Ok(text) => (text, ValueEncoding::Utf8),
            Err(e) => (STANDARD.encode(e.into_bytes()), ValueEncoding::Base64),
        }
    }
}

fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, ToolError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| ToolError::SerializeFailed(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
