//! cache_get tool implementation.
//!
//! Reads a value by key. Reading extends a sliding expiration.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tablecache_core::{CancellationToken, SqliteCache};

use super::{ValueEncoding, json_result};

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// The key to read. Case-sensitive, matched exactly.
    pub key: String,
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    pub key: String,
    /// Whether a live entry exists for the key.
    pub found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<ValueEncoding>,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(
    cache: &SqliteCache, params: CacheGetParams, token: &CancellationToken,
) -> Result<CallToolResult, McpError> {
    let value = cache.get(&params.key, token).await?;

    let output = match value {
        Some(bytes) => {
            let (text, encoding) = ValueEncoding::encode(bytes);
            CacheGetOutput { key: params.key, found: true, value: Some(text), encoding: Some(encoding) }
        }
        None => CacheGetOutput { key: params.key, found: false, value: None, encoding: None },
    };

    Ok(json_result(&output)?)
}
