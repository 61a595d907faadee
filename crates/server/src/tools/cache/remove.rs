//! cache_remove tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tablecache_core::{CancellationToken, SqliteCache};

use super::json_result;

/// Parameters for the cache_remove tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheRemoveParams {
    /// The key to delete. Deleting a missing key succeeds.
    pub key: String,
}

/// Output from the cache_remove tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheRemoveOutput {
    pub key: String,
}

/// Implementation of the cache_remove tool.
pub async fn remove_impl(
    cache: &SqliteCache, params: CacheRemoveParams, token: &CancellationToken,
) -> Result<CallToolResult, McpError> {
    cache.remove(&params.key, token).await?;
    Ok(json_result(&CacheRemoveOutput { key: params.key })?)
}
