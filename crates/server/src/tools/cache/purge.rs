//! cache_purge_expired tool implementation.
//!
//! Deletes every expired entry immediately, outside the sweep schedule.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tablecache_core::{CancellationToken, SqliteCache};

use super::json_result;

/// Parameters for the cache_purge_expired tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeParams {}

/// Output from the cache_purge_expired tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeOutput {
    /// Number of entries deleted.
    pub deleted: u64,
}

/// Implementation of the cache_purge_expired tool.
pub async fn purge_impl(
    cache: &SqliteCache, _params: CachePurgeParams, token: &CancellationToken,
) -> Result<CallToolResult, McpError> {
    let deleted = cache.delete_expired(token).await?;
    Ok(json_result(&CachePurgeOutput { deleted })?)
}
