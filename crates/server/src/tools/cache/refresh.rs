//! cache_refresh tool implementation.
//!
//! Extends a sliding expiration without returning the value.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tablecache_core::{CancellationToken, SqliteCache};

use super::json_result;

/// Parameters for the cache_refresh tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheRefreshParams {
    /// The key whose sliding expiration should be reset.
    pub key: String,
}

/// Output from the cache_refresh tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheRefreshOutput {
    pub key: String,
}

/// Implementation of the cache_refresh tool.
pub async fn refresh_impl(
    cache: &SqliteCache, params: CacheRefreshParams, token: &CancellationToken,
) -> Result<CallToolResult, McpError> {
    cache.refresh(&params.key, token).await?;
    Ok(json_result(&CacheRefreshOutput { key: params.key })?)
}
