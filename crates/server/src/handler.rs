//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use crate::tools::cache::{
    CacheGetParams, CachePurgeParams, CacheRefreshParams, CacheRemoveParams, CacheSetParams, get_impl, purge_impl,
    refresh_impl, remove_impl, set_impl,
};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use tablecache_core::{CancellationToken, SqliteCache};

/// The main MCP server handler for tablecache.
#[derive(Clone)]
pub struct CacheServer {
    cache: SqliteCache,
    shutdown: CancellationToken,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl CacheServer {
    /// Create a new server handler.
    ///
    /// Cancelling `shutdown` cancels every in-flight cache round trip.
    pub fn new(cache: SqliteCache, shutdown: CancellationToken) -> Self {
        Self { cache, shutdown, tool_router: Self::tool_router() }
    }

    #[tool(description = "Read a cached value by key. Returns found=false for missing or expired keys. \
                          Reading extends a sliding expiration.")]
    async fn cache_get(&self, params: Parameters<CacheGetParams>) -> Result<CallToolResult, McpError> {
        get_impl(&self.cache, params.0, &self.shutdown.child_token()).await
    }

    #[tool(description = "Insert or replace a cached value. Supports sliding expiration (seconds), \
                          absolute expiration (RFC 3339) or absolute expiration relative to now (seconds).")]
    async fn cache_set(&self, params: Parameters<CacheSetParams>) -> Result<CallToolResult, McpError> {
        set_impl(&self.cache, params.0, &self.shutdown.child_token()).await
    }

    #[tool(description = "Reset the sliding expiration of a cached value without reading it.")]
    async fn cache_refresh(&self, params: Parameters<CacheRefreshParams>) -> Result<CallToolResult, McpError> {
        refresh_impl(&self.cache, params.0, &self.shutdown.child_token()).await
    }

    #[tool(description = "Delete a cached value. Deleting a missing key succeeds.")]
    async fn cache_remove(&self, params: Parameters<CacheRemoveParams>) -> Result<CallToolResult, McpError> {
        remove_impl(&self.cache, params.0, &self.shutdown.child_token()).await
    }

    #[tool(description = "Delete all expired entries now. Returns the number of deleted entries.")]
    async fn cache_purge_expired(&self, params: Parameters<CachePurgeParams>) -> Result<CallToolResult, McpError> {
        purge_impl(&self.cache, params.0, &self.shutdown.child_token()).await
    }
}

impl ServerHandler for CacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "tablecache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
