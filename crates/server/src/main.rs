//! tablecache MCP server entry point.
//!
//! This is the main binary that boots the MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tablecache_core::{CacheConfig, CancellationToken, SqliteCache};
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = CacheConfig::load()?;
    let cache = SqliteCache::from_config(&config)?;

    let shutdown = CancellationToken::new();
    if !cache.table_exists(&shutdown).await? {
        tracing::info!(schema = %config.schema_name, table = %config.table_name, "Creating cache table");
        cache.ensure_table(&shutdown).await?;
    }

    tracing::info!(
        db_path = %config.db_path.display(),
        table = %config.table_name,
        "Starting tablecache server on stdio transport"
    );

    let handler = handler::CacheServer::new(cache, shutdown.clone());
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;
    shutdown.cancel();

    Ok(())
}
