//! cache_set tool implementation.
//!
//! Inserts or replaces a value with sliding and/or absolute expiration.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tablecache_core::{CancellationToken, EntryOptions, SqliteCache};

use super::{ValueEncoding, json_result};
use crate::error::ToolError;

/// Parameters for the cache_set tool.
///
/// With no expiration fields, the server's default sliding expiration applies.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheSetParams {
    /// The key to write. Keys longer than 449 characters are ignored.
    pub key: String,

    /// The value, encoded as described by `encoding`.
    pub value: String,

    /// "utf8" (default) or "base64".
    #[serde(default)]
    pub encoding: ValueEncoding,

    /// Sliding expiration in seconds, extended by every read.
    #[serde(default)]
    pub sliding_expiration_secs: Option<u64>,

    /// Absolute expiration as an RFC 3339 timestamp.
    #[serde(default)]
    pub absolute_expiration: Option<String>,

    /// Absolute expiration in seconds from now. Wins over `absolute_expiration`.
    #[serde(default)]
    pub absolute_expiration_relative_secs: Option<u64>,
}

/// Output from the cache_set tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheSetOutput {
    pub key: String,
    /// Number of value bytes submitted.
    pub bytes: usize,
}

impl CacheSetParams {
    fn entry_options(&self) -> Result<EntryOptions, ToolError> {
        let mut options = EntryOptions::new();

        if let Some(secs) = self.sliding_expiration_secs {
            options = options.with_sliding_expiration(Duration::from_secs(secs));
        }

        if let Some(at) = &self.absolute_expiration {
            let at = DateTime::parse_from_rfc3339(at)
                .map_err(|e| ToolError::InvalidInput(format!("absolute_expiration is not RFC 3339: {e}")))?;
            options = options.with_absolute_expiration(at.with_timezone(&Utc));
        }

        if let Some(secs) = self.absolute_expiration_relative_secs {
            options = options.with_absolute_expiration_relative_to_now(Duration::from_secs(secs));
        }

        Ok(options)
    }
}

/// Implementation of the cache_set tool.
pub async fn set_impl(
    cache: &SqliteCache, params: CacheSetParams, token: &CancellationToken,
) -> Result<CallToolResult, McpError> {
    let options = params.entry_options()?;
    let value = params.encoding.decode(&params.value)?;

    cache.set(&params.key, &value, &options, token).await?;

    let output = CacheSetOutput { key: params.key, bytes: value.len() };
    Ok(json_result(&output)?)
}
