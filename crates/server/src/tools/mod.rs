//! MCP tool implementations.
//!
//! This module contains all tools exposed by the tablecache server.

pub mod cache;
