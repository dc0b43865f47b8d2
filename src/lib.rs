//! Warden for MCP tool-provider servers
//!
//! Launches MCP servers as validated subprocesses or HTTP endpoints,
//! discovers the tools and resources they expose, routes calls to them,
//! monitors their health and restarts them on failure. Server
//! configuration may originate from semi-trusted API input, so everything
//! that reaches the OS goes through allow-list validation first.

pub mod core;
pub mod security;
pub mod storage;

// Logging setup helpers
pub mod logging;

// MCP (Model Context Protocol) server management
pub mod mcp;
