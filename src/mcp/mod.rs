//! MCP (Model Context Protocol) server management
//!
//! This module launches, supervises and routes calls to the external MCP
//! servers that provide tools and resources to agents.
//!
//! # Architecture
//!
//! - `ServerInstance`: owns one configured server - state machine,
//!   start/stop/restart, discovery, liveness, tool/resource calls
//! - `ClientManager`: owns the set of instances, the agent assignment
//!   index, persistence hooks and the background health loop
//! - `McpToolAdapter`: exposes discovered tools as agent-callable tools
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use mcp_warden::mcp::{ClientManager, ManagerConfig, ServerConfig};
//! use mcp_warden::security::SecurityValidator;
//! use mcp_warden::storage::FileConfigStore;
//!
//! let manager = ClientManager::new(
//!     Arc::new(FileConfigStore::new()),
//!     Arc::new(SecurityValidator::default()),
//!     ManagerConfig::default(),
//! );
//! manager.initialize().await?;
//!
//! manager.add_server(ServerConfig::stdio(
//!     "filesystem",
//!     vec!["npx".into(), "@modelcontextprotocol/server-filesystem".into(), "/tmp".into()],
//! ).with_auto_start(true)).await?;
//!
//! let tools = manager.toolset_for_agent("coder").await;
//! ```
//!
//! # Tool Namespacing
//!
//! Discovered tools are namespaced with their server name to avoid
//! conflicts: server `filesystem` + tool `read_file` is exposed as
//! `filesystem_read_file`.

pub mod config;
pub mod instance;
pub mod manager;
pub mod state;
pub mod tool_adapter;

// Public exports
pub use config::{ManagerConfig, ServerConfig, ServerType};
pub use instance::ServerInstance;
pub use manager::ClientManager;
pub use state::{
    HealthReport, HealthStatus, ResourceInfo, ServerSnapshot, ServerState, ServerStatus, ToolInfo,
};
pub use tool_adapter::{AgentTool, ImageData, McpToolAdapter, ToolOutput};
