//! Persistence for server configurations
//!
//! The manager talks to storage through the `ConfigStore` port; the
//! hosting application decides what backs it. Two adapters ship with the
//! crate:
//! - `FileConfigStore` - one JSON document per server under a directory
//! - `MemoryConfigStore` - in-memory map for tests and embedding

pub mod file;
pub mod memory;

use async_trait::async_trait;

use crate::core::WardenResult;
use crate::mcp::config::ServerConfig;

pub use file::FileConfigStore;
pub use memory::MemoryConfigStore;

/// Persistence port for server configurations and agent assignments
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Persist a config, returning its stable storage id
    async fn save_config(&self, config: &ServerConfig) -> WardenResult<String>;

    /// Load every persisted config
    async fn load_all_configs(&self) -> WardenResult<Vec<ServerConfig>>;

    /// Delete a config and its assignments
    async fn delete_config(&self, name: &str) -> WardenResult<()>;

    /// Agents assigned to a server
    async fn agent_assignments(&self, server: &str) -> WardenResult<Vec<String>>;

    /// Replace the agents assigned to a server
    async fn set_agent_assignments(&self, server: &str, agents: &[String]) -> WardenResult<()>;
}
