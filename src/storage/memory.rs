//! In-memory config store
//!
//! Backs tests and in-process embedding where nothing should touch disk.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::{WardenError, WardenResult};
use crate::mcp::config::ServerConfig;

use super::ConfigStore;

/// Config store holding everything in a map
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    /// Server name to (storage id, config)
    entries: RwLock<HashMap<String, (String, ServerConfig)>>,
}

impl MemoryConfigStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a config directly, bypassing the port. Test setup helper.
    pub async fn seed(&self, config: ServerConfig) {
        let mut entries = self.entries.write().await;
        entries.insert(
            config.name.clone(),
            (Uuid::new_v4().to_string(), config),
        );
    }

    /// Number of stored configs
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store is empty
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn save_config(&self, config: &ServerConfig) -> WardenResult<String> {
        let mut entries = self.entries.write().await;
        let id = entries
            .get(&config.name)
            .map(|(id, _)| id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        entries.insert(config.name.clone(), (id.clone(), config.clone()));
        Ok(id)
    }

    async fn load_all_configs(&self) -> WardenResult<Vec<ServerConfig>> {
        let entries = self.entries.read().await;
        let mut configs: Vec<ServerConfig> =
            entries.values().map(|(_, config)| config.clone()).collect();
        configs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(configs)
    }

    async fn delete_config(&self, name: &str) -> WardenResult<()> {
        self.entries.write().await.remove(name);
        Ok(())
    }

    async fn agent_assignments(&self, server: &str) -> WardenResult<Vec<String>> {
        let entries = self.entries.read().await;
        let (_, config) = entries
            .get(server)
            .ok_or_else(|| WardenError::ServerNotFound(server.to_string()))?;
        Ok(config.agent_names.iter().cloned().collect())
    }

    async fn set_agent_assignments(&self, server: &str, agents: &[String]) -> WardenResult<()> {
        let mut entries = self.entries.write().await;
        let (_, config) = entries
            .get_mut(server)
            .ok_or_else(|| WardenError::ServerNotFound(server.to_string()))?;
        config.agent_names = agents.iter().cloned().collect::<BTreeSet<String>>();
        Ok(())
    }
}
