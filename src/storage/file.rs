//! File-backed config store
//!
//! One pretty-printed JSON document per server under a base directory.
//! Server names reach storage already validated as identifiers, so the
//! name doubles as the file stem.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{WardenError, WardenResult};
use crate::mcp::config::ServerConfig;

use super::ConfigStore;

/// Default directory for server config storage
const SERVERS_DIR: &str = "servers";

/// On-disk form: the config plus its stable storage id
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredConfig {
    /// Assigned on first save, stable across overwrites
    id: String,
    #[serde(flatten)]
    config: ServerConfig,
}

/// Config store persisting one JSON file per server
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    base_dir: PathBuf,
}

impl FileConfigStore {
    /// Create a store using the default directory
    pub fn new() -> Self {
        Self {
            base_dir: PathBuf::from(SERVERS_DIR),
        }
    }

    /// Create a store rooted at a custom directory
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: dir.into(),
        }
    }

    /// Get the file path for a server config
    pub fn config_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(format!("{name}.json"))
    }

    /// Get the base directory
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn ensure_base_dir(&self) -> WardenResult<()> {
        if !self.base_dir.exists() {
            fs::create_dir_all(&self.base_dir)?;
        }
        Ok(())
    }

    fn read_stored(&self, path: &Path) -> WardenResult<StoredConfig> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }

    fn write_stored(&self, stored: &StoredConfig) -> WardenResult<()> {
        self.ensure_base_dir()?;
        let path = self.config_path(&stored.config.name);
        let file = File::create(&path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, stored)?;
        Ok(())
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn save_config(&self, config: &ServerConfig) -> WardenResult<String> {
        let path = self.config_path(&config.name);
        // Keep the id stable across overwrites
        let id = if path.exists() {
            match self.read_stored(&path) {
                Ok(existing) => existing.id,
                Err(_) => Uuid::new_v4().to_string(),
            }
        } else {
            Uuid::new_v4().to_string()
        };

        let stored = StoredConfig {
            id: id.clone(),
            config: config.clone(),
        };
        self.write_stored(&stored)?;
        Ok(id)
    }

    async fn load_all_configs(&self) -> WardenResult<Vec<ServerConfig>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut configs = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.read_stored(&path) {
                Ok(stored) => configs.push(stored.config),
                Err(e) => {
                    tracing::warn!(
                        "[FileConfigStore] Skipping unreadable config {}: {}",
                        path.display(),
                        e
                    );
                }
            }
        }
        configs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(configs)
    }

    async fn delete_config(&self, name: &str) -> WardenResult<()> {
        let path = self.config_path(name);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    async fn agent_assignments(&self, server: &str) -> WardenResult<Vec<String>> {
        let path = self.config_path(server);
        if !path.exists() {
            return Err(WardenError::ServerNotFound(server.to_string()));
        }
        let stored = self.read_stored(&path)?;
        Ok(stored.config.agent_names.into_iter().collect())
    }

    async fn set_agent_assignments(&self, server: &str, agents: &[String]) -> WardenResult<()> {
        let path = self.config_path(server);
        if !path.exists() {
            return Err(WardenError::ServerNotFound(server.to_string()));
        }
        let mut stored = self.read_stored(&path)?;
        stored.config.agent_names = agents.iter().cloned().collect::<BTreeSet<String>>();
        self.write_stored(&stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (FileConfigStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FileConfigStore::with_dir(temp_dir.path());
        (store, temp_dir)
    }

    fn sample_config() -> ServerConfig {
        ServerConfig::stdio(
            "filesystem",
            vec!["npx".to_string(), "mcp-files".to_string()],
        )
        .with_agent("coder")
        .with_priority(3)
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let (store, _temp) = create_test_store();

        let id = store.save_config(&sample_config()).await.unwrap();
        assert!(!id.is_empty());

        let configs = store.load_all_configs().await.unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0], sample_config());
    }

    #[tokio::test]
    async fn test_id_is_stable_across_saves() {
        let (store, _temp) = create_test_store();

        let first = store.save_config(&sample_config()).await.unwrap();
        let second = store
            .save_config(&sample_config().with_priority(9))
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_delete_config() {
        let (store, _temp) = create_test_store();
        store.save_config(&sample_config()).await.unwrap();

        store.delete_config("filesystem").await.unwrap();
        assert!(store.load_all_configs().await.unwrap().is_empty());

        // Deleting again is fine
        store.delete_config("filesystem").await.unwrap();
    }

    #[tokio::test]
    async fn test_assignments_round_trip() {
        let (store, _temp) = create_test_store();
        store.save_config(&sample_config()).await.unwrap();

        let agents = store.agent_assignments("filesystem").await.unwrap();
        assert_eq!(agents, vec!["coder".to_string()]);

        store
            .set_agent_assignments(
                "filesystem",
                &["coder".to_string(), "researcher".to_string()],
            )
            .await
            .unwrap();
        let agents = store.agent_assignments("filesystem").await.unwrap();
        assert_eq!(agents.len(), 2);

        // The rewritten file still loads as a config
        let configs = store.load_all_configs().await.unwrap();
        assert!(configs[0].agent_names.contains("researcher"));
    }

    #[tokio::test]
    async fn test_assignments_for_unknown_server() {
        let (store, _temp) = create_test_store();
        assert!(matches!(
            store.agent_assignments("ghost").await.unwrap_err(),
            WardenError::ServerNotFound(_)
        ));
        assert!(store
            .set_agent_assignments("ghost", &[])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_load_skips_unreadable_files() {
        let (store, temp) = create_test_store();
        store.save_config(&sample_config()).await.unwrap();
        std::fs::write(temp.path().join("broken.json"), "not json").unwrap();
        std::fs::write(temp.path().join("ignored.txt"), "not a config").unwrap();

        let configs = store.load_all_configs().await.unwrap();
        assert_eq!(configs.len(), 1);
    }
}
