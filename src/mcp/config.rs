//! Server and manager configuration
//!
//! Configuration types for managed MCP servers

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use crate::core::ValidationError;

/// Transport used to reach a tool-provider server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    /// Child process speaking MCP over stdin/stdout
    #[default]
    Stdio,
    /// Remote endpoint speaking MCP over streamable HTTP
    Http,
}

impl std::fmt::Display for ServerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerType::Stdio => write!(f, "stdio"),
            ServerType::Http => write!(f, "http"),
        }
    }
}

/// Configuration for a single managed server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Unique identifier for this server (used for namespacing tools)
    pub name: String,

    /// Transport type
    #[serde(default)]
    pub server_type: ServerType,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Program and arguments (stdio servers)
    #[serde(default)]
    pub command: Vec<String>,

    /// Environment requested for the child process; filtered before launch
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Endpoint URL (http servers)
    #[serde(default)]
    pub http_url: Option<String>,

    /// Whether to start this server when it is registered or loaded
    #[serde(default)]
    pub auto_start: bool,

    /// How many times the health loop may retry a failing server
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Bound on start, tool and resource operations
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Free-form labels
    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Higher-priority servers are listed first for an agent
    #[serde(default)]
    pub priority: i32,

    /// Agents allowed to use this server
    #[serde(default)]
    pub agent_names: BTreeSet<String>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_seconds() -> u64 {
    30
}

impl ServerConfig {
    /// Create a stdio server configuration
    pub fn stdio(name: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            server_type: ServerType::Stdio,
            description: String::new(),
            command,
            env: HashMap::new(),
            http_url: None,
            auto_start: false,
            max_retries: default_max_retries(),
            timeout_seconds: default_timeout_seconds(),
            tags: BTreeSet::new(),
            priority: 0,
            agent_names: BTreeSet::new(),
        }
    }

    /// Create an http server configuration
    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            server_type: ServerType::Http,
            description: String::new(),
            command: Vec::new(),
            env: HashMap::new(),
            http_url: Some(url.into()),
            auto_start: false,
            max_retries: default_max_retries(),
            timeout_seconds: default_timeout_seconds(),
            tags: BTreeSet::new(),
            priority: 0,
            agent_names: BTreeSet::new(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add an environment variable request
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set auto-start behavior
    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// Set the retry bound for the health loop
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the operation timeout
    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    /// Add a tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Set the listing priority (higher = preferred)
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Grant an agent access to this server
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent_names.insert(agent.into());
        self
    }

    /// Operation timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Structural validation: a stdio server needs a command, an http
    /// server needs a URL.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.server_type {
            ServerType::Stdio if self.command.is_empty() => {
                Err(ValidationError::MissingCommand {
                    name: self.name.clone(),
                })
            }
            ServerType::Http if self.http_url.is_none() => Err(ValidationError::MissingHttpUrl {
                name: self.name.clone(),
            }),
            _ => Ok(()),
        }
    }
}

/// Configuration for the client manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Seconds between background health sweeps
    #[serde(default = "default_health_interval_secs")]
    pub health_check_interval_secs: u64,
}

fn default_health_interval_secs() -> u64 {
    60
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            health_check_interval_secs: default_health_interval_secs(),
        }
    }
}

impl ManagerConfig {
    /// Create the default manager configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the health sweep interval
    pub fn with_health_check_interval(mut self, interval_secs: u64) -> Self {
        self.health_check_interval_secs = interval_secs;
        self
    }

    /// Health sweep interval as a Duration
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stdio_config_builder() {
        let config = ServerConfig::stdio(
            "filesystem",
            vec!["npx".to_string(), "mcp-files".to_string()],
        )
        .with_description("File access")
        .with_env("LANG", "C")
        .with_auto_start(true)
        .with_max_retries(5)
        .with_timeout_seconds(10)
        .with_tag("files")
        .with_priority(10)
        .with_agent("coder");

        assert_eq!(config.name, "filesystem");
        assert_eq!(config.server_type, ServerType::Stdio);
        assert!(config.auto_start);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert!(config.agent_names.contains("coder"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_missing_command() {
        let config = ServerConfig::stdio("broken", vec![]);
        assert!(matches!(
            config.validate(),
            Err(ValidationError::MissingCommand { .. })
        ));
    }

    #[test]
    fn test_validate_missing_url() {
        let mut config = ServerConfig::http("remote", "http://localhost:8005/mcp");
        assert!(config.validate().is_ok());
        config.http_url = None;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::MissingHttpUrl { .. })
        ));
    }

    #[test]
    fn test_serde_defaults() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"name": "files", "command": ["npx", "mcp-files"]}"#).unwrap();
        assert_eq!(config.server_type, ServerType::Stdio);
        assert!(!config.auto_start);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.timeout_seconds, 30);
        assert!(config.tags.is_empty());
    }

    #[test]
    fn test_serde_round_trip() {
        let config = ServerConfig::http("remote", "https://tools.internal/mcp")
            .with_agent("researcher")
            .with_priority(-1);
        let json = serde_json::to_string(&config).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn test_manager_config_default() {
        let config = ManagerConfig::default();
        assert_eq!(config.health_check_interval(), Duration::from_secs(60));
        let config = ManagerConfig::new().with_health_check_interval(5);
        assert_eq!(config.health_check_interval(), Duration::from_secs(5));
    }
}
