//! Server state and discovery types
//!
//! `ServerState` is the mutable record owned by a single instance;
//! `ToolInfo`/`ResourceInfo` are typed views of discovery results and are
//! replaced wholesale on every discovery pass. `ServerSnapshot` and
//! `HealthReport` are the serializable read surfaces handed to API layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

use super::config::ServerType;

/// Lifecycle status of a managed server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
}

impl ServerStatus {
    /// Whether the server can accept tool and resource calls
    pub fn is_running(&self) -> bool {
        matches!(self, ServerStatus::Running)
    }

    /// Whether the server is mid-transition
    pub fn is_transitional(&self) -> bool {
        matches!(self, ServerStatus::Starting | ServerStatus::Stopping)
    }
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerStatus::Stopped => write!(f, "stopped"),
            ServerStatus::Starting => write!(f, "starting"),
            ServerStatus::Running => write!(f, "running"),
            ServerStatus::Stopping => write!(f, "stopping"),
            ServerStatus::Error => write!(f, "error"),
        }
    }
}

/// Mutable state of a managed server, owned exclusively by its instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerState {
    /// Server name this state belongs to
    pub name: String,

    /// Current lifecycle status
    pub status: ServerStatus,

    /// When the current run began
    pub started_at: Option<DateTime<Utc>>,

    /// Most recent failure message, cleared on successful start
    pub last_error: Option<String>,

    /// Consecutive failures; reset to 0 on successful start
    pub error_count: u32,

    /// Total start attempts over the instance lifetime; never reset
    pub connection_attempts: u64,

    /// Names of tools found by the last discovery pass
    pub tools_discovered: Vec<String>,

    /// URIs of resources found by the last discovery pass
    pub resources_discovered: Vec<String>,

    /// Timestamp of the last successful liveness check
    pub last_ping: Option<DateTime<Utc>>,
}

impl ServerState {
    /// Fresh state for a newly created instance
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ServerStatus::Stopped,
            started_at: None,
            last_error: None,
            error_count: 0,
            connection_attempts: 0,
            tools_discovered: Vec::new(),
            resources_discovered: Vec::new(),
            last_ping: None,
        }
    }
}

/// A tool discovered on a server
///
/// Never hand-authored; built from `rmcp::model::Tool` during discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name as the server exposes it
    pub name: String,

    /// Server-provided description
    pub description: Option<String>,

    /// Name of the server owning this tool
    pub server_name: String,

    /// JSON schema of the tool input
    pub input_schema: Value,

    /// JSON schema of the tool output, when the server declares one
    pub output_schema: Option<Value>,
}

impl ToolInfo {
    /// Build from a discovery result
    pub fn from_discovered(server_name: &str, tool: &rmcp::model::Tool) -> Self {
        Self {
            name: tool.name.to_string(),
            description: tool.description.as_ref().map(|d| d.to_string()),
            server_name: server_name.to_string(),
            input_schema: Value::Object((*tool.input_schema).clone()),
            output_schema: tool
                .output_schema
                .as_ref()
                .map(|schema| Value::Object((**schema).clone())),
        }
    }
}

/// A resource discovered on a server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceInfo {
    /// Resource URI as the server exposes it
    pub uri: String,

    /// Human-readable name
    pub name: String,

    /// Server-provided description
    pub description: Option<String>,

    /// MIME type, when the server declares one
    pub mime_type: Option<String>,

    /// Name of the server owning this resource
    pub server_name: String,
}

impl ResourceInfo {
    /// Build from a discovery result
    pub fn from_discovered(server_name: &str, resource: &rmcp::model::Resource) -> Self {
        Self {
            uri: resource.raw.uri.clone(),
            name: resource.raw.name.clone(),
            description: resource.raw.description.as_ref().map(|d| d.to_string()),
            mime_type: resource.raw.mime_type.as_ref().map(|m| m.to_string()),
            server_name: server_name.to_string(),
        }
    }
}

/// Point-in-time view of a server: config identity plus live state.
///
/// This is the observability surface for `get_server`/`list_servers`;
/// state itself is never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSnapshot {
    pub name: String,
    pub server_type: ServerType,
    pub description: String,
    pub tags: BTreeSet<String>,
    pub priority: i32,
    pub agent_names: BTreeSet<String>,
    pub command: Vec<String>,
    pub env: HashMap<String, String>,
    pub http_url: Option<String>,
    pub auto_start: bool,
    pub max_retries: u32,
    pub timeout_seconds: u64,
    pub status: ServerStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub error_count: u32,
    pub connection_attempts: u64,
    pub tools_discovered: Vec<String>,
    pub resources_discovered: Vec<String>,
    pub last_ping: Option<DateTime<Utc>>,
}

/// Aggregate health classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// No errored servers
    Healthy,
    /// Some servers errored but at least one is running
    Degraded,
    /// Servers errored and none are running
    Unhealthy,
}

impl HealthStatus {
    /// Classify from registry counts
    pub fn from_counts(total: usize, running: usize, errored: usize) -> Self {
        if total == 0 || errored == 0 {
            HealthStatus::Healthy
        } else if running == 0 {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Degraded
        }
    }
}

/// Aggregate health of all managed servers, computed fresh on each call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub servers_total: usize,
    pub servers_running: usize,
    pub servers_error: usize,
    pub tools_available: usize,
    pub resources_available: usize,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_status_predicates() {
        assert!(ServerStatus::Running.is_running());
        assert!(!ServerStatus::Error.is_running());
        assert!(ServerStatus::Starting.is_transitional());
        assert!(ServerStatus::Stopping.is_transitional());
        assert!(!ServerStatus::Stopped.is_transitional());
    }

    #[test]
    fn test_status_display_and_serde() {
        assert_eq!(ServerStatus::Running.to_string(), "running");
        let json = serde_json::to_string(&ServerStatus::Error).unwrap();
        assert_eq!(json, "\"error\"");
    }

    #[test]
    fn test_new_state() {
        let state = ServerState::new("files");
        assert_eq!(state.status, ServerStatus::Stopped);
        assert_eq!(state.error_count, 0);
        assert_eq!(state.connection_attempts, 0);
        assert!(state.started_at.is_none());
        assert!(state.tools_discovered.is_empty());
    }

    #[test]
    fn test_tool_info_from_discovered() {
        let input_schema = Arc::new(
            serde_json::from_value(json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" }
                },
                "required": ["path"]
            }))
            .unwrap(),
        );

        let tool = rmcp::model::Tool {
            name: "read_file".into(),
            title: None,
            description: Some("Read a file".into()),
            input_schema,
            output_schema: None,
            annotations: None,
            icons: None,
            meta: None,
        };

        let info = ToolInfo::from_discovered("filesystem", &tool);
        assert_eq!(info.name, "read_file");
        assert_eq!(info.server_name, "filesystem");
        assert_eq!(info.description.as_deref(), Some("Read a file"));
        assert_eq!(info.input_schema["type"], "object");
        assert!(info.output_schema.is_none());
    }

    #[test]
    fn test_health_status_from_counts() {
        assert_eq!(HealthStatus::from_counts(0, 0, 0), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_counts(3, 3, 0), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_counts(3, 0, 0), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_counts(3, 2, 1), HealthStatus::Degraded);
        assert_eq!(HealthStatus::from_counts(3, 0, 3), HealthStatus::Unhealthy);
        assert_eq!(HealthStatus::from_counts(2, 0, 1), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_health_report_serializes() {
        let report = HealthReport {
            status: HealthStatus::Degraded,
            servers_total: 3,
            servers_running: 2,
            servers_error: 1,
            tools_available: 12,
            resources_available: 4,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["servers_total"], 3);
    }
}
