//! Server instance lifecycle
//!
//! Owns one configured tool-provider server: state machine, start/stop/
//! restart, capability discovery, liveness probe and tool/resource calls.
//!
//! Lifecycle transitions are serialized by a per-instance lock, so
//! concurrent `start`/`stop`/`restart` calls never race. The connection
//! handle lives behind a `RwLock`: calls hold the read side for the
//! duration of the RPC, teardown takes the write side, so a call can never
//! land on a server mid-teardown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, ReadResourceRequestParams, ReadResourceResult,
};
use rmcp::service::RunningService;
use rmcp::transport::{
    streamable_http_client::StreamableHttpClientTransportConfig, StreamableHttpClientTransport,
    TokioChildProcess,
};
use rmcp::{RoleClient, ServiceExt};
use serde_json::{Map, Value};
use tokio::process::Command;
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;

use crate::core::{ValidationError, WardenError, WardenResult};
use crate::security::SecurityValidator;

use super::config::{ServerConfig, ServerType};
use super::state::{ResourceInfo, ServerSnapshot, ServerState, ServerStatus, ToolInfo};

/// The concrete transport type we use for HTTP MCP connections
pub type HttpClientTransport = StreamableHttpClientTransport<reqwest::Client>;

type McpService = RunningService<RoleClient, ()>;

/// Bound on the liveness probe; deliberately shorter than operation timeouts
const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Discovered capabilities, replaced wholesale on every discovery pass
#[derive(Default)]
struct Catalog {
    tools: Vec<ToolInfo>,
    resources: Vec<ResourceInfo>,
}

/// One managed tool-provider server
pub struct ServerInstance {
    config: ServerConfig,
    validator: Arc<SecurityValidator>,
    state: RwLock<ServerState>,
    catalog: RwLock<Catalog>,
    service: RwLock<Option<McpService>>,
    /// Serializes start/stop/restart
    lifecycle: Mutex<()>,
}

impl std::fmt::Debug for ServerInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerInstance")
            .field("name", &self.config.name)
            .field("server_type", &self.config.server_type)
            .finish()
    }
}

impl ServerInstance {
    /// Create an instance for a configuration. Nothing is launched until
    /// `start()`.
    pub fn new(config: ServerConfig, validator: Arc<SecurityValidator>) -> Self {
        let state = ServerState::new(&config.name);
        Self {
            config,
            validator,
            state: RwLock::new(state),
            catalog: RwLock::new(Catalog::default()),
            service: RwLock::new(None),
            lifecycle: Mutex::new(()),
        }
    }

    /// Server name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The configuration this instance was created with
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Current lifecycle status
    pub async fn status(&self) -> ServerStatus {
        self.state.read().await.status
    }

    /// Copy of the full mutable state
    pub async fn state(&self) -> ServerState {
        self.state.read().await.clone()
    }

    /// Tools from the last discovery pass
    pub async fn tools(&self) -> Vec<ToolInfo> {
        self.catalog.read().await.tools.clone()
    }

    /// Resources from the last discovery pass
    pub async fn resources(&self) -> Vec<ResourceInfo> {
        self.catalog.read().await.resources.clone()
    }

    /// Serializable point-in-time view of config and state
    pub async fn snapshot(&self) -> ServerSnapshot {
        let state = self.state.read().await.clone();
        ServerSnapshot {
            name: self.config.name.clone(),
            server_type: self.config.server_type,
            description: self.config.description.clone(),
            tags: self.config.tags.clone(),
            priority: self.config.priority,
            agent_names: self.config.agent_names.clone(),
            command: self.config.command.clone(),
            env: self.config.env.clone(),
            http_url: self.config.http_url.clone(),
            auto_start: self.config.auto_start,
            max_retries: self.config.max_retries,
            timeout_seconds: self.config.timeout_seconds,
            status: state.status,
            started_at: state.started_at,
            last_error: state.last_error,
            error_count: state.error_count,
            connection_attempts: state.connection_attempts,
            tools_discovered: state.tools_discovered,
            resources_discovered: state.resources_discovered,
            last_ping: state.last_ping,
        }
    }

    /// Start the server: validate launch input, open the transport,
    /// discover capabilities. No-op when already Running.
    pub async fn start(&self) -> WardenResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.state.read().await.status == ServerStatus::Running {
            tracing::debug!("[ServerInstance] '{}' is already running", self.config.name);
            return Ok(());
        }
        self.start_locked().await
    }

    /// Stop the server and clear its catalogs. No-op when already Stopped.
    pub async fn stop(&self) -> WardenResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.state.read().await.status == ServerStatus::Stopped {
            tracing::debug!("[ServerInstance] '{}' is already stopped", self.config.name);
            return Ok(());
        }
        self.stop_locked().await
    }

    /// Stop then start, with no interleaved lifecycle calls in between
    pub async fn restart(&self) -> WardenResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        tracing::info!("[ServerInstance] Restarting '{}'", self.config.name);
        if self.state.read().await.status != ServerStatus::Stopped {
            self.stop_locked().await?;
        }
        self.start_locked().await
    }

    async fn start_locked(&self) -> WardenResult<()> {
        {
            let mut state = self.state.write().await;
            state.status = ServerStatus::Starting;
            state.connection_attempts += 1;
        }
        tracing::info!("[ServerInstance] Starting '{}'", self.config.name);

        match self.connect_and_discover().await {
            Ok((service, tools, resources)) => {
                let tool_names: Vec<String> = tools.iter().map(|t| t.name.clone()).collect();
                let resource_uris: Vec<String> =
                    resources.iter().map(|r| r.uri.clone()).collect();
                tracing::info!(
                    "[ServerInstance] '{}' is running with {} tools, {} resources",
                    self.config.name,
                    tool_names.len(),
                    resource_uris.len()
                );

                *self.service.write().await = Some(service);
                {
                    let mut catalog = self.catalog.write().await;
                    catalog.tools = tools;
                    catalog.resources = resources;
                }
                let mut state = self.state.write().await;
                state.status = ServerStatus::Running;
                state.started_at = Some(Utc::now());
                state.last_error = None;
                state.error_count = 0;
                state.tools_discovered = tool_names;
                state.resources_discovered = resource_uris;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    "[ServerInstance] Start of '{}' failed: {}",
                    self.config.name,
                    e
                );
                let mut state = self.state.write().await;
                state.status = ServerStatus::Error;
                state.last_error = Some(e.to_string());
                state.error_count += 1;
                Err(e)
            }
        }
    }

    async fn stop_locked(&self) -> WardenResult<()> {
        {
            self.state.write().await.status = ServerStatus::Stopping;
        }
        tracing::info!("[ServerInstance] Stopping '{}'", self.config.name);

        // Taking the write guard waits out in-flight tool calls. Cancelling
        // the service terminates a stdio child process, not just its stdin.
        let service = self.service.write().await.take();
        if let Some(service) = service {
            if let Err(e) = service.cancel().await {
                tracing::warn!(
                    "[ServerInstance] Transport teardown for '{}' reported: {}",
                    self.config.name,
                    e
                );
            }
        }

        {
            let mut catalog = self.catalog.write().await;
            catalog.tools.clear();
            catalog.resources.clear();
        }
        let mut state = self.state.write().await;
        state.status = ServerStatus::Stopped;
        state.started_at = None;
        state.tools_discovered.clear();
        state.resources_discovered.clear();
        Ok(())
    }

    /// Open the transport and discover capabilities, bounded by the
    /// configured timeout.
    async fn connect_and_discover(
        &self,
    ) -> WardenResult<(McpService, Vec<ToolInfo>, Vec<ResourceInfo>)> {
        let startup_timeout = self.config.timeout();
        match timeout(startup_timeout, self.open_and_discover()).await {
            Ok(result) => result,
            Err(_) => Err(WardenError::connection(
                &self.config.name,
                format!("start timed out after {}s", startup_timeout.as_secs()),
            )),
        }
    }

    async fn open_and_discover(
        &self,
    ) -> WardenResult<(McpService, Vec<ToolInfo>, Vec<ResourceInfo>)> {
        let service = self.open_service().await?;

        let tools = match service.list_tools(Default::default()).await {
            Ok(result) => result
                .tools
                .iter()
                .map(|t| ToolInfo::from_discovered(&self.config.name, t))
                .collect(),
            Err(e) => {
                if let Err(cancel_err) = service.cancel().await {
                    tracing::debug!(
                        "[ServerInstance] Teardown after failed discovery on '{}': {}",
                        self.config.name,
                        cancel_err
                    );
                }
                return Err(WardenError::server(
                    &self.config.name,
                    "discovery",
                    e.to_string(),
                ));
            }
        };

        // Many servers expose no resources; a failed listing is not fatal.
        let resources = match service.list_resources(Default::default()).await {
            Ok(result) => result
                .resources
                .iter()
                .map(|r| ResourceInfo::from_discovered(&self.config.name, r))
                .collect(),
            Err(e) => {
                tracing::warn!(
                    "[ServerInstance] Resource discovery failed on '{}': {}",
                    self.config.name,
                    e
                );
                Vec::new()
            }
        };

        Ok((service, tools, resources))
    }

    async fn open_service(&self) -> WardenResult<McpService> {
        match self.config.server_type {
            ServerType::Stdio => {
                let secure = self
                    .validator
                    .build_secure_command(&self.config.command, &self.config.env)?;
                tracing::debug!(
                    "[ServerInstance] Launching '{}': {}",
                    self.config.name,
                    secure.display_line()
                );

                let mut cmd = Command::new(&secure.program);
                cmd.args(&secure.args);
                cmd.env_clear();
                cmd.envs(&secure.env);

                let transport = TokioChildProcess::new(cmd).map_err(|e| {
                    WardenError::server(&self.config.name, "spawn", e.to_string())
                })?;
                ().serve(transport)
                    .await
                    .map_err(|e| WardenError::connection(&self.config.name, e.to_string()))
            }
            ServerType::Http => {
                let url = self.config.http_url.as_deref().ok_or_else(|| {
                    WardenError::Validation(ValidationError::MissingHttpUrl {
                        name: self.config.name.clone(),
                    })
                })?;
                self.validator.validate_http_url(url)?;

                let transport_config = StreamableHttpClientTransportConfig::with_uri(url);
                let transport: HttpClientTransport =
                    HttpClientTransport::from_config(transport_config);
                ().serve(transport)
                    .await
                    .map_err(|e| WardenError::connection(&self.config.name, e.to_string()))
            }
        }
    }

    /// Cheap liveness probe: a short-timeout tool listing.
    ///
    /// Never errors; any doubt reads as dead. Updates `last_ping` on
    /// success only. Status is left to the caller (the health loop decides
    /// whether to restart).
    pub async fn ping(&self) -> bool {
        if self.state.read().await.status != ServerStatus::Running {
            return false;
        }
        let service_guard = self.service.read().await;
        let Some(service) = service_guard.as_ref() else {
            return false;
        };
        match timeout(PING_TIMEOUT, service.list_tools(Default::default())).await {
            Ok(Ok(_)) => {
                drop(service_guard);
                self.state.write().await.last_ping = Some(Utc::now());
                true
            }
            Ok(Err(e)) => {
                tracing::debug!("[ServerInstance] Ping failed for '{}': {}", self.config.name, e);
                false
            }
            Err(_) => {
                tracing::debug!("[ServerInstance] Ping timed out for '{}'", self.config.name);
                false
            }
        }
    }

    /// Invoke a tool on the running server.
    ///
    /// Fails fast when the server is not Running or the tool is unknown.
    /// A timeout surfaces as a typed error and never changes server status.
    pub async fn call_tool(
        &self,
        tool: &str,
        arguments: Option<Map<String, Value>>,
    ) -> WardenResult<CallToolResult> {
        let started = Instant::now();
        let service_guard = self.service.read().await;
        {
            let state = self.state.read().await;
            if state.status != ServerStatus::Running {
                return Err(WardenError::Tool {
                    server: self.config.name.clone(),
                    tool: tool.to_string(),
                    elapsed_ms: 0,
                    reason: format!("server is {}", state.status),
                });
            }
            if !state.tools_discovered.iter().any(|t| t == tool) {
                return Err(WardenError::Tool {
                    server: self.config.name.clone(),
                    tool: tool.to_string(),
                    elapsed_ms: 0,
                    reason: "unknown tool".to_string(),
                });
            }
        }
        let service = service_guard.as_ref().ok_or_else(|| {
            WardenError::connection(&self.config.name, "no open transport")
        })?;

        tracing::info!(
            "[ServerInstance] Calling tool '{}' on '{}'",
            tool,
            self.config.name
        );
        tracing::debug!("[ServerInstance] Arguments: {:?}", arguments);

        let request = service.call_tool(CallToolRequestParams {
            meta: None,
            name: tool.to_string().into(),
            arguments,
            task: None,
        });
        match timeout(self.config.timeout(), request).await {
            Ok(Ok(result)) => {
                tracing::debug!(
                    "[ServerInstance] Tool '{}' completed in {}ms",
                    tool,
                    started.elapsed().as_millis()
                );
                Ok(result)
            }
            Ok(Err(e)) => Err(WardenError::Tool {
                server: self.config.name.clone(),
                tool: tool.to_string(),
                elapsed_ms: started.elapsed().as_millis() as u64,
                reason: e.to_string(),
            }),
            Err(_) => Err(WardenError::ToolTimeout {
                server: self.config.name.clone(),
                tool: tool.to_string(),
                elapsed_ms: started.elapsed().as_millis() as u64,
            }),
        }
    }

    /// Read a resource from the running server. Symmetric to `call_tool`;
    /// the URI is validated before any transport work.
    pub async fn access_resource(&self, uri: &str) -> WardenResult<ReadResourceResult> {
        let started = Instant::now();
        self.validator.validate_resource_uri(uri)?;

        let service_guard = self.service.read().await;
        {
            let state = self.state.read().await;
            if state.status != ServerStatus::Running {
                return Err(WardenError::Tool {
                    server: self.config.name.clone(),
                    tool: uri.to_string(),
                    elapsed_ms: 0,
                    reason: format!("server is {}", state.status),
                });
            }
            if !state.resources_discovered.iter().any(|r| r == uri) {
                return Err(WardenError::Tool {
                    server: self.config.name.clone(),
                    tool: uri.to_string(),
                    elapsed_ms: 0,
                    reason: "unknown resource".to_string(),
                });
            }
        }
        let service = service_guard.as_ref().ok_or_else(|| {
            WardenError::connection(&self.config.name, "no open transport")
        })?;

        tracing::info!(
            "[ServerInstance] Reading resource '{}' from '{}'",
            uri,
            self.config.name
        );

        let request = service.read_resource(ReadResourceRequestParams {
            meta: None,
            uri: uri.to_string(),
        });
        match timeout(self.config.timeout(), request).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(WardenError::Tool {
                server: self.config.name.clone(),
                tool: uri.to_string(),
                elapsed_ms: started.elapsed().as_millis() as u64,
                reason: e.to_string(),
            }),
            Err(_) => Err(WardenError::ToolTimeout {
                server: self.config.name.clone(),
                tool: uri.to_string(),
                elapsed_ms: started.elapsed().as_millis() as u64,
            }),
        }
    }
}
