//! Client manager
//!
//! Owns the registry of server instances, the agent-to-server assignment
//! index, the persistence hooks and the background health loop. The
//! manager is constructed explicitly and passed where needed; its
//! lifecycle is `initialize()` .. `shutdown()`, both owned by the hosting
//! application.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use rmcp::model::{CallToolResult, ReadResourceResult};
use serde_json::{Map, Value};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::core::{ValidationError, WardenError, WardenResult};
use crate::security::SecurityValidator;
use crate::storage::ConfigStore;

use super::config::{ManagerConfig, ServerConfig, ServerType};
use super::instance::ServerInstance;
use super::state::{HealthReport, HealthStatus, ServerSnapshot, ServerStatus, ToolInfo};
use super::tool_adapter::{AgentTool, McpToolAdapter};

type ServerRegistry = RwLock<HashMap<String, Arc<ServerInstance>>>;

/// Handle to the spawned health loop
struct HealthTask {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Manages all configured tool-provider servers for the application
pub struct ClientManager {
    config: ManagerConfig,
    store: Arc<dyn ConfigStore>,
    validator: Arc<SecurityValidator>,
    servers: Arc<ServerRegistry>,
    /// Agent name to the servers assigned to it
    agent_index: Arc<RwLock<HashMap<String, HashSet<String>>>>,
    health_task: Mutex<Option<HealthTask>>,
}

impl ClientManager {
    /// Create a manager. No servers are loaded until `initialize()`.
    pub fn new(
        store: Arc<dyn ConfigStore>,
        validator: Arc<SecurityValidator>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            config,
            store,
            validator,
            servers: Arc::new(RwLock::new(HashMap::new())),
            agent_index: Arc::new(RwLock::new(HashMap::new())),
            health_task: Mutex::new(None),
        }
    }

    /// Load persisted configurations, recreate instances, start the
    /// health loop and auto-start flagged servers.
    ///
    /// Auto-start failures leave the server registered in Error state;
    /// they are logged, never raised.
    pub async fn initialize(&self) -> WardenResult<()> {
        let configs = self.store.load_all_configs().await?;
        tracing::info!("[ClientManager] Loaded {} server configs", configs.len());

        let mut auto_start = Vec::new();
        {
            let mut servers = self.servers.write().await;
            let mut index = self.agent_index.write().await;
            for config in configs {
                if let Err(e) = config.validate() {
                    tracing::warn!("[ClientManager] Skipping invalid config: {}", e);
                    continue;
                }
                if servers.contains_key(&config.name) {
                    tracing::warn!(
                        "[ClientManager] Skipping duplicate config '{}'",
                        config.name
                    );
                    continue;
                }
                for agent in &config.agent_names {
                    index
                        .entry(agent.clone())
                        .or_default()
                        .insert(config.name.clone());
                }
                let name = config.name.clone();
                let wants_start = config.auto_start;
                let instance = Arc::new(ServerInstance::new(config, self.validator.clone()));
                if wants_start {
                    auto_start.push(instance.clone());
                }
                servers.insert(name, instance);
            }
        }

        let starts = auto_start.into_iter().map(|instance| async move {
            if let Err(e) = instance.start().await {
                tracing::warn!(
                    "[ClientManager] Auto-start of '{}' failed: {}",
                    instance.name(),
                    e
                );
            }
        });
        join_all(starts).await;

        self.spawn_health_loop().await;
        Ok(())
    }

    /// Register a new server.
    ///
    /// The launch input is security-validated before anything is persisted
    /// or spawned, so a hostile config is rejected while no process
    /// exists. An `auto_start` failure does not prevent registration.
    pub async fn add_server(&self, config: ServerConfig) -> WardenResult<()> {
        self.validator.validate_server_name(&config.name)?;
        config.validate()?;
        match config.server_type {
            ServerType::Stdio => {
                self.validator
                    .build_secure_command(&config.command, &config.env)?;
            }
            ServerType::Http => {
                let url = config.http_url.as_deref().ok_or_else(|| {
                    WardenError::Validation(ValidationError::MissingHttpUrl {
                        name: config.name.clone(),
                    })
                })?;
                self.validator.validate_http_url(url)?;
            }
        }

        if self.servers.read().await.contains_key(&config.name) {
            return Err(WardenError::ServerExists(config.name));
        }

        self.store.save_config(&config).await?;
        let agents: Vec<String> = config.agent_names.iter().cloned().collect();
        self.store.set_agent_assignments(&config.name, &agents).await?;

        let name = config.name.clone();
        let wants_start = config.auto_start;
        let instance = Arc::new(ServerInstance::new(config, self.validator.clone()));
        {
            let mut servers = self.servers.write().await;
            if servers.contains_key(&name) {
                return Err(WardenError::ServerExists(name));
            }
            servers.insert(name.clone(), instance.clone());
        }
        {
            let mut index = self.agent_index.write().await;
            for agent in &agents {
                index.entry(agent.clone()).or_default().insert(name.clone());
            }
        }
        tracing::info!("[ClientManager] Registered server '{}'", name);

        if wants_start {
            if let Err(e) = instance.start().await {
                tracing::warn!("[ClientManager] Auto-start of '{}' failed: {}", name, e);
            }
        }
        Ok(())
    }

    /// Remove a server: stop it, delete its persisted config and
    /// assignments, drop it from the registry and from every agent's set.
    pub async fn remove_server(&self, name: &str) -> WardenResult<()> {
        let instance = self
            .servers
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| WardenError::ServerNotFound(name.to_string()))?;

        if let Err(e) = instance.stop().await {
            tracing::warn!("[ClientManager] Stop of '{}' during removal: {}", name, e);
        }

        self.store.delete_config(name).await?;

        self.servers.write().await.remove(name);
        {
            let mut index = self.agent_index.write().await;
            for assigned in index.values_mut() {
                assigned.remove(name);
            }
            index.retain(|_, assigned| !assigned.is_empty());
        }
        tracing::info!("[ClientManager] Removed server '{}'", name);
        Ok(())
    }

    async fn instance(&self, name: &str) -> WardenResult<Arc<ServerInstance>> {
        self.servers
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| WardenError::ServerNotFound(name.to_string()))
    }

    /// Start a registered server
    pub async fn start_server(&self, name: &str) -> WardenResult<()> {
        self.instance(name).await?.start().await
    }

    /// Stop a registered server
    pub async fn stop_server(&self, name: &str) -> WardenResult<()> {
        self.instance(name).await?.stop().await
    }

    /// Restart a registered server
    pub async fn restart_server(&self, name: &str) -> WardenResult<()> {
        self.instance(name).await?.restart().await
    }

    /// Snapshot of one server
    pub async fn get_server(&self, name: &str) -> WardenResult<ServerSnapshot> {
        Ok(self.instance(name).await?.snapshot().await)
    }

    /// Snapshots of all servers, highest priority first
    pub async fn list_servers(&self) -> Vec<ServerSnapshot> {
        let instances: Vec<_> = self.servers.read().await.values().cloned().collect();
        let mut snapshots = Vec::with_capacity(instances.len());
        for instance in instances {
            snapshots.push(instance.snapshot().await);
        }
        snapshots.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.name.cmp(&b.name))
        });
        snapshots
    }

    /// Registered servers assigned to an agent, highest priority first
    pub async fn get_servers_for_agent(&self, agent: &str) -> Vec<Arc<ServerInstance>> {
        let names = self
            .agent_index
            .read()
            .await
            .get(agent)
            .cloned()
            .unwrap_or_default();
        let servers = self.servers.read().await;
        let mut matched: Vec<Arc<ServerInstance>> =
            names.iter().filter_map(|n| servers.get(n).cloned()).collect();
        matched.sort_by(|a, b| {
            b.config()
                .priority
                .cmp(&a.config().priority)
                .then_with(|| a.name().cmp(b.name()))
        });
        matched
    }

    /// Discovered tools across all servers assigned to an agent
    pub async fn tools_for_agent(&self, agent: &str) -> Vec<ToolInfo> {
        let mut tools = Vec::new();
        for instance in self.get_servers_for_agent(agent).await {
            tools.extend(instance.tools().await);
        }
        tools
    }

    /// The agent's tools wrapped as namespaced `{server}_{tool}` callables
    pub async fn toolset_for_agent(&self, agent: &str) -> Vec<Arc<dyn AgentTool>> {
        let mut toolset: Vec<Arc<dyn AgentTool>> = Vec::new();
        for instance in self.get_servers_for_agent(agent).await {
            for info in instance.tools().await {
                toolset.push(Arc::new(McpToolAdapter::new(instance.clone(), info)));
            }
        }
        toolset
    }

    /// Route a tool call to the owning server
    pub async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Option<Map<String, Value>>,
    ) -> WardenResult<CallToolResult> {
        self.instance(server).await?.call_tool(tool, arguments).await
    }

    /// Route a resource read to the owning server
    pub async fn access_resource(
        &self,
        server: &str,
        uri: &str,
    ) -> WardenResult<ReadResourceResult> {
        self.instance(server).await?.access_resource(uri).await
    }

    /// Aggregate health, computed fresh on every call
    pub async fn get_health(&self) -> HealthReport {
        let instances: Vec<_> = self.servers.read().await.values().cloned().collect();
        let total = instances.len();
        let mut running = 0;
        let mut errored = 0;
        let mut tools = 0;
        let mut resources = 0;
        for instance in &instances {
            let state = instance.state().await;
            match state.status {
                ServerStatus::Running => running += 1,
                ServerStatus::Error => errored += 1,
                _ => {}
            }
            tools += state.tools_discovered.len();
            resources += state.resources_discovered.len();
        }
        HealthReport {
            status: HealthStatus::from_counts(total, running, errored),
            servers_total: total,
            servers_running: running,
            servers_error: errored,
            tools_available: tools,
            resources_available: resources,
            timestamp: Utc::now(),
        }
    }

    /// Number of registered servers
    pub async fn server_count(&self) -> usize {
        self.servers.read().await.len()
    }

    /// Cancel the health loop, stop every instance concurrently and clear
    /// all registries. Idempotent.
    pub async fn shutdown(&self) {
        if let Some(task) = self.health_task.lock().await.take() {
            let _ = task.shutdown_tx.send(true);
            if let Err(e) = task.handle.await {
                tracing::warn!("[ClientManager] Health task join failed: {}", e);
            }
        }

        let instances: Vec<Arc<ServerInstance>> = {
            let mut servers = self.servers.write().await;
            servers.drain().map(|(_, instance)| instance).collect()
        };
        let stops = instances.into_iter().map(|instance| async move {
            if let Err(e) = instance.stop().await {
                tracing::warn!(
                    "[ClientManager] Stop of '{}' during shutdown: {}",
                    instance.name(),
                    e
                );
            }
        });
        join_all(stops).await;

        self.agent_index.write().await.clear();
        tracing::info!("[ClientManager] Shutdown complete");
    }

    async fn spawn_health_loop(&self) {
        let mut task_slot = self.health_task.lock().await;
        if task_slot.is_some() {
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let servers = self.servers.clone();
        let interval = self.config.health_check_interval();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; servers were just started
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        health_sweep(servers.as_ref()).await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("[ClientManager] Health loop exited");
        });

        *task_slot = Some(HealthTask { handle, shutdown_tx });
    }
}

/// One pass of the background health loop.
///
/// Running servers are pinged concurrently; a failed ping triggers a
/// restart while `error_count` is within the server's retry budget, and
/// errored servers are retried under the same bound. Past the budget the
/// server stays in Error until a manual start. Failures here are logged,
/// never raised.
pub(crate) async fn health_sweep(servers: &ServerRegistry) {
    let snapshot: Vec<Arc<ServerInstance>> = servers.read().await.values().cloned().collect();

    let checks = snapshot.into_iter().map(|instance| async move {
        let max_retries = instance.config().max_retries;
        match instance.status().await {
            ServerStatus::Running => {
                if instance.ping().await {
                    return;
                }
                tracing::warn!(
                    "[ClientManager] Server '{}' failed its liveness check",
                    instance.name()
                );
                if instance.state().await.error_count <= max_retries {
                    if let Err(e) = instance.restart().await {
                        tracing::warn!(
                            "[ClientManager] Restart of '{}' failed: {}",
                            instance.name(),
                            e
                        );
                    }
                } else {
                    tracing::warn!(
                        "[ClientManager] Server '{}' exhausted its {} retries",
                        instance.name(),
                        max_retries
                    );
                }
            }
            ServerStatus::Error => {
                if instance.state().await.error_count <= max_retries {
                    if let Err(e) = instance.start().await {
                        tracing::warn!(
                            "[ClientManager] Retry of '{}' failed: {}",
                            instance.name(),
                            e
                        );
                    }
                }
            }
            _ => {}
        }
    });
    join_all(checks).await;
}
