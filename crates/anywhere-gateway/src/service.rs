//! Gateway service: registration, container lifecycle, discovery and tool sync.
//!
//! This is the API the CLI (and any admin surface) talks to. Dependencies
//! are injected so tests can swap the container engine and discovery.

use std::sync::Arc;

use anywhere_core::config::GatewayConfig;
use anywhere_core::domain::{
    BuildStatus, DiscoveredTool, NewServer, NewUsageRecord, ReconcileOutcome, RunConfiguration,
    RuntimeKind, ServerConfig, ServerId, ToolRecord, UpdateServer, UsageRecord,
};
use anywhere_core::events::AppEvent;
use anywhere_core::ports::{
    AppEventEmitter, ContainerRuntime, ContainerState, Repos, RepositoryError, ServerRepository,
    ToolDiscovery, ToolRepository, UsageLogRepository,
};
use anywhere_core::tool_sync::ToolSyncService;
use anywhere_core::validation::validate_server;
use anywhere_runtime::{ContainerManager, StartedContainer};
use futures_util::future::join_all;
use serde::Serialize;

use crate::error::GatewayError;
use crate::locks::ServerLocks;

/// Outcome of a successful start or restart.
#[derive(Debug, Clone)]
pub struct StartReport {
    pub server: ServerConfig,
    pub container: StartedContainer,
    pub tools: ReconcileOutcome,
}

/// Per-server result of [`GatewayService::start_all_active`].
#[derive(Debug)]
pub struct ServerStartResult {
    pub server_id: ServerId,
    pub server_name: String,
    pub result: Result<StartReport, GatewayError>,
}

/// Server configuration with its derived runtime view and tools.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub server: ServerConfig,
    /// What `start` would run, when the start command parses.
    pub run_config: Option<RunConfiguration>,
    pub command_error: Option<String>,
    pub container: Option<ContainerState>,
    /// Set when the container engine could not be queried.
    pub container_error: Option<String>,
    pub tools: Vec<ToolRecord>,
}

/// Orchestrates the gateway core.
///
/// Lifecycle operations on one server are serialized; different servers
/// proceed concurrently.
pub struct GatewayService {
    servers: Arc<dyn ServerRepository>,
    tools: Arc<dyn ToolRepository>,
    usage: Arc<dyn UsageLogRepository>,
    containers: ContainerManager,
    discovery: Arc<dyn ToolDiscovery>,
    sync: ToolSyncService,
    emitter: Arc<dyn AppEventEmitter>,
    locks: ServerLocks,
}

impl GatewayService {
    pub fn new(
        repos: Repos,
        runtime: Arc<dyn ContainerRuntime>,
        discovery: Arc<dyn ToolDiscovery>,
        emitter: Arc<dyn AppEventEmitter>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            servers: repos.servers,
            tools: Arc::clone(&repos.tools),
            usage: repos.usage,
            containers: ContainerManager::new(runtime, config),
            discovery,
            sync: ToolSyncService::new(repos.tools),
            emitter,
            locks: ServerLocks::new(),
        }
    }

    pub fn containers(&self) -> &ContainerManager {
        &self.containers
    }

    // =========================================================================
    // Registry
    // =========================================================================

    /// Validate and store a new server.
    pub async fn add_server(&self, new_server: NewServer) -> Result<ServerConfig, GatewayError> {
        validate_server(&new_server)?;
        let saved = self.servers.insert(new_server).await?;

        self.emitter.emit(AppEvent::server_added(&saved));
        tracing::info!(
            server_id = %saved.id,
            server_name = %saved.name,
            runtime_kind = %saved.runtime_kind,
            "Added server"
        );
        Ok(saved)
    }

    pub async fn get_server(&self, id: &ServerId) -> Result<ServerConfig, GatewayError> {
        Ok(self.servers.get_by_id(id).await?)
    }

    /// Look a server up by id, falling back to its name.
    pub async fn find_server(&self, key: &str) -> Result<ServerConfig, GatewayError> {
        match self.servers.get_by_id(&ServerId::new(key)).await {
            Err(RepositoryError::NotFound(_)) => Ok(self.servers.get_by_name(key).await?),
            other => Ok(other?),
        }
    }

    pub async fn list_servers(&self) -> Result<Vec<ServerConfig>, GatewayError> {
        Ok(self.servers.list().await?)
    }

    /// Apply an edit. A running container whose configuration changes is
    /// stopped first; the next start builds from the new record.
    pub async fn update_server(
        &self,
        id: &ServerId,
        edit: UpdateServer,
    ) -> Result<ServerConfig, GatewayError> {
        let _guard = self.locks.acquire(id).await;
        let current = self.servers.get_by_id(id).await?;
        let next = edit.apply_to(&current);
        validate_server(&next)?;

        if !next.same_runtime(&current) || (current.is_active && !next.is_active) {
            self.release_container(&current).await?;
        }
        self.servers.update(&next).await?;

        self.emitter.emit(AppEvent::server_updated(&next));
        tracing::info!(server_id = %id, server_name = %next.name, "Updated server");
        Ok(next)
    }

    /// Flag a server active or inactive. Deactivating stops its container.
    pub async fn set_active(
        &self,
        id: &ServerId,
        active: bool,
    ) -> Result<ServerConfig, GatewayError> {
        let _guard = self.locks.acquire(id).await;
        let mut server = self.servers.get_by_id(id).await?;
        if !active {
            self.release_container(&server).await?;
        }
        self.servers.set_active(id, active).await?;
        server.is_active = active;

        self.emitter.emit(AppEvent::server_updated(&server));
        tracing::info!(server_id = %id, active, "Changed server activity");
        Ok(server)
    }

    /// Stop the container and delete the record with its tools.
    pub async fn remove_server(&self, id: &ServerId) -> Result<(), GatewayError> {
        {
            let _guard = self.locks.acquire(id).await;
            let server = self.servers.get_by_id(id).await?;
            self.release_container(&server).await?;
            self.servers.delete(id).await?;
            tracing::info!(server_id = %id, server_name = %server.name, "Removed server");
        }
        self.locks.forget(id);
        self.sync.forget(id);
        self.emitter.emit(AppEvent::server_removed(id.clone()));
        Ok(())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start the container, discover its tools and reconcile them.
    ///
    /// On failure the server is marked failed and inactive, a
    /// `ServerFailed` event is emitted and the error is returned.
    pub async fn start_server(&self, id: &ServerId) -> Result<StartReport, GatewayError> {
        let _guard = self.locks.acquire(id).await;
        let server = self.servers.get_by_id(id).await?;
        self.launch(server, false).await
    }

    /// Stop and start again with a freshly derived configuration.
    pub async fn restart_server(&self, id: &ServerId) -> Result<StartReport, GatewayError> {
        let _guard = self.locks.acquire(id).await;
        let server = self.servers.get_by_id(id).await?;
        self.launch(server, true).await
    }

    pub async fn stop_server(&self, id: &ServerId) -> Result<(), GatewayError> {
        let _guard = self.locks.acquire(id).await;
        let server = self.servers.get_by_id(id).await?;
        self.containers.stop(&server).await?;
        self.emitter.emit(AppEvent::server_stopped(&server));
        Ok(())
    }

    /// Start every active server. One server's failure never affects another.
    pub async fn start_all_active(&self) -> Result<Vec<ServerStartResult>, GatewayError> {
        let servers = self.servers.list_active().await?;
        tracing::info!(count = servers.len(), "Starting active servers");

        let results = join_all(servers.into_iter().map(|server| async move {
            let result = self.start_server(&server.id).await;
            if let Err(e) = &result {
                tracing::warn!(
                    server_id = %server.id,
                    server_name = %server.name,
                    error = %e,
                    "Server failed to start"
                );
            }
            ServerStartResult {
                server_id: server.id,
                server_name: server.name,
                result,
            }
        }))
        .await;
        Ok(results)
    }

    async fn launch(
        &self,
        server: ServerConfig,
        restart: bool,
    ) -> Result<StartReport, GatewayError> {
        if let Err(e) = self
            .servers
            .set_build_status(&server.id, BuildStatus::Building, None)
            .await
        {
            self.mark_failed(&server, &e.clone().into()).await;
            return Err(e.into());
        }

        match self.start_and_sync(&server, restart).await {
            Ok((container, tools)) => {
                self.servers
                    .set_build_status(&server.id, BuildStatus::Built, None)
                    .await?;
                if !server.is_active {
                    self.servers.set_active(&server.id, true).await?;
                }
                let server = self.servers.get_by_id(&server.id).await?;

                self.emitter
                    .emit(AppEvent::server_started(&server, &container.handle.name));
                Ok(StartReport {
                    server,
                    container,
                    tools,
                })
            }
            Err(e) => {
                self.mark_failed(&server, &e).await;
                Err(e)
            }
        }
    }

    async fn start_and_sync(
        &self,
        server: &ServerConfig,
        restart: bool,
    ) -> Result<(StartedContainer, ReconcileOutcome), GatewayError> {
        let container = if restart {
            self.containers.restart(server).await?
        } else {
            self.containers.start(server).await?
        };

        let discovered = self.discovery.discover(&container.run).await;
        match self.sync.apply_discovery(&server.id, discovered).await {
            Ok(outcome) => {
                self.emitter
                    .emit(AppEvent::tools_synced(server.id.clone(), outcome));
                Ok((container, outcome))
            }
            Err(source) => {
                // The server is about to be marked inactive
                if let Err(e) = self.containers.stop(server).await {
                    tracing::warn!(
                        server_id = %server.id,
                        error = %e,
                        "Failed to stop container after sync failure"
                    );
                }
                Err(GatewayError::ToolSync {
                    server_id: server.id.clone(),
                    source,
                })
            }
        }
    }

    async fn mark_failed(&self, server: &ServerConfig, error: &GatewayError) {
        let message = error.to_string();
        tracing::warn!(
            server_id = %server.id,
            server_name = %server.name,
            operation = error.operation(),
            error = %message,
            "Server marked failed"
        );

        if let Err(e) = self
            .servers
            .set_build_status(&server.id, BuildStatus::Failed, Some(&message))
            .await
        {
            tracing::warn!(server_id = %server.id, error = %e, "Failed to record build failure");
        }
        if let Err(e) = self.servers.set_active(&server.id, false).await {
            tracing::warn!(server_id = %server.id, error = %e, "Failed to deactivate server");
        }
        self.emitter
            .emit(AppEvent::server_failed(server, error.operation(), message));
    }

    /// Stop the server's container if it has one.
    ///
    /// Registry edits go through when the engine cannot be queried; the
    /// next start replaces whatever container is left behind.
    async fn release_container(&self, server: &ServerConfig) -> Result<(), GatewayError> {
        match self.containers.status(server).await {
            Ok(None) => Ok(()),
            Ok(Some(_)) => Ok(self.containers.stop(server).await?),
            Err(e) => {
                tracing::warn!(
                    server_id = %server.id,
                    error = %e,
                    "Container engine unreachable, skipping stop"
                );
                Ok(())
            }
        }
    }

    // =========================================================================
    // Tools
    // =========================================================================

    /// Run discovery against the server's running container.
    async fn discover_running(
        &self,
        server: &ServerConfig,
    ) -> Result<Vec<DiscoveredTool>, GatewayError> {
        let run = self.containers.build_run_config(server)?;
        let running = self
            .containers
            .status(server)
            .await?
            .is_some_and(|state| state.running);
        if !running {
            return Err(GatewayError::NotRunning(server.id.clone()));
        }

        self.discovery
            .discover(&run)
            .await
            .map_err(|e| GatewayError::ToolSync {
                server_id: server.id.clone(),
                source: e.into(),
            })
    }

    /// Re-discover a running server and reconcile its tool set.
    pub async fn sync_tools(&self, id: &ServerId) -> Result<ReconcileOutcome, GatewayError> {
        let _guard = self.locks.acquire(id).await;
        let server = self.servers.get_by_id(id).await?;
        let discovered = self.discover_running(&server).await?;

        let outcome = self
            .sync
            .reconcile(id, discovered)
            .await
            .map_err(|source| GatewayError::ToolSync {
                server_id: id.clone(),
                source,
            })?;
        self.emitter.emit(AppEvent::tools_synced(id.clone(), outcome));
        Ok(outcome)
    }

    /// Update descriptions and schemas of known tools from a fresh discovery.
    pub async fn refresh_tool_schemas(&self, id: &ServerId) -> Result<usize, GatewayError> {
        let _guard = self.locks.acquire(id).await;
        let server = self.servers.get_by_id(id).await?;
        let discovered = self.discover_running(&server).await?;

        self.sync
            .refresh_metadata(id, discovered)
            .await
            .map_err(|source| GatewayError::ToolSync {
                server_id: id.clone(),
                source,
            })
    }

    /// Tools of one server, or enabled tools of every active server.
    pub async fn list_tools(
        &self,
        id: Option<&ServerId>,
    ) -> Result<Vec<ToolRecord>, GatewayError> {
        match id {
            Some(id) => {
                self.servers.get_by_id(id).await?;
                Ok(self.tools.list_for_server(id).await?)
            }
            None => Ok(self.tools.list_enabled().await?),
        }
    }

    pub async fn set_tool_enabled(
        &self,
        id: &ServerId,
        tool_name: &str,
        enabled: bool,
    ) -> Result<ToolRecord, GatewayError> {
        let record = self.tools.set_enabled(id, tool_name, enabled).await?;
        tracing::info!(
            server_id = %id,
            tool = %record.full_tool_name,
            enabled,
            "Changed tool availability"
        );
        Ok(record)
    }

    pub async fn get_tool(&self, full_tool_name: &str) -> Result<ToolRecord, GatewayError> {
        Ok(self.tools.get_by_full_name(full_tool_name).await?)
    }

    /// Configuration, derived run configuration, container state and tools.
    pub async fn server_info(&self, id: &ServerId) -> Result<ServerInfo, GatewayError> {
        let server = self.servers.get_by_id(id).await?;
        let tools = self.tools.list_for_server(id).await?;

        let (run_config, command_error) = match self.containers.build_run_config(&server) {
            Ok(run) => (Some(run), None),
            Err(e) => (None, Some(e.to_string())),
        };
        let (container, container_error) = match self.containers.status(&server).await {
            Ok(state) => (state, None),
            Err(e) => {
                tracing::warn!(server_id = %id, error = %e, "Container state unavailable");
                (None, Some(e.to_string()))
            }
        };

        Ok(ServerInfo {
            server,
            run_config,
            command_error,
            container,
            container_error,
            tools,
        })
    }

    /// Normalized argv for `command` as the container would run it.
    pub fn preview_command(
        &self,
        command: &str,
        kind: RuntimeKind,
    ) -> Result<Vec<String>, GatewayError> {
        Ok(self.containers.parser().parse(command, kind)?)
    }

    // =========================================================================
    // Usage log
    // =========================================================================

    pub async fn record_usage(&self, record: NewUsageRecord) -> Result<UsageRecord, GatewayError> {
        Ok(self.usage.append(record).await?)
    }

    pub async fn recent_usage(
        &self,
        server: Option<&ServerId>,
        limit: u32,
    ) -> Result<Vec<UsageRecord>, GatewayError> {
        Ok(match server {
            Some(id) => self.usage.for_server(id, limit).await?,
            None => self.usage.recent(limit).await?,
        })
    }
}
