//! Container lifecycle against the engine port.

use std::collections::BTreeMap;
use std::sync::Arc;

use anywhere_core::command::CommandParser;
use anywhere_core::config::GatewayConfig;
use anywhere_core::domain::{RunConfiguration, ServerConfig, ServerId};
use anywhere_core::ports::{ContainerHandle, ContainerRuntime, ContainerState};
use futures_util::future::join_all;

use super::dockerfile::{ImagePlan, image_plan};
use super::naming::{ContainerNaming, LABEL_BUILD_HASH, LABEL_CONFIG_HASH, build_hash};
use super::run_config::build_run_config;
use super::{ContainerError, layout};

/// Result of a successful `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedContainer {
    pub handle: ContainerHandle,
    pub run: RunConfiguration,
    /// An identical container was already running and was kept.
    pub reused: bool,
    /// The image was built or pulled during this start.
    pub image_prepared: bool,
}

/// Builds images and starts, stops and replaces server containers.
///
/// Callers must not run two lifecycle operations for the same server at
/// once; different servers are independent.
pub struct ContainerManager {
    runtime: Arc<dyn ContainerRuntime>,
    parser: CommandParser,
    naming: ContainerNaming,
    config: GatewayConfig,
}

impl ContainerManager {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: &GatewayConfig) -> Self {
        Self {
            runtime,
            parser: config.command_parser(),
            naming: ContainerNaming::new(&config.image_namespace, &config.container_prefix),
            config: config.clone(),
        }
    }

    pub fn parser(&self) -> &CommandParser {
        &self.parser
    }

    pub fn image_tag(&self, server: &ServerConfig) -> String {
        self.naming.image_tag(server)
    }

    pub fn container_name(&self, server: &ServerConfig) -> String {
        self.naming.container_name(server)
    }

    /// Environment the container would get, given its parsed command.
    pub fn env_layout(
        &self,
        server: &ServerConfig,
    ) -> Result<BTreeMap<String, String>, ContainerError> {
        let argv = self.parse(server)?;
        Ok(layout::env_layout(server, &argv))
    }

    /// Derive a fresh run configuration. Never cached.
    pub fn build_run_config(&self, server: &ServerConfig) -> Result<RunConfiguration, ContainerError> {
        build_run_config(server, &self.parser, &self.naming, &self.config.secrets_dir).map_err(|source| {
            ContainerError::InvalidCommand {
                server_id: server.id.clone(),
                source,
            }
        })
    }

    fn parse(&self, server: &ServerConfig) -> Result<Vec<String>, ContainerError> {
        self.parser
            .parse(&server.start_command, server.runtime_kind)
            .map_err(|source| ContainerError::InvalidCommand {
                server_id: server.id.clone(),
                source,
            })
    }

    /// Current state of the server's container, if one exists.
    pub async fn status(&self, server: &ServerConfig) -> Result<Option<ContainerState>, ContainerError> {
        self.runtime
            .inspect_container(&self.naming.container_name(server))
            .await
            .map_err(|e| ContainerError::Inspect {
                server_id: server.id.clone(),
                message: e.to_string(),
            })
    }

    /// Make sure the image exists, building or pulling as needed.
    ///
    /// Returns whether any work was done.
    async fn ensure_image(
        &self,
        server: &ServerConfig,
        run: &RunConfiguration,
    ) -> Result<bool, ContainerError> {
        let build_error = |message: String| ContainerError::Build {
            server_id: server.id.clone(),
            message,
        };

        let base = self.config.base_image(server.runtime_kind);
        let hash = build_hash(server, base);
        let existing = self
            .runtime
            .image_labels(&run.image_tag)
            .await
            .map_err(|e| build_error(e.to_string()))?;

        match image_plan(server, &run.image_tag, base, &hash) {
            ImagePlan::Pull { reference } => {
                if existing.is_some() {
                    return Ok(false);
                }
                tracing::info!(server_id = %server.id, image = %reference, "Pulling image");
                self.runtime
                    .pull_image(&reference)
                    .await
                    .map_err(|e| build_error(e.to_string()))?;
                Ok(true)
            }
            ImagePlan::Build { spec, build_hash } => {
                let current = existing
                    .as_ref()
                    .and_then(|labels| labels.get(LABEL_BUILD_HASH));
                if current == Some(&build_hash) {
                    tracing::debug!(server_id = %server.id, image = %spec.tag, "Image up to date");
                    return Ok(false);
                }
                tracing::info!(server_id = %server.id, image = %spec.tag, "Building image");
                self.runtime
                    .build_image(&spec)
                    .await
                    .map_err(|e| build_error(e.to_string()))?;
                Ok(true)
            }
        }
    }

    /// Start the server's container.
    ///
    /// A running container with the same configuration hash is kept; any
    /// other container with the server's name is replaced.
    pub async fn start(&self, server: &ServerConfig) -> Result<StartedContainer, ContainerError> {
        let run = self.build_run_config(server)?;
        let image_prepared = self.ensure_image(server, &run).await?;

        let start_error = |message: String| ContainerError::Start {
            server_id: server.id.clone(),
            message,
        };

        let existing = self
            .runtime
            .inspect_container(&run.container_name)
            .await
            .map_err(|e| start_error(e.to_string()))?;

        if let Some(state) = existing {
            let same_config = state.labels.get(LABEL_CONFIG_HASH) == Some(&run.config_hash);
            if state.running && same_config && !image_prepared {
                tracing::debug!(
                    server_id = %server.id,
                    container = %run.container_name,
                    "Container already running with current configuration"
                );
                return Ok(StartedContainer {
                    handle: ContainerHandle {
                        id: state.id,
                        name: state.name,
                    },
                    run,
                    reused: true,
                    image_prepared,
                });
            }

            tracing::info!(
                server_id = %server.id,
                container = %run.container_name,
                "Replacing container with stale configuration"
            );
            if state.running {
                self.runtime
                    .stop_container(&run.container_name, self.config.stop_grace)
                    .await
                    .map_err(|e| start_error(e.to_string()))?;
            }
            self.runtime
                .remove_container(&run.container_name)
                .await
                .map_err(|e| start_error(e.to_string()))?;
        }

        let handle = self
            .runtime
            .run_container(&run)
            .await
            .map_err(|e| start_error(e.to_string()))?;

        tracing::info!(
            server_id = %server.id,
            server_name = %server.name,
            container = %handle.name,
            "Container started"
        );

        Ok(StartedContainer {
            handle,
            run,
            reused: false,
            image_prepared,
        })
    }

    /// Stop and remove the server's container. Absent containers are fine.
    pub async fn stop(&self, server: &ServerConfig) -> Result<(), ContainerError> {
        let name = self.naming.container_name(server);
        let stop_error = |message: String| ContainerError::Stop {
            server_id: server.id.clone(),
            message,
        };

        self.runtime
            .stop_container(&name, self.config.stop_grace)
            .await
            .map_err(|e| stop_error(e.to_string()))?;
        self.runtime
            .remove_container(&name)
            .await
            .map_err(|e| stop_error(e.to_string()))?;

        tracing::info!(server_id = %server.id, container = %name, "Container stopped");
        Ok(())
    }

    /// Stop, then start with a freshly derived configuration.
    pub async fn restart(&self, server: &ServerConfig) -> Result<StartedContainer, ContainerError> {
        // Parse first so a broken command never takes down a running container
        self.build_run_config(server)?;
        self.stop(server).await?;
        self.start(server).await
    }

    /// Start every server concurrently. One failure never affects another.
    pub async fn start_all(
        &self,
        servers: &[ServerConfig],
    ) -> Vec<(ServerId, Result<StartedContainer, ContainerError>)> {
        join_all(servers.iter().map(|server| async move {
            let result = self.start(server).await;
            if let Err(e) = &result {
                tracing::warn!(server_id = %server.id, error = %e, "Server failed to start");
            }
            (server.id.clone(), result)
        }))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anywhere_core::domain::{NewServer, RuntimeKind};
    use anywhere_core::ports::{ContainerRuntimeError, ImageBuildSpec};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::time::Duration;

    mockall::mock! {
        pub Runtime {}

        #[async_trait]
        impl ContainerRuntime for Runtime {
            async fn image_labels(
                &self,
                tag: &str,
            ) -> Result<Option<BTreeMap<String, String>>, ContainerRuntimeError>;
            async fn build_image(&self, spec: &ImageBuildSpec) -> Result<(), ContainerRuntimeError>;
            async fn pull_image(&self, reference: &str) -> Result<(), ContainerRuntimeError>;
            async fn inspect_container(
                &self,
                name: &str,
            ) -> Result<Option<ContainerState>, ContainerRuntimeError>;
            async fn run_container(
                &self,
                config: &RunConfiguration,
            ) -> Result<ContainerHandle, ContainerRuntimeError>;
            async fn stop_container(
                &self,
                name: &str,
                grace: Duration,
            ) -> Result<(), ContainerRuntimeError>;
            async fn remove_container(&self, name: &str) -> Result<(), ContainerRuntimeError>;
        }
    }

    fn config() -> GatewayConfig {
        GatewayConfig::with_data_dir("/var/lib/mcp")
    }

    fn server(id: &str, start: &str) -> ServerConfig {
        NewServer::new(format!("srv-{id}"), "pkg", RuntimeKind::Npx, start)
            .into_config(ServerId::new(id), Utc::now())
    }

    fn current_image_labels(server: &ServerConfig) -> BTreeMap<String, String> {
        let hash = build_hash(server, Some(&config().node_base_image));
        BTreeMap::from([(LABEL_BUILD_HASH.to_string(), hash)])
    }

    fn handle(name: &str) -> ContainerHandle {
        ContainerHandle {
            id: format!("id-{name}"),
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn invalid_command_fails_before_any_runtime_call() {
        // No expectations: any call into the runtime panics
        let manager = ContainerManager::new(Arc::new(MockRuntime::new()), &config());
        let err = manager.start(&server("0a1b2c3d", "npx \"pkg")).await.unwrap_err();
        assert!(matches!(err, ContainerError::InvalidCommand { .. }));
        assert_eq!(err.server_id().as_str(), "0a1b2c3d");
    }

    #[tokio::test]
    async fn fresh_start_builds_and_runs() {
        let mut runtime = MockRuntime::new();
        runtime.expect_image_labels().times(1).returning(|_| Ok(None));
        runtime
            .expect_build_image()
            .withf(|spec| spec.tag == "mcp-anywhere/server-0a1b2c3d:latest")
            .times(1)
            .returning(|_| Ok(()));
        runtime
            .expect_inspect_container()
            .withf(|name| name == "mcp-0a1b2c3d")
            .times(1)
            .returning(|_| Ok(None));
        runtime
            .expect_run_container()
            .withf(|run| run.argv == ["npx", "pkg"])
            .times(1)
            .returning(|run| Ok(handle(&run.container_name)));

        let manager = ContainerManager::new(Arc::new(runtime), &config());
        let started = manager.start(&server("0a1b2c3d", "npx pkg")).await.unwrap();
        assert!(!started.reused);
        assert!(started.image_prepared);
        assert_eq!(started.handle.name, "mcp-0a1b2c3d");
    }

    #[tokio::test]
    async fn start_is_idempotent_for_identical_configuration() {
        let srv = server("0a1b2c3d", "npx pkg");
        let manager_for_hash = ContainerManager::new(Arc::new(MockRuntime::new()), &config());
        let run = manager_for_hash.build_run_config(&srv).unwrap();

        let mut runtime = MockRuntime::new();
        let labels = current_image_labels(&srv);
        runtime
            .expect_image_labels()
            .returning(move |_| Ok(Some(labels.clone())));
        let hash = run.config_hash.clone();
        runtime.expect_inspect_container().returning(move |name| {
            Ok(Some(ContainerState {
                id: "abc".into(),
                name: name.to_string(),
                image: "img".into(),
                running: true,
                labels: BTreeMap::from([(LABEL_CONFIG_HASH.to_string(), hash.clone())]),
            }))
        });
        // No build, stop, remove or run expectations

        let manager = ContainerManager::new(Arc::new(runtime), &config());
        let started = manager.start(&srv).await.unwrap();
        assert!(started.reused);
        assert_eq!(started.handle.id, "abc");
    }

    #[tokio::test]
    async fn changed_configuration_replaces_container() {
        let srv = server("0a1b2c3d", "npx pkg --new-flag");
        let mut runtime = MockRuntime::new();
        let labels = current_image_labels(&srv);
        runtime
            .expect_image_labels()
            .returning(move |_| Ok(Some(labels.clone())));
        runtime.expect_inspect_container().returning(|name| {
            Ok(Some(ContainerState {
                id: "old".into(),
                name: name.to_string(),
                image: "img".into(),
                running: true,
                labels: BTreeMap::from([(LABEL_CONFIG_HASH.to_string(), "stale".to_string())]),
            }))
        });
        runtime
            .expect_stop_container()
            .withf(|name, grace| name == "mcp-0a1b2c3d" && *grace == Duration::from_secs(10))
            .times(1)
            .returning(|_, _| Ok(()));
        runtime
            .expect_remove_container()
            .times(1)
            .returning(|_| Ok(()));
        runtime
            .expect_run_container()
            .times(1)
            .returning(|run| Ok(handle(&run.container_name)));

        let manager = ContainerManager::new(Arc::new(runtime), &config());
        let started = manager.start(&srv).await.unwrap();
        assert!(!started.reused);
        assert!(!started.image_prepared);
    }

    #[tokio::test]
    async fn docker_kind_pulls_missing_image() {
        let srv = NewServer::new("img", "ghcr.io/acme/tool:1", RuntimeKind::Docker, "tool --stdio")
            .into_config(ServerId::new("0a1b2c3d"), Utc::now());

        let mut runtime = MockRuntime::new();
        runtime.expect_image_labels().returning(|_| Ok(None));
        runtime
            .expect_pull_image()
            .withf(|reference| reference == "ghcr.io/acme/tool:1")
            .times(1)
            .returning(|_| Ok(()));
        runtime.expect_inspect_container().returning(|_| Ok(None));
        runtime
            .expect_run_container()
            .withf(|run| run.image_tag == "ghcr.io/acme/tool:1")
            .returning(|run| Ok(handle(&run.container_name)));

        let manager = ContainerManager::new(Arc::new(runtime), &config());
        manager.start(&srv).await.unwrap();
    }

    #[tokio::test]
    async fn build_failure_is_reported_per_server() {
        let mut runtime = MockRuntime::new();
        runtime.expect_image_labels().returning(|_| Ok(None));
        runtime.expect_build_image().returning(|_| {
            Err(ContainerRuntimeError::CommandFailed {
                operation: "build",
                status: "exit status: 1".into(),
                stderr: "npm ERR!".into(),
            })
        });

        let manager = ContainerManager::new(Arc::new(runtime), &config());
        let err = manager.start(&server("0a1b2c3d", "npx pkg")).await.unwrap_err();
        assert!(matches!(err, ContainerError::Build { .. }));
        assert_eq!(err.operation(), "build");
        assert!(err.to_string().contains("npm ERR!"));
    }

    #[tokio::test]
    async fn start_all_isolates_failures() {
        let mut runtime = MockRuntime::new();
        runtime.expect_image_labels().returning(|_| Ok(None));
        runtime.expect_build_image().returning(|_| Ok(()));
        runtime.expect_inspect_container().returning(|_| Ok(None));
        runtime
            .expect_run_container()
            .returning(|run| Ok(handle(&run.container_name)));

        let manager = ContainerManager::new(Arc::new(runtime), &config());
        let servers = vec![
            server("aaaaaaaa", "npx 'broken"),
            server("bbbbbbbb", "npx pkg"),
        ];
        let results = manager.start_all(&servers).await;

        assert_eq!(results.len(), 2);
        assert!(matches!(
            results[0].1,
            Err(ContainerError::InvalidCommand { .. })
        ));
        assert_eq!(results[1].0.as_str(), "bbbbbbbb");
        assert!(results[1].1.is_ok());
    }

    #[tokio::test]
    async fn stop_removes_container() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_stop_container()
            .times(1)
            .returning(|_, _| Ok(()));
        runtime
            .expect_remove_container()
            .withf(|name| name == "mcp-0a1b2c3d")
            .times(1)
            .returning(|_| Ok(()));

        let manager = ContainerManager::new(Arc::new(runtime), &config());
        manager.stop(&server("0a1b2c3d", "npx pkg")).await.unwrap();
    }

    #[tokio::test]
    async fn status_failure_is_an_inspect_error() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_inspect_container()
            .times(1)
            .returning(|_| Err(ContainerRuntimeError::Unavailable("daemon down".into())));

        let manager = ContainerManager::new(Arc::new(runtime), &config());
        let err = manager
            .status(&server("0a1b2c3d", "npx pkg"))
            .await
            .unwrap_err();
        assert!(matches!(err, ContainerError::Inspect { .. }));
        assert_eq!(err.operation(), "inspect");
        assert!(err.to_string().contains("daemon down"));
    }

    #[tokio::test]
    async fn restart_with_broken_command_leaves_container_alone() {
        let manager = ContainerManager::new(Arc::new(MockRuntime::new()), &config());
        let err = manager
            .restart(&server("0a1b2c3d", "npx \\"))
            .await
            .unwrap_err();
        assert!(matches!(err, ContainerError::InvalidCommand { .. }));
    }
}
