//! Composition root for the CLI.
//!
//! Builds the main loop, opens the database on it and wires the gateway
//! service behind a [`BlockingGateway`]. Handlers run on the calling thread
//! and reach the async services only through the bridge.

use std::sync::Arc;
use std::time::Duration;

use anywhere_core::GatewayConfig;
use anywhere_core::ports::{AppEventEmitter, ContainerRuntime, NoopEmitter, ToolDiscovery};
use anywhere_db::CoreFactory;
use anywhere_gateway::{BlockingGateway, GatewayService};
use anywhere_runtime::{DockerCli, EventLoopBridge, MainLoop, StdioDiscovery};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::error::CliError;

/// Time allowed for in-flight tasks when the CLI exits.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Everything a handler needs.
///
/// Field order matters: the gateway (and the pool it owns) drops before
/// the main loop it runs on.
pub struct CliContext {
    pub gateway: BlockingGateway,
    pub config: GatewayConfig,
    main_loop: MainLoop,
}

impl CliContext {
    pub const fn gateway(&self) -> &BlockingGateway {
        &self.gateway
    }

    pub const fn main_loop(&self) -> &MainLoop {
        &self.main_loop
    }

    /// Close the bridge and stop the main loop.
    pub fn shutdown(self) {
        let Self {
            gateway, main_loop, ..
        } = self;
        drop(gateway);
        main_loop.shutdown(SHUTDOWN_GRACE);
    }
}

/// Wire the CLI against `config`.
pub fn bootstrap(config: GatewayConfig) -> Result<CliContext, CliError> {
    config.validate()?;
    config.ensure_directories()?;

    let main_loop = MainLoop::new(config.worker_threads)?;
    let pool = main_loop
        .block_on(CoreFactory::create_pool(&config.database_path))
        .map_err(|e| CliError::Database(format!("{e:#}")))?;
    let repos = CoreFactory::build_repos(pool);
    debug!(path = %config.database_path.display(), "database ready");

    let docker = DockerCli::new(config.docker_bin.clone());
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(docker.clone());
    let discovery: Arc<dyn ToolDiscovery> =
        Arc::new(StdioDiscovery::new(docker, config.discovery_timeout));
    let emitter: Arc<dyn AppEventEmitter> = Arc::new(NoopEmitter::new());
    let service = Arc::new(GatewayService::new(
        repos, runtime, discovery, emitter, &config,
    ));

    let bridge = Arc::new(EventLoopBridge::new());
    bridge.set_main_loop(main_loop.handle());
    let gateway = BlockingGateway::new(service, bridge, config.bridge_timeout);

    Ok(CliContext {
        gateway,
        config,
        main_loop,
    })
}

/// Install the tracing subscriber.
///
/// `RUST_LOG` wins; otherwise `info`, or `debug` with `--verbose`.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // A second init (tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_creates_database_and_serves_calls() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GatewayConfig::with_data_dir(dir.path());
        config.worker_threads = 2;

        let ctx = bootstrap(config).unwrap();
        assert!(ctx.config.database_path.exists());
        assert!(ctx.gateway().list_servers().unwrap().is_empty());

        let argv = ctx
            .gateway()
            .preview_command("uvx mcp-server-time", anywhere_core::domain::RuntimeKind::Uvx)
            .unwrap();
        assert_eq!(argv, vec!["uvx", "mcp-server-time"]);
        ctx.shutdown();
    }

    #[test]
    fn invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GatewayConfig::with_data_dir(dir.path());
        config.docker_bin = String::new();

        let err = bootstrap(config).err().unwrap();
        assert_eq!(err.exit_code(), 78);
    }
}
