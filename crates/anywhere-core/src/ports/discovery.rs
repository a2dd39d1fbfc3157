//! Tool discovery against a running server.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{DiscoveredTool, RunConfiguration, TransportMode};

/// Why a discovery handshake produced no tool list.
///
/// Distinct from a successful handshake that listed zero tools: callers
/// must not reconcile after an error.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("discovery over {0} transport is not supported")]
    Unsupported(TransportMode),

    #[error("failed to attach to server: {0}")]
    Spawn(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("server error {code}: {message}")]
    Server { code: i64, message: String },

    #[error("discovery timed out after {0:?}")]
    Timeout(Duration),
}

/// Lists the tools a running server exposes.
#[async_trait]
pub trait ToolDiscovery: Send + Sync {
    async fn discover(
        &self,
        run: &RunConfiguration,
    ) -> Result<Vec<DiscoveredTool>, DiscoveryError>;
}
