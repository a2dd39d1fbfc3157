//! Gateway service errors.

use anywhere_core::command::CommandError;
use anywhere_core::domain::ServerId;
use anywhere_core::ports::RepositoryError;
use anywhere_core::tool_sync::ToolSyncError;
use anywhere_core::validation::ValidationError;
use anywhere_runtime::{BridgeError, ContainerError};
use thiserror::Error;

/// Errors surfaced by [`GatewayService`](crate::GatewayService).
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The registration or edit failed validation; nothing was stored.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Command(#[from] CommandError),

    /// Storage failure; any open transaction was rolled back.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error("server {server_id}: tool sync failed: {source}")]
    ToolSync {
        server_id: ServerId,
        #[source]
        source: ToolSyncError,
    },

    #[error("server {0} has no running container")]
    NotRunning(ServerId),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl GatewayError {
    /// Short name of the step that failed, for events and reports.
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validate",
            Self::Command(_) => "parse",
            Self::Repository(_) => "persist",
            Self::Container(e) => e.operation(),
            Self::ToolSync {
                source: ToolSyncError::Discovery(_),
                ..
            } => "discover",
            Self::ToolSync { .. } => "sync",
            Self::NotRunning(_) => "status",
            Self::Bridge(_) => "bridge",
        }
    }

    /// Whether the error means "no such server or tool".
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Repository(RepositoryError::NotFound(_)))
    }
}
