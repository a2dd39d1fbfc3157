//! Lifecycle events published by the gateway core.
//!
//! # Wire Format
//!
//! Events are serialized with a `type` tag:
//!
//! ```json
//! { "type": "tools_synced", "serverId": "0a1b2c3d", "added": 2, "removed": 0 }
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::{ReconcileOutcome, RuntimeKind, ServerConfig, ServerId};

/// Lightweight view of a server for event payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSummary {
    pub id: ServerId,
    pub name: String,
    pub runtime_kind: RuntimeKind,
}

impl From<&ServerConfig> for ServerSummary {
    fn from(server: &ServerConfig) -> Self {
        Self {
            id: server.id.clone(),
            name: server.name.clone(),
            runtime_kind: server.runtime_kind,
        }
    }
}

/// Canonical event union.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    ServerAdded {
        server: ServerSummary,
    },

    ServerUpdated {
        server: ServerSummary,
    },

    ServerRemoved {
        #[serde(rename = "serverId")]
        server_id: ServerId,
    },

    /// A container is running and its tools were discovered.
    ServerStarted {
        #[serde(rename = "serverId")]
        server_id: ServerId,
        #[serde(rename = "serverName")]
        server_name: String,
        container: String,
    },

    ServerStopped {
        #[serde(rename = "serverId")]
        server_id: ServerId,
        #[serde(rename = "serverName")]
        server_name: String,
    },

    /// A lifecycle operation failed; the server was marked failed and inactive.
    ServerFailed {
        #[serde(rename = "serverId")]
        server_id: ServerId,
        #[serde(rename = "serverName")]
        server_name: String,
        operation: String,
        error: String,
    },

    ToolsSynced {
        #[serde(rename = "serverId")]
        server_id: ServerId,
        added: usize,
        removed: usize,
    },
}

impl AppEvent {
    pub fn server_added(server: &ServerConfig) -> Self {
        Self::ServerAdded {
            server: server.into(),
        }
    }

    pub fn server_updated(server: &ServerConfig) -> Self {
        Self::ServerUpdated {
            server: server.into(),
        }
    }

    pub const fn server_removed(server_id: ServerId) -> Self {
        Self::ServerRemoved { server_id }
    }

    pub fn server_started(server: &ServerConfig, container: impl Into<String>) -> Self {
        Self::ServerStarted {
            server_id: server.id.clone(),
            server_name: server.name.clone(),
            container: container.into(),
        }
    }

    pub fn server_stopped(server: &ServerConfig) -> Self {
        Self::ServerStopped {
            server_id: server.id.clone(),
            server_name: server.name.clone(),
        }
    }

    pub fn server_failed(
        server: &ServerConfig,
        operation: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self::ServerFailed {
            server_id: server.id.clone(),
            server_name: server.name.clone(),
            operation: operation.into(),
            error: error.into(),
        }
    }

    pub const fn tools_synced(server_id: ServerId, outcome: ReconcileOutcome) -> Self {
        Self::ToolsSynced {
            server_id,
            added: outcome.added,
            removed: outcome.removed,
        }
    }

    /// Stable event name, matching the serialized `type` tag.
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::ServerAdded { .. } => "server_added",
            Self::ServerUpdated { .. } => "server_updated",
            Self::ServerRemoved { .. } => "server_removed",
            Self::ServerStarted { .. } => "server_started",
            Self::ServerStopped { .. } => "server_stopped",
            Self::ServerFailed { .. } => "server_failed",
            Self::ToolsSynced { .. } => "tools_synced",
        }
    }
}
