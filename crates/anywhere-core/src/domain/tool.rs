//! Tool inventory types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::ServerId;

/// Externally visible name of a server's tool.
///
/// Prefixing with the server id keeps tools with the same bare name on
/// different servers apart.
pub fn full_tool_name(server_id: &ServerId, tool_name: &str) -> String {
    format!("{server_id}_{tool_name}")
}

/// A persisted tool exposed by a tool server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRecord {
    pub id: i64,
    pub server_id: ServerId,
    /// Bare tool name, unique within the server.
    pub tool_name: String,
    pub full_tool_name: String,
    pub description: String,
    /// JSON schema of the call arguments.
    pub schema: Option<Value>,
    /// Operator toggle. Survives re-discovery.
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// Rejection of a discovered tool entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolShapeError {
    #[error("discovered tool has an empty name")]
    EmptyName,

    #[error("discovered tool name contains whitespace or control characters: {0:?}")]
    InvalidName(String),
}

/// One tool as reported by a live discovery handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredTool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

impl DiscoveredTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            schema: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn validate(&self) -> Result<(), ToolShapeError> {
        if self.name.is_empty() {
            return Err(ToolShapeError::EmptyName);
        }
        if self
            .name
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(ToolShapeError::InvalidName(self.name.clone()));
        }
        Ok(())
    }
}

/// Counts returned by one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    pub added: usize,
    pub removed: usize,
}

impl ReconcileOutcome {
    pub const fn is_noop(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}
