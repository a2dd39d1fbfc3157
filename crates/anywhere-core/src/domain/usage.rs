//! Tool invocation log entries.
//!
//! Records are written by whichever layer proxies tool calls. They are
//! append-only: nothing updates a record after it is created.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ServerId;

/// Outcome of one tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageStatus {
    Success,
    Error,
}

impl UsageStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    pub fn from_db(s: &str) -> Self {
        if s == "success" { Self::Success } else { Self::Error }
    }
}

/// A stored tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub client_name: Option<String>,
    pub server_id: ServerId,
    pub server_name: String,
    pub tool_name: String,
    pub full_tool_name: String,
    pub status: UsageStatus,
    pub latency_ms: u64,
    pub request: Option<Value>,
    pub response: Option<Value>,
    pub error: Option<String>,
}

/// A tool invocation to append to the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUsageRecord {
    pub client_name: Option<String>,
    pub server_id: ServerId,
    pub server_name: String,
    pub tool_name: String,
    pub full_tool_name: String,
    pub status: UsageStatus,
    pub latency_ms: u64,
    pub request: Option<Value>,
    pub response: Option<Value>,
    pub error: Option<String>,
}
