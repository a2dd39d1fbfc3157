//! Domain types for registered tool servers and their tools.
//!
//! These types carry no storage or process details. Ports and adapters
//! translate them to rows, container specs and protocol messages.

mod run_config;
mod server;
mod tool;
mod usage;

pub use run_config::{RunConfiguration, TransportMode, VolumeMount};
pub use server::{
    BuildStatus, EnvVarDecl, NewServer, RuntimeKind, SecretFileMount, ServerConfig, ServerId,
    UpdateServer, is_git_url,
};
pub use tool::{
    DiscoveredTool, ReconcileOutcome, ToolRecord, ToolShapeError, full_tool_name,
};
pub use usage::{NewUsageRecord, UsageRecord, UsageStatus};
