#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

pub mod command;
pub mod config;
pub mod domain;
pub mod events;
pub mod paths;
pub mod ports;
pub mod tool_sync;
pub mod validation;

// Re-export commonly used types for convenience
pub use command::{CommandError, CommandParser};
pub use config::{ConfigError, GatewayConfig};
pub use domain::{
    BuildStatus, DiscoveredTool, EnvVarDecl, NewServer, NewUsageRecord, ReconcileOutcome,
    RunConfiguration, RuntimeKind, SecretFileMount, ServerConfig, ServerId, ToolRecord,
    TransportMode, UpdateServer, UsageRecord, UsageStatus, VolumeMount, full_tool_name,
};
pub use events::{AppEvent, ServerSummary};
pub use ports::{
    AppEventEmitter, ContainerHandle, ContainerRuntime, ContainerRuntimeError, ContainerState,
    DiscoveryError, ImageBuildSpec, NoopEmitter, Repos, RepositoryError, ServerRepository,
    ToolDiscovery, ToolRepository, UsageLogRepository,
};
pub use tool_sync::{ToolSyncError, ToolSyncService};
pub use validation::{ValidationError, ValidationIssue, validate_server};
