//! Container Manager.
//!
//! Derives image tags, container names, environment and mounts for a tool
//! server and drives its container through a [`ContainerRuntime`].
//!
//! [`ContainerRuntime`]: anywhere_core::ports::ContainerRuntime

pub mod dockerfile;
pub mod layout;
mod manager;
pub mod naming;
pub mod run_config;

use anywhere_core::command::CommandError;
use anywhere_core::domain::ServerId;
use thiserror::Error;

pub use dockerfile::{ImagePlan, image_plan, render_dockerfile};
pub use layout::{TRANSPORT_ENV, env_layout, secret_mounts};
pub use manager::{ContainerManager, StartedContainer};
pub use naming::{ContainerNaming, build_hash, config_hash};
pub use run_config::build_run_config;

/// Lifecycle failure of one server's container.
///
/// Always scoped to a single server; siblings are unaffected.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("server {server_id}: invalid start command: {source}")]
    InvalidCommand {
        server_id: ServerId,
        #[source]
        source: CommandError,
    },

    #[error("server {server_id}: invalid configuration: {message}")]
    InvalidConfig { server_id: ServerId, message: String },

    #[error("server {server_id}: image build failed: {message}")]
    Build { server_id: ServerId, message: String },

    #[error("server {server_id}: container start failed: {message}")]
    Start { server_id: ServerId, message: String },

    #[error("server {server_id}: container stop failed: {message}")]
    Stop { server_id: ServerId, message: String },

    #[error("server {server_id}: container inspect failed: {message}")]
    Inspect { server_id: ServerId, message: String },
}

impl ContainerError {
    pub const fn server_id(&self) -> &ServerId {
        match self {
            Self::InvalidCommand { server_id, .. }
            | Self::InvalidConfig { server_id, .. }
            | Self::Build { server_id, .. }
            | Self::Start { server_id, .. }
            | Self::Stop { server_id, .. }
            | Self::Inspect { server_id, .. } => server_id,
        }
    }

    /// Lifecycle step that failed.
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::InvalidCommand { .. } | Self::InvalidConfig { .. } => "configure",
            Self::Build { .. } => "build",
            Self::Start { .. } => "start",
            Self::Stop { .. } => "stop",
            Self::Inspect { .. } => "inspect",
        }
    }
}
