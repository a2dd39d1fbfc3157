//! Container runtime abstraction.
//!
//! The gateway only ever needs a handful of verbs from the container engine.
//! Adapters translate them to a CLI, a socket API or an in-memory fake.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::RunConfiguration;

/// Raw failure reported by the container engine.
#[derive(Debug, Error)]
pub enum ContainerRuntimeError {
    /// The engine binary or daemon cannot be reached.
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),

    /// The engine ran but rejected the request.
    #[error("{operation} failed ({status}): {stderr}")]
    CommandFailed {
        operation: &'static str,
        status: String,
        stderr: String,
    },

    /// The engine produced output we could not interpret.
    #[error("unexpected runtime output from {operation}: {message}")]
    Malformed {
        operation: &'static str,
        message: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Image to build from an inline Dockerfile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageBuildSpec {
    pub tag: String,
    pub dockerfile: String,
    pub labels: BTreeMap<String, String>,
}

/// Observed state of a named container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    pub id: String,
    pub name: String,
    pub image: String,
    pub running: bool,
    pub labels: BTreeMap<String, String>,
}

/// Reference to a container started by [`ContainerRuntime::run_container`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
}

/// Verbs the container manager issues against the engine.
///
/// Lookups return `Ok(None)` for things that do not exist; only engine
/// failures are errors. `stop_container` and `remove_container` succeed on
/// containers that are already gone.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Labels of a local image, `None` when the image is absent.
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

    /// Create and start a detached container with stdin kept open.
    async fn run_container(
        &self,
        config: &RunConfiguration,
    ) -> Result<ContainerHandle, ContainerRuntimeError>;

    async fn stop_container(&self, name: &str, grace: Duration)
    -> Result<(), ContainerRuntimeError>;

    async fn remove_container(&self, name: &str) -> Result<(), ContainerRuntimeError>;
}
