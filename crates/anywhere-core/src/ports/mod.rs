//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces the gateway core expects from infrastructure.
//! They contain no implementation details and use only domain types.
//!
//! # Design Rules
//!
//! - No `sqlx` types in any signature
//! - No `docker` command lines or process handles in any signature
//! - Repository traits are CRUD-focused; tool reconciliation is the one
//!   composite operation and must be atomic

pub mod container_runtime;
pub mod discovery;
pub mod event_emitter;
pub mod server_repository;
pub mod tool_repository;
pub mod usage_repository;

use std::sync::Arc;
use thiserror::Error;

pub use container_runtime::{
    ContainerHandle, ContainerRuntime, ContainerRuntimeError, ContainerState, ImageBuildSpec,
};
pub use discovery::{DiscoveryError, ToolDiscovery};
pub use event_emitter::{AppEventEmitter, NoopEmitter};
pub use server_repository::ServerRepository;
pub use tool_repository::ToolRepository;
pub use usage_repository::UsageLogRepository;

/// Container for all repository trait objects.
///
/// Lets the composition root wire repositories without the services
/// depending on `anywhere-db`.
#[derive(Clone)]
pub struct Repos {
    pub servers: Arc<dyn ServerRepository>,
    pub tools: Arc<dyn ToolRepository>,
    pub usage: Arc<dyn UsageLogRepository>,
}

impl Repos {
    pub fn new(
        servers: Arc<dyn ServerRepository>,
        tools: Arc<dyn ToolRepository>,
        usage: Arc<dyn UsageLogRepository>,
    ) -> Self {
        Self {
            servers,
            tools,
            usage,
        }
    }
}

/// Domain-specific errors for repository operations.
///
/// Abstracts storage details away from services. Any error returned from a
/// multi-statement write means the write was rolled back in full.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    /// The requested entity was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint was violated.
    #[error("Already exists: {0}")]
    Conflict(String),

    /// Storage backend error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A stored value could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}
