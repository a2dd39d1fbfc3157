//! Server registry persistence.

use async_trait::async_trait;

use super::RepositoryError;
use crate::domain::{BuildStatus, NewServer, ServerConfig, ServerId};

/// Repository trait for registered tool servers.
///
/// # Design Rules
///
/// - Environment variables and secret mounts are embedded in `ServerConfig`
/// - `update()` replaces the whole record including env and mounts atomically
/// - Constraint: unique `name` across all servers
/// - The id assigned by `insert()` never changes
#[async_trait]
pub trait ServerRepository: Send + Sync {
    /// Insert a new server and assign its id.
    ///
    /// # Errors
    ///
    /// - `Conflict` if a server with the same name already exists
    /// - `Storage` for storage errors
    async fn insert(&self, server: NewServer) -> Result<ServerConfig, RepositoryError>;

    async fn get_by_id(&self, id: &ServerId) -> Result<ServerConfig, RepositoryError>;

    async fn get_by_name(&self, name: &str) -> Result<ServerConfig, RepositoryError>;

    /// All servers ordered by name.
    async fn list(&self) -> Result<Vec<ServerConfig>, RepositoryError>;

    /// Servers flagged active, ordered by name.
    async fn list_active(&self) -> Result<Vec<ServerConfig>, RepositoryError>;

    /// Replace a server record.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no server with the given id exists
    /// - `Conflict` if the new name belongs to another server
    async fn update(&self, server: &ServerConfig) -> Result<(), RepositoryError>;

    async fn set_active(&self, id: &ServerId, active: bool) -> Result<(), RepositoryError>;

    /// Record the outcome of a lifecycle operation.
    async fn set_build_status(
        &self,
        id: &ServerId,
        status: BuildStatus,
        error: Option<&str>,
    ) -> Result<(), RepositoryError>;

    /// Delete a server together with its tools.
    async fn delete(&self, id: &ServerId) -> Result<(), RepositoryError>;
}
