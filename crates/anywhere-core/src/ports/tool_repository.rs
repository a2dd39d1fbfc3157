//! Tool inventory persistence.

use async_trait::async_trait;

use super::RepositoryError;
use crate::domain::{DiscoveredTool, ReconcileOutcome, ServerId, ToolRecord};

/// Repository trait for per-server tool records.
///
/// Additions and removals only ever happen through [`reconcile`], which the
/// tool sync service calls. Other callers may toggle `is_enabled` but never
/// rename a tool.
///
/// [`reconcile`]: ToolRepository::reconcile
#[async_trait]
pub trait ToolRepository: Send + Sync {
    /// Tools of one server ordered by tool name.
    async fn list_for_server(&self, server_id: &ServerId)
    -> Result<Vec<ToolRecord>, RepositoryError>;

    /// Enabled tools across every active server.
    async fn list_enabled(&self) -> Result<Vec<ToolRecord>, RepositoryError>;

    /// Bring the stored tool set in line with `discovered` in one transaction.
    ///
    /// New names are inserted enabled, missing names are deleted and names
    /// present on both sides are left as they are. On error nothing changes.
    async fn reconcile(
        &self,
        server_id: &ServerId,
        discovered: &[DiscoveredTool],
    ) -> Result<ReconcileOutcome, RepositoryError>;

    /// Overwrite description and schema of tools present in `discovered`.
    ///
    /// Never inserts, deletes, renames or re-enables. Returns the number of
    /// records whose metadata changed.
    async fn refresh_metadata(
        &self,
        server_id: &ServerId,
        discovered: &[DiscoveredTool],
    ) -> Result<usize, RepositoryError>;

    async fn set_enabled(
        &self,
        server_id: &ServerId,
        tool_name: &str,
        enabled: bool,
    ) -> Result<ToolRecord, RepositoryError>;

    async fn get_by_full_name(&self, full_tool_name: &str) -> Result<ToolRecord, RepositoryError>;
}
