//! Append-only tool usage log.

use async_trait::async_trait;

use super::RepositoryError;
use crate::domain::{NewUsageRecord, ServerId, UsageRecord};

/// Repository trait for tool invocation records.
///
/// Records are never updated or deleted once written.
#[async_trait]
pub trait UsageLogRepository: Send + Sync {
    async fn append(&self, record: NewUsageRecord) -> Result<UsageRecord, RepositoryError>;

    /// Most recent records first.
    async fn recent(&self, limit: u32) -> Result<Vec<UsageRecord>, RepositoryError>;

    /// Most recent records of one server first.
    async fn for_server(
        &self,
        server_id: &ServerId,
        limit: u32,
    ) -> Result<Vec<UsageRecord>, RepositoryError>;
}
