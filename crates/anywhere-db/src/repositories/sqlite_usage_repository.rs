//! `SQLite` implementation of the append-only usage log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use anywhere_core::domain::{NewUsageRecord, ServerId, UsageRecord, UsageStatus};
use anywhere_core::ports::{RepositoryError, UsageLogRepository};

use super::{decode_json, encode_json, map_sqlx_error};

pub struct SqliteUsageRepository {
    pool: SqlitePool,
}

impl SqliteUsageRepository {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UsageRow {
    id: i64,
    timestamp: DateTime<Utc>,
    client_name: Option<String>,
    server_id: String,
    server_name: String,
    tool_name: String,
    full_tool_name: String,
    status: String,
    latency_ms: i64,
    request: Option<String>,
    response: Option<String>,
    error: Option<String>,
}

impl TryFrom<UsageRow> for UsageRecord {
    type Error = RepositoryError;

    fn try_from(row: UsageRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            timestamp: row.timestamp,
            client_name: row.client_name,
            server_id: ServerId::new(row.server_id),
            server_name: row.server_name,
            tool_name: row.tool_name,
            full_tool_name: row.full_tool_name,
            status: UsageStatus::from_db(&row.status),
            latency_ms: u64::try_from(row.latency_ms).unwrap_or(0),
            request: decode_json(row.request.as_deref())?,
            response: decode_json(row.response.as_deref())?,
            error: row.error,
        })
    }
}

const SELECT_USAGE: &str = r"
    SELECT id, timestamp, client_name, server_id, server_name, tool_name, full_tool_name,
           status, latency_ms, request, response, error
    FROM tool_usage_logs
";

#[async_trait]
impl UsageLogRepository for SqliteUsageRepository {
    async fn append(&self, record: NewUsageRecord) -> Result<UsageRecord, RepositoryError> {
        let timestamp = Utc::now();
        let latency_ms = i64::try_from(record.latency_ms).unwrap_or(i64::MAX);

        let result = sqlx::query(
            r"
            INSERT INTO tool_usage_logs
                (timestamp, client_name, server_id, server_name, tool_name, full_tool_name,
                 status, latency_ms, request, response, error)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(timestamp)
        .bind(&record.client_name)
        .bind(record.server_id.as_str())
        .bind(&record.server_name)
        .bind(&record.tool_name)
        .bind(&record.full_tool_name)
        .bind(record.status.as_str())
        .bind(latency_ms)
        .bind(encode_json(record.request.as_ref())?)
        .bind(encode_json(record.response.as_ref())?)
        .bind(&record.error)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(UsageRecord {
            id: result.last_insert_rowid(),
            timestamp,
            client_name: record.client_name,
            server_id: record.server_id,
            server_name: record.server_name,
            tool_name: record.tool_name,
            full_tool_name: record.full_tool_name,
            status: record.status,
            latency_ms: record.latency_ms,
            request: record.request,
            response: record.response,
            error: record.error,
        })
    }

    async fn recent(&self, limit: u32) -> Result<Vec<UsageRecord>, RepositoryError> {
        let rows = sqlx::query_as::<_, UsageRow>(&format!(
            "{SELECT_USAGE} ORDER BY timestamp DESC, id DESC LIMIT ?"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(UsageRecord::try_from).collect()
    }

    async fn for_server(
        &self,
        server_id: &ServerId,
        limit: u32,
    ) -> Result<Vec<UsageRecord>, RepositoryError> {
        let rows = sqlx::query_as::<_, UsageRow>(&format!(
            "{SELECT_USAGE} WHERE server_id = ? ORDER BY timestamp DESC, id DESC LIMIT ?"
        ))
        .bind(server_id.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(UsageRecord::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::setup_test_database;
    use serde_json::json;

    fn call(server: &str, tool: &str, status: UsageStatus) -> NewUsageRecord {
        let server_id = ServerId::new(server);
        NewUsageRecord {
            client_name: Some("inspector".into()),
            full_tool_name: anywhere_core::full_tool_name(&server_id, tool),
            server_id,
            server_name: "fetch".into(),
            tool_name: tool.into(),
            status,
            latency_ms: 42,
            request: Some(json!({"url": "https://example.com"})),
            response: None,
            error: (status == UsageStatus::Error).then(|| "timeout".to_string()),
        }
    }

    #[tokio::test]
    async fn append_then_read_newest_first() {
        let repo = SqliteUsageRepository::new(setup_test_database().await.unwrap());

        let first = repo
            .append(call("aaaaaaaa", "fetch", UsageStatus::Success))
            .await
            .unwrap();
        let second = repo
            .append(call("bbbbbbbb", "fetch", UsageStatus::Error))
            .await
            .unwrap();

        let recent = repo.recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, second.id);
        assert_eq!(recent[1].id, first.id);
        assert_eq!(recent[1].request, Some(json!({"url": "https://example.com"})));
        assert_eq!(recent[0].error.as_deref(), Some("timeout"));
        assert_eq!(recent[0].latency_ms, 42);

        assert_eq!(repo.recent(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn filters_by_server_without_foreign_key() {
        let repo = SqliteUsageRepository::new(setup_test_database().await.unwrap());
        repo.append(call("aaaaaaaa", "a", UsageStatus::Success))
            .await
            .unwrap();
        repo.append(call("bbbbbbbb", "b", UsageStatus::Success))
            .await
            .unwrap();

        let only_a = repo
            .for_server(&ServerId::new("aaaaaaaa"), 10)
            .await
            .unwrap();
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0].tool_name, "a");
    }
}
