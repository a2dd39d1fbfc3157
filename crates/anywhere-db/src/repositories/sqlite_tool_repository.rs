//! `SQLite` implementation of the tool repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};

use anywhere_core::domain::{DiscoveredTool, ReconcileOutcome, ServerId, ToolRecord, full_tool_name};
use anywhere_core::ports::{RepositoryError, ToolRepository};
use anywhere_core::tool_sync::{plan_reconcile, plan_refresh};

use super::{decode_json, encode_json, map_sqlx_error};

/// `SQLite` implementation of the tool repository.
pub struct SqliteToolRepository {
    pool: SqlitePool,
}

impl SqliteToolRepository {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ToolRow {
    id: i64,
    server_id: String,
    tool_name: String,
    full_tool_name: String,
    description: String,
    schema: Option<String>,
    is_enabled: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<ToolRow> for ToolRecord {
    type Error = RepositoryError;

    fn try_from(row: ToolRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            server_id: ServerId::new(row.server_id),
            tool_name: row.tool_name,
            full_tool_name: row.full_tool_name,
            description: row.description,
            schema: decode_json(row.schema.as_deref())?,
            is_enabled: row.is_enabled,
            created_at: row.created_at,
        })
    }
}

const SELECT_TOOL: &str = r"
    SELECT t.id, t.server_id, t.tool_name, t.full_tool_name, t.description, t.schema,
           t.is_enabled, t.created_at
    FROM mcp_server_tools t
";

fn rows_to_records(rows: Vec<ToolRow>) -> Result<Vec<ToolRecord>, RepositoryError> {
    rows.into_iter().map(ToolRecord::try_from).collect()
}

async fn ensure_server(
    tx: &mut Transaction<'_, Sqlite>,
    server_id: &ServerId,
) -> Result<(), RepositoryError> {
    let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM mcp_servers WHERE id = ?")
        .bind(server_id.as_str())
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

    exists
        .map(|_| ())
        .ok_or_else(|| RepositoryError::NotFound(format!("server {server_id}")))
}

async fn load_for_server(
    tx: &mut Transaction<'_, Sqlite>,
    server_id: &ServerId,
) -> Result<Vec<ToolRecord>, RepositoryError> {
    let rows = sqlx::query_as::<_, ToolRow>(&format!(
        "{SELECT_TOOL} WHERE t.server_id = ? ORDER BY t.tool_name"
    ))
    .bind(server_id.as_str())
    .fetch_all(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;

    rows_to_records(rows)
}

#[async_trait]
impl ToolRepository for SqliteToolRepository {
    async fn list_for_server(
        &self,
        server_id: &ServerId,
    ) -> Result<Vec<ToolRecord>, RepositoryError> {
        let rows = sqlx::query_as::<_, ToolRow>(&format!(
            "{SELECT_TOOL} WHERE t.server_id = ? ORDER BY t.tool_name"
        ))
        .bind(server_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows_to_records(rows)
    }

    async fn list_enabled(&self) -> Result<Vec<ToolRecord>, RepositoryError> {
        let rows = sqlx::query_as::<_, ToolRow>(&format!(
            "{SELECT_TOOL} JOIN mcp_servers s ON s.id = t.server_id \
             WHERE t.is_enabled = 1 AND s.is_active = 1 ORDER BY t.full_tool_name"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows_to_records(rows)
    }

    async fn reconcile(
        &self,
        server_id: &ServerId,
        discovered: &[DiscoveredTool],
    ) -> Result<ReconcileOutcome, RepositoryError> {
        // Dropping `tx` on any early return rolls the whole pass back
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        ensure_server(&mut tx, server_id).await?;

        let existing: Vec<(String,)> =
            sqlx::query_as("SELECT tool_name FROM mcp_server_tools WHERE server_id = ?")
                .bind(server_id.as_str())
                .fetch_all(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;

        let plan = plan_reconcile(existing.iter().map(|(name,)| name.as_str()), discovered);
        if plan.is_empty() {
            tx.commit().await.map_err(map_sqlx_error)?;
            return Ok(ReconcileOutcome::default());
        }

        for name in &plan.to_remove {
            sqlx::query("DELETE FROM mcp_server_tools WHERE server_id = ? AND tool_name = ?")
                .bind(server_id.as_str())
                .bind(name)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }

        let now = Utc::now();
        for tool in &plan.to_add {
            sqlx::query(
                r"
                INSERT INTO mcp_server_tools
                    (server_id, tool_name, full_tool_name, description, schema, is_enabled, created_at)
                VALUES (?, ?, ?, ?, ?, 1, ?)
                ",
            )
            .bind(server_id.as_str())
            .bind(&tool.name)
            .bind(full_tool_name(server_id, &tool.name))
            .bind(&tool.description)
            .bind(encode_json(tool.schema.as_ref())?)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        let outcome = ReconcileOutcome {
            added: plan.to_add.len(),
            removed: plan.to_remove.len(),
        };
        tracing::debug!(
            server_id = %server_id,
            added = outcome.added,
            removed = outcome.removed,
            "Applied tool reconcile plan"
        );
        Ok(outcome)
    }

    async fn refresh_metadata(
        &self,
        server_id: &ServerId,
        discovered: &[DiscoveredTool],
    ) -> Result<usize, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        ensure_server(&mut tx, server_id).await?;

        let existing = load_for_server(&mut tx, server_id).await?;
        let updates = plan_refresh(&existing, discovered);

        for update in &updates {
            sqlx::query(
                "UPDATE mcp_server_tools SET description = ?, schema = ? WHERE server_id = ? AND tool_name = ?",
            )
            .bind(&update.description)
            .bind(encode_json(update.schema.as_ref())?)
            .bind(server_id.as_str())
            .bind(&update.tool_name)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(updates.len())
    }

    async fn set_enabled(
        &self,
        server_id: &ServerId,
        tool_name: &str,
        enabled: bool,
    ) -> Result<ToolRecord, RepositoryError> {
        let result = sqlx::query(
            "UPDATE mcp_server_tools SET is_enabled = ? WHERE server_id = ? AND tool_name = ?",
        )
        .bind(enabled)
        .bind(server_id.as_str())
        .bind(tool_name)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!(
                "tool {tool_name} on server {server_id}"
            )));
        }

        self.get_by_full_name(&full_tool_name(server_id, tool_name))
            .await
    }

    async fn get_by_full_name(&self, full_tool_name: &str) -> Result<ToolRecord, RepositoryError> {
        let row = sqlx::query_as::<_, ToolRow>(&format!("{SELECT_TOOL} WHERE t.full_tool_name = ?"))
            .bind(full_tool_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .ok_or_else(|| RepositoryError::NotFound(format!("tool {full_tool_name}")))?;

        row.try_into()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::setup_test_database;
    use serde_json::json;

    async fn insert_server(pool: &SqlitePool, id: &str) -> ServerId {
        sqlx::query(
            r"
            INSERT INTO mcp_servers (id, name, source, runtime_kind, start_command, created_at, updated_at)
            VALUES (?, ?, 'pkg', 'npx', 'npx pkg', ?, ?)
            ",
        )
        .bind(id)
        .bind(format!("server-{id}"))
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(pool)
        .await
        .unwrap();
        ServerId::new(id)
    }

    async fn setup() -> (SqlitePool, SqliteToolRepository) {
        let pool = setup_test_database().await.unwrap();
        (pool.clone(), SqliteToolRepository::new(pool))
    }

    fn tool(name: &str) -> DiscoveredTool {
        DiscoveredTool::new(name)
    }

    #[tokio::test]
    async fn reconcile_adds_keeps_and_removes() {
        let (pool, repo) = setup().await;
        let id = insert_server(&pool, "0a1b2c3d").await;

        let outcome = repo.reconcile(&id, &[tool("a")]).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome { added: 1, removed: 0 });

        let outcome = repo.reconcile(&id, &[tool("a")]).await.unwrap();
        assert!(outcome.is_noop());

        let outcome = repo.reconcile(&id, &[]).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome { added: 0, removed: 1 });
        assert!(repo.list_for_server(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn new_tools_are_enabled_with_prefixed_names() {
        let (pool, repo) = setup().await;
        let id = insert_server(&pool, "0a1b2c3d").await;

        repo.reconcile(
            &id,
            &[tool("search")
                .with_description("Search the web")
                .with_schema(json!({"type": "object"}))],
        )
        .await
        .unwrap();

        let tools = repo.list_for_server(&id).await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].full_tool_name, "0a1b2c3d_search");
        assert_eq!(tools[0].description, "Search the web");
        assert_eq!(tools[0].schema, Some(json!({"type": "object"})));
        assert!(tools[0].is_enabled);
    }

    #[tokio::test]
    async fn reconcile_keeps_operator_toggle() {
        let (pool, repo) = setup().await;
        let id = insert_server(&pool, "0a1b2c3d").await;

        repo.reconcile(&id, &[tool("a"), tool("b")]).await.unwrap();
        let disabled = repo.set_enabled(&id, "a", false).await.unwrap();
        assert!(!disabled.is_enabled);

        let outcome = repo.reconcile(&id, &[tool("a"), tool("c")]).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome { added: 1, removed: 1 });

        let a = repo.get_by_full_name("0a1b2c3d_a").await.unwrap();
        assert!(!a.is_enabled);
    }

    #[tokio::test]
    async fn failed_reconcile_rolls_back_everything() {
        let (pool, repo) = setup().await;
        // "x" + "y_z" and "x_y" + "z" share the full name "x_y_z"
        let x = insert_server(&pool, "x").await;
        let xy = insert_server(&pool, "x_y").await;

        repo.reconcile(&xy, &[tool("z")]).await.unwrap();
        repo.reconcile(&x, &[tool("old")]).await.unwrap();

        let err = repo
            .reconcile(&x, &[tool("fresh"), tool("y_z")])
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        let names: Vec<String> = repo
            .list_for_server(&x)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.tool_name)
            .collect();
        assert_eq!(names, ["old"]);
    }

    #[tokio::test]
    async fn reconcile_unknown_server_is_not_found() {
        let (_pool, repo) = setup().await;
        let err = repo
            .reconcile(&ServerId::new("ffffffff"), &[tool("a")])
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn refresh_updates_metadata_only() {
        let (pool, repo) = setup().await;
        let id = insert_server(&pool, "0a1b2c3d").await;
        repo.reconcile(&id, &[tool("a").with_description("old")])
            .await
            .unwrap();
        repo.set_enabled(&id, "a", false).await.unwrap();

        let changed = repo
            .refresh_metadata(&id, &[tool("a").with_description("new"), tool("b")])
            .await
            .unwrap();
        assert_eq!(changed, 1);

        let tools = repo.list_for_server(&id).await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].description, "new");
        assert!(!tools[0].is_enabled);
    }

    #[tokio::test]
    async fn enabled_listing_skips_inactive_servers() {
        let (pool, repo) = setup().await;
        let on = insert_server(&pool, "aaaaaaaa").await;
        let off = insert_server(&pool, "bbbbbbbb").await;
        repo.reconcile(&on, &[tool("a"), tool("b")]).await.unwrap();
        repo.reconcile(&off, &[tool("a")]).await.unwrap();
        repo.set_enabled(&on, "b", false).await.unwrap();
        sqlx::query("UPDATE mcp_servers SET is_active = 0 WHERE id = ?")
            .bind(off.as_str())
            .execute(&pool)
            .await
            .unwrap();

        let enabled = repo.list_enabled().await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].full_tool_name, "aaaaaaaa_a");
    }

    #[tokio::test]
    async fn deleting_server_cascades_to_tools() {
        let (pool, repo) = setup().await;
        let id = insert_server(&pool, "0a1b2c3d").await;
        repo.reconcile(&id, &[tool("a")]).await.unwrap();

        sqlx::query("DELETE FROM mcp_servers WHERE id = ?")
            .bind(id.as_str())
            .execute(&pool)
            .await
            .unwrap();
        assert!(matches!(
            repo.get_by_full_name("0a1b2c3d_a").await,
            Err(RepositoryError::NotFound(_))
        ));
    }
}
