//! Database setup and initialization.
//!
//! Entry points call `setup_database()` with the resolved database path.

use anyhow::Result;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

/// Open (creating if needed) the database at `db_path` and ensure the schema.
///
/// # Example
///
/// ```rust,no_run
/// use anywhere_db::setup_database;
/// use std::path::Path;
///
/// # async fn example() -> anyhow::Result<()> {
/// let pool = setup_database(Path::new("/var/lib/mcp-anywhere/mcp-anywhere.db")).await?;
/// # Ok(())
/// # }
/// ```
pub async fn setup_database(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(db_path)
                .create_if_missing(true)
                .foreign_keys(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_secs(5)),
        )
        .await?;

    create_schema(&pool).await?;
    tracing::debug!(path = %db_path.display(), "Database ready");

    Ok(pool)
}

/// In-memory database with the full production schema.
///
/// The pool holds exactly one connection that never expires, because every
/// `SQLite` in-memory connection is a separate database.
#[cfg(any(test, feature = "test-utils"))]
pub async fn setup_test_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(
            SqliteConnectOptions::new()
                .in_memory(true)
                .foreign_keys(true),
        )
        .await?;
    create_schema(&pool).await?;
    Ok(pool)
}

/// Create all tables and indexes. Safe to call repeatedly.
async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS mcp_servers (
            id TEXT PRIMARY KEY NOT NULL,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            source TEXT NOT NULL,
            runtime_kind TEXT NOT NULL CHECK (runtime_kind IN ('npx', 'uvx', 'docker')),
            install_command TEXT,
            start_command TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            build_status TEXT NOT NULL DEFAULT 'pending'
                CHECK (build_status IN ('pending', 'building', 'built', 'failed')),
            build_error TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS mcp_server_env (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            server_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            required INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (server_id) REFERENCES mcp_servers(id) ON DELETE CASCADE,
            UNIQUE(server_id, key)
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS mcp_server_secret_files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            server_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            env_var TEXT NOT NULL,
            file_name TEXT NOT NULL,
            host_path TEXT NOT NULL,
            FOREIGN KEY (server_id) REFERENCES mcp_servers(id) ON DELETE CASCADE,
            UNIQUE(server_id, env_var),
            UNIQUE(server_id, file_name)
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS mcp_server_tools (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            server_id TEXT NOT NULL,
            tool_name TEXT NOT NULL,
            full_tool_name TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL DEFAULT '',
            schema TEXT,
            is_enabled INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            FOREIGN KEY (server_id) REFERENCES mcp_servers(id) ON DELETE CASCADE,
            UNIQUE(server_id, tool_name)
        )
        ",
    )
    .execute(pool)
    .await?;

    // Usage logs outlive the server they reference.
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS tool_usage_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            client_name TEXT,
            server_id TEXT NOT NULL,
            server_name TEXT NOT NULL,
            tool_name TEXT NOT NULL,
            full_tool_name TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('success', 'error')),
            latency_ms INTEGER NOT NULL,
            request TEXT,
            response TEXT,
            error TEXT
        )
        ",
    )
    .execute(pool)
    .await?;

    for index in [
        "CREATE INDEX IF NOT EXISTS idx_env_server ON mcp_server_env(server_id)",
        "CREATE INDEX IF NOT EXISTS idx_secret_files_server ON mcp_server_secret_files(server_id)",
        "CREATE INDEX IF NOT EXISTS idx_tools_server ON mcp_server_tools(server_id)",
        "CREATE INDEX IF NOT EXISTS idx_usage_timestamp ON tool_usage_logs(timestamp)",
        "CREATE INDEX IF NOT EXISTS idx_usage_server ON tool_usage_logs(server_id)",
    ] {
        sqlx::query(index).execute(pool).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_has_all_tables() {
        let pool = setup_test_database().await.unwrap();

        for table in [
            "mcp_servers",
            "mcp_server_env",
            "mcp_server_secret_files",
            "mcp_server_tools",
            "tool_usage_logs",
        ] {
            let _: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(&pool)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn schema_creation_is_repeatable() {
        let pool = setup_test_database().await.unwrap();
        create_schema(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn file_database_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/gw.db");
        let pool = setup_database(&path).await.unwrap();
        pool.close().await;
        assert!(path.exists());
    }
}
