//! `SQLite` implementation of the server repository.
//!
//! Environment variables and secret mounts live in child tables. Env values
//! are base64-encoded (encoding, not encryption).

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};

use anywhere_core::domain::{
    BuildStatus, EnvVarDecl, NewServer, RuntimeKind, SecretFileMount, ServerConfig, ServerId,
};
use anywhere_core::ports::{RepositoryError, ServerRepository};

use super::map_sqlx_error;

/// Attempts at drawing an unused random id before giving up.
const ID_ATTEMPTS: usize = 4;

/// `SQLite` implementation of the server repository.
pub struct SqliteServerRepository {
    pool: SqlitePool,
}

impl SqliteServerRepository {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal row types for database queries
// ─────────────────────────────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct ServerRow {
    id: String,
    name: String,
    description: Option<String>,
    source: String,
    runtime_kind: String,
    install_command: Option<String>,
    start_command: String,
    is_active: bool,
    build_status: String,
    build_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct EnvRow {
    key: String,
    value: String,
    required: bool,
}

#[derive(sqlx::FromRow)]
struct SecretRow {
    env_var: String,
    file_name: String,
    host_path: String,
}

const SELECT_SERVER: &str = r"
    SELECT id, name, description, source, runtime_kind, install_command, start_command,
           is_active, build_status, build_error, created_at, updated_at
    FROM mcp_servers
";

// ─────────────────────────────────────────────────────────────────────────────
// Helper functions
// ─────────────────────────────────────────────────────────────────────────────

fn decode_env_value(encoded: &str) -> Result<String, RepositoryError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| RepositoryError::Serialization(format!("Failed to decode env var: {e}")))?;

    String::from_utf8(bytes)
        .map_err(|e| RepositoryError::Serialization(format!("Invalid UTF-8 in env var: {e}")))
}

fn encode_env_value(value: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}

fn row_to_server(
    row: ServerRow,
    env_variables: Vec<EnvVarDecl>,
    secret_files: Vec<SecretFileMount>,
) -> Result<ServerConfig, RepositoryError> {
    let runtime_kind = row
        .runtime_kind
        .parse::<RuntimeKind>()
        .map_err(RepositoryError::Serialization)?;

    Ok(ServerConfig {
        id: ServerId::new(row.id),
        name: row.name,
        description: row.description,
        source: row.source,
        runtime_kind,
        install_command: row.install_command,
        start_command: row.start_command,
        env_variables,
        secret_files,
        is_active: row.is_active,
        build_status: BuildStatus::from_db(&row.build_status),
        build_error: row.build_error,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

/// Replace env and secret rows of a server inside `tx`.
async fn write_children(
    tx: &mut Transaction<'_, Sqlite>,
    server_id: &ServerId,
    env_variables: &[EnvVarDecl],
    secret_files: &[SecretFileMount],
) -> Result<(), RepositoryError> {
    sqlx::query("DELETE FROM mcp_server_env WHERE server_id = ?")
        .bind(server_id.as_str())
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;
    sqlx::query("DELETE FROM mcp_server_secret_files WHERE server_id = ?")
        .bind(server_id.as_str())
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

    for (position, var) in (0_i64..).zip(env_variables) {
        sqlx::query(
            "INSERT INTO mcp_server_env (server_id, position, key, value, required) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(server_id.as_str())
        .bind(position)
        .bind(&var.key)
        .bind(encode_env_value(&var.value))
        .bind(var.required)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;
    }

    for (position, mount) in (0_i64..).zip(secret_files) {
        sqlx::query(
            "INSERT INTO mcp_server_secret_files (server_id, position, env_var, file_name, host_path) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(server_id.as_str())
        .bind(position)
        .bind(&mount.env_var)
        .bind(&mount.file_name)
        .bind(&mount.host_path)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;
    }

    Ok(())
}

fn is_primary_key_clash(e: &sqlx::Error) -> bool {
    e.to_string().contains("UNIQUE constraint failed: mcp_servers.id")
}

// ─────────────────────────────────────────────────────────────────────────────
// Repository implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl ServerRepository for SqliteServerRepository {
    async fn insert(&self, server: NewServer) -> Result<ServerConfig, RepositoryError> {
        let config = server.into_config(ServerId::generate(), Utc::now());

        for attempt in 1..=ID_ATTEMPTS {
            let id = if attempt == 1 {
                config.id.clone()
            } else {
                ServerId::generate()
            };

            let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
            let inserted = sqlx::query(
                r"
                INSERT INTO mcp_servers (id, name, description, source, runtime_kind, install_command,
                                         start_command, is_active, build_status, build_error,
                                         created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(id.as_str())
            .bind(&config.name)
            .bind(&config.description)
            .bind(&config.source)
            .bind(config.runtime_kind.as_str())
            .bind(&config.install_command)
            .bind(&config.start_command)
            .bind(config.is_active)
            .bind(config.build_status.as_str())
            .bind(&config.build_error)
            .bind(config.created_at)
            .bind(config.updated_at)
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(_) => {}
                Err(e) if is_primary_key_clash(&e) => {
                    tracing::debug!(server_id = %id, attempt, "Server id already taken, retrying");
                    continue;
                }
                Err(e) => return Err(map_sqlx_error(e)),
            }

            write_children(&mut tx, &id, &config.env_variables, &config.secret_files).await?;
            tx.commit().await.map_err(map_sqlx_error)?;

            return self.get_by_id(&id).await;
        }

        Err(RepositoryError::Storage(
            "could not allocate a unique server id".to_string(),
        ))
    }

    async fn get_by_id(&self, id: &ServerId) -> Result<ServerConfig, RepositoryError> {
        let row = sqlx::query_as::<_, ServerRow>(&format!("{SELECT_SERVER} WHERE id = ?"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .ok_or_else(|| RepositoryError::NotFound(format!("server {id}")))?;

        self.hydrate(row).await
    }

    async fn get_by_name(&self, name: &str) -> Result<ServerConfig, RepositoryError> {
        let row = sqlx::query_as::<_, ServerRow>(&format!("{SELECT_SERVER} WHERE name = ?"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .ok_or_else(|| RepositoryError::NotFound(format!("server {name}")))?;

        self.hydrate(row).await
    }

    async fn list(&self) -> Result<Vec<ServerConfig>, RepositoryError> {
        let rows = sqlx::query_as::<_, ServerRow>(&format!("{SELECT_SERVER} ORDER BY name"))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let mut servers = Vec::with_capacity(rows.len());
        for row in rows {
            servers.push(self.hydrate(row).await?);
        }
        Ok(servers)
    }

    async fn list_active(&self) -> Result<Vec<ServerConfig>, RepositoryError> {
        let rows = sqlx::query_as::<_, ServerRow>(&format!(
            "{SELECT_SERVER} WHERE is_active = 1 ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let mut servers = Vec::with_capacity(rows.len());
        for row in rows {
            servers.push(self.hydrate(row).await?);
        }
        Ok(servers)
    }

    async fn update(&self, server: &ServerConfig) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let result = sqlx::query(
            r"
            UPDATE mcp_servers
            SET name = ?, description = ?, source = ?, runtime_kind = ?, install_command = ?,
                start_command = ?, is_active = ?, build_status = ?, build_error = ?, updated_at = ?
            WHERE id = ?
            ",
        )
        .bind(&server.name)
        .bind(&server.description)
        .bind(&server.source)
        .bind(server.runtime_kind.as_str())
        .bind(&server.install_command)
        .bind(&server.start_command)
        .bind(server.is_active)
        .bind(server.build_status.as_str())
        .bind(&server.build_error)
        .bind(Utc::now())
        .bind(server.id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("server {}", server.id)));
        }

        write_children(&mut tx, &server.id, &server.env_variables, &server.secret_files).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn set_active(&self, id: &ServerId, active: bool) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE mcp_servers SET is_active = ?, updated_at = ? WHERE id = ?")
                .bind(active)
                .bind(Utc::now())
                .bind(id.as_str())
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("server {id}")));
        }
        Ok(())
    }

    async fn set_build_status(
        &self,
        id: &ServerId,
        status: BuildStatus,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE mcp_servers SET build_status = ?, build_error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(error)
        .bind(Utc::now())
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("server {id}")));
        }
        Ok(())
    }

    async fn delete(&self, id: &ServerId) -> Result<(), RepositoryError> {
        // Env, secrets and tools go with it via ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM mcp_servers WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("server {id}")));
        }
        Ok(())
    }
}

impl SqliteServerRepository {
    /// Attach env and secret rows to a server row.
    async fn hydrate(&self, row: ServerRow) -> Result<ServerConfig, RepositoryError> {
        let env_rows = sqlx::query_as::<_, EnvRow>(
            "SELECT key, value, required FROM mcp_server_env WHERE server_id = ? ORDER BY position",
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let mut env_variables = Vec::with_capacity(env_rows.len());
        for env in env_rows {
            env_variables.push(EnvVarDecl {
                key: env.key,
                value: decode_env_value(&env.value)?,
                required: env.required,
            });
        }

        let secret_files = sqlx::query_as::<_, SecretRow>(
            "SELECT env_var, file_name, host_path FROM mcp_server_secret_files WHERE server_id = ? ORDER BY position",
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .into_iter()
        .map(|s| SecretFileMount::new(s.env_var, s.file_name, s.host_path))
        .collect();

        row_to_server(row, env_variables, secret_files)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
