//! Repository implementations using `SQLite`.
//!
//! These implementations encapsulate all SQL queries and database access.
//! The `SqlitePool` is confined to this module and never exposed through
//! the port trait signatures.

mod sqlite_server_repository;
mod sqlite_tool_repository;
mod sqlite_usage_repository;

pub use sqlite_server_repository::SqliteServerRepository;
pub use sqlite_tool_repository::SqliteToolRepository;
pub use sqlite_usage_repository::SqliteUsageRepository;

use anywhere_core::ports::RepositoryError;

/// Map a sqlx error onto the storage-agnostic repository error.
fn map_sqlx_error(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::RowNotFound = e {
        return RepositoryError::NotFound("row not found".to_string());
    }

    let msg = e.to_string();
    if msg.contains("UNIQUE constraint failed") {
        if msg.contains("mcp_servers.name") {
            return RepositoryError::Conflict("server name already exists".to_string());
        }
        return RepositoryError::Conflict(msg);
    }
    RepositoryError::Storage(msg)
}

/// Encode an optional JSON value for a TEXT column.
fn encode_json(value: Option<&serde_json::Value>) -> Result<Option<String>, RepositoryError> {
    value
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| RepositoryError::Serialization(e.to_string()))
}

fn decode_json(text: Option<&str>) -> Result<Option<serde_json::Value>, RepositoryError> {
    text.map(serde_json::from_str)
        .transpose()
        .map_err(|e| RepositoryError::Serialization(e.to_string()))
}
