//! Composition utilities for building repositories with `SQLite` backends.
//!
//! Construction only. No domain logic lives here.

use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;

use anywhere_core::Repos;

use crate::repositories::{SqliteServerRepository, SqliteToolRepository, SqliteUsageRepository};

/// Factory for creating repository instances with `SQLite` backends.
pub struct CoreFactory;

impl CoreFactory {
    /// Open the database file at `db_path`, creating it and its schema if needed.
    pub async fn create_pool(db_path: &Path) -> anyhow::Result<SqlitePool> {
        crate::setup::setup_database(db_path).await
    }

    /// Build all `SQLite` repositories from a pool.
    pub fn build_repos(pool: SqlitePool) -> Repos {
        Repos::new(
            Arc::new(SqliteServerRepository::new(pool.clone())),
            Arc::new(SqliteToolRepository::new(pool.clone())),
            Arc::new(SqliteUsageRepository::new(pool)),
        )
    }
}

/// In-memory database for tests, with the production schema.
#[cfg(any(test, feature = "test-utils"))]
pub struct TestDb {
    pool: SqlitePool,
}

#[cfg(any(test, feature = "test-utils"))]
impl TestDb {
    pub async fn new() -> anyhow::Result<Self> {
        let pool = crate::setup::setup_test_database().await?;
        Ok(Self { pool })
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// All repositories sharing this database.
    pub fn repos(&self) -> Repos {
        CoreFactory::build_repos(self.pool.clone())
    }

    pub fn server_repository(&self) -> SqliteServerRepository {
        SqliteServerRepository::new(self.pool.clone())
    }

    pub fn tool_repository(&self) -> SqliteToolRepository {
        SqliteToolRepository::new(self.pool.clone())
    }

    pub fn usage_repository(&self) -> SqliteUsageRepository {
        SqliteUsageRepository::new(self.pool.clone())
    }
}
