//! SeaORM-backed storage adapters that satisfy the domain storage traits while
//! keeping the database backend swappable (SQLite by default, PostgreSQL via
//! feature flag).

mod builder;
mod download_store;
mod entity;
mod migration;
mod payment_store;
mod settings_store;
mod user_store;

use std::sync::Arc;

use builder::StorageBuilder;
use clipgate_domain::storage::{StorageError, StorageResult};
use migration::run_migrations;
use sea_orm::DatabaseConnection;

/// Shared storage handle used by every HTTP worker.
#[derive(Clone)]
pub struct SeaOrmStorage {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmStorage {
    /// Connects to the provided database URL and ensures the schema is present.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::builder().database_url(database_url).build().await
    }

    pub fn builder() -> StorageBuilder {
        StorageBuilder::new()
    }

    pub(crate) async fn from_connection(db: DatabaseConnection) -> StorageResult<Self> {
        run_migrations(&db).await?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn connection(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }
}

/// Maps driver errors, surfacing unique-key violations as `Conflict`.
pub(crate) fn map_db_err(err: sea_orm::DbErr) -> StorageError {
    match err.sql_err() {
        Some(sea_orm::SqlErr::UniqueConstraintViolation(detail)) => StorageError::Conflict(detail),
        _ => StorageError::from_source(err),
    }
}

#[cfg(test)]
pub(crate) async fn memory_storage() -> SeaOrmStorage {
    SeaOrmStorage::connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite")
}
