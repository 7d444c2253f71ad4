//! Persistency module for the groupware sync daemon
//!
//! Collection and entity correlations live in SQLite, accessed through SQLx.

pub mod correlation_repository;
pub mod types;

use anyhow::{Context, Result};
use log::info;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::path::PathBuf;

/// Database manager for correlation state
pub struct PersistencyManager {
    pool: Pool<Sqlite>,
    db_path: PathBuf,
}

impl PersistencyManager {
    /// Create a new persistency manager with database connection pool
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        let db_path = data_dir.join("groupware-sync.db");

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let database_url = format!("sqlite:{}?mode=rwc", db_path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(16)
            .connect(&database_url)
            .await
            .context("Failed to connect to database")?;

        info!(
            "Initialized database connection pool at: {}",
            db_path.display()
        );

        Ok(Self { pool, db_path })
    }

    /// Private in-memory database; a single pinned connection keeps it alive
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;

        Ok(Self {
            pool,
            db_path: PathBuf::from(":memory:"),
        })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    /// Initialize database schema (create tables if they don't exist)
    pub async fn init_database(&self) -> Result<()> {
        info!("Initializing database schema...");

        self.create_collection_correlations_table().await?;
        self.create_entity_correlations_table().await?;

        info!("Database schema initialized successfully");
        Ok(())
    }

    async fn create_collection_correlations_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS collection_correlations (
                affiliation_id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                local_collection_id TEXT NOT NULL,
                remote_collection_id TEXT NOT NULL,
                local_cursor TEXT,
                remote_cursor TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (user_id, entity_type, local_collection_id, remote_collection_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create collection_correlations table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_collection_correlations_user ON collection_correlations(user_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn create_entity_correlations_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entity_correlations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_type TEXT NOT NULL,
                user_id TEXT NOT NULL,
                affiliation_id INTEGER NOT NULL,
                local_entity_id TEXT NOT NULL,
                local_signature TEXT NOT NULL,
                local_collection_id TEXT NOT NULL,
                remote_entity_id TEXT NOT NULL,
                remote_signature TEXT NOT NULL,
                remote_collection_id TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create entity_correlations table")?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_entity_correlations_local ON entity_correlations(user_id, entity_type, local_entity_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_entity_correlations_remote ON entity_correlations(user_id, entity_type, remote_entity_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_entity_correlations_affiliation ON entity_correlations(affiliation_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get the correlation repository
    pub fn correlation_repository(&self) -> correlation_repository::CorrelationRepository {
        correlation_repository::CorrelationRepository::new(self.pool.clone())
    }
}

impl Drop for PersistencyManager {
    fn drop(&mut self) {
        info!("Closing database connection pool");
    }
}
