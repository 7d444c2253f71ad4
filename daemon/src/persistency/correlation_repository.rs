use crate::persistency::types::{CollectionCorrelation, CorrelationScope, EntityCorrelation};
use async_trait::async_trait;
use groupware_sync_lib::{EntityType, Side};
use log::{debug, info};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// A unique index rejected the write
    #[error("correlation conflict: {0}")]
    Conflict(String),

    #[error("correlation not found: {0}")]
    NotFound(String),

    #[error("corrupt correlation row: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                return StoreError::Conflict(db.message().to_string());
            }
        }
        StoreError::Database(e)
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Durable mapping between local and remote identities
#[async_trait]
pub trait CorrelationStore: Send + Sync {
    async fn find_by_local_id(
        &self,
        scope: CorrelationScope<'_>,
        local_entity_id: &str,
    ) -> StoreResult<Option<EntityCorrelation>>;

    async fn find_by_remote_id(
        &self,
        scope: CorrelationScope<'_>,
        remote_entity_id: &str,
    ) -> StoreResult<Option<EntityCorrelation>>;

    async fn find_by_collection_pair(
        &self,
        scope: CorrelationScope<'_>,
        local_collection_id: &str,
        remote_collection_id: &str,
    ) -> StoreResult<Vec<EntityCorrelation>>;

    /// Inserts when `correlation.id` is `None`, updates that row otherwise. Returns the row id.
    async fn upsert(&self, correlation: &EntityCorrelation) -> StoreResult<i64>;

    async fn delete(&self, scope: CorrelationScope<'_>, id: i64) -> StoreResult<bool>;

    async fn delete_by_affiliation_id(&self, affiliation_id: i64) -> StoreResult<u64>;

    async fn create_collection_correlation(
        &self,
        scope: CorrelationScope<'_>,
        local_collection_id: &str,
        remote_collection_id: &str,
    ) -> StoreResult<CollectionCorrelation>;

    async fn find_collection_correlation(
        &self,
        scope: CorrelationScope<'_>,
        local_collection_id: &str,
        remote_collection_id: &str,
    ) -> StoreResult<Option<CollectionCorrelation>>;

    async fn collection_correlations_for_user(
        &self,
        user_id: &str,
    ) -> StoreResult<Vec<CollectionCorrelation>>;

    /// Removes the collection correlation and every entity correlation sharing its
    /// affiliation in one transaction. Returns the number of entity correlations removed.
    async fn delete_collection_correlation(&self, affiliation_id: i64) -> StoreResult<u64>;

    async fn store_cursor(&self, affiliation_id: i64, side: Side, cursor: &str) -> StoreResult<()>;

    async fn find_by_entity_id(
        &self,
        scope: CorrelationScope<'_>,
        side: Side,
        entity_id: &str,
    ) -> StoreResult<Option<EntityCorrelation>> {
        match side {
            Side::Local => self.find_by_local_id(scope, entity_id).await,
            Side::Remote => self.find_by_remote_id(scope, entity_id).await,
        }
    }

    async fn store_local_cursor(&self, affiliation_id: i64, cursor: &str) -> StoreResult<()> {
        self.store_cursor(affiliation_id, Side::Local, cursor).await
    }

    async fn store_remote_cursor(&self, affiliation_id: i64, cursor: &str) -> StoreResult<()> {
        self.store_cursor(affiliation_id, Side::Remote, cursor).await
    }
}

/// SQLite-backed correlation store
#[derive(Clone)]
pub struct CorrelationRepository {
    pool: Pool<Sqlite>,
}

impl CorrelationRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    async fn find_entity(
        &self,
        scope: CorrelationScope<'_>,
        column_query: &str,
        entity_id: &str,
    ) -> StoreResult<Option<EntityCorrelation>> {
        let row = sqlx::query(column_query)
            .bind(scope.user_id)
            .bind(scope.entity_type.as_str())
            .bind(entity_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(entity_from_row).transpose()
    }
}

#[async_trait]
impl CorrelationStore for CorrelationRepository {
    async fn find_by_local_id(
        &self,
        scope: CorrelationScope<'_>,
        local_entity_id: &str,
    ) -> StoreResult<Option<EntityCorrelation>> {
        self.find_entity(
            scope,
            r#"
            SELECT * FROM entity_correlations
            WHERE user_id = ? AND entity_type = ? AND local_entity_id = ?
            "#,
            local_entity_id,
        )
        .await
    }

    async fn find_by_remote_id(
        &self,
        scope: CorrelationScope<'_>,
        remote_entity_id: &str,
    ) -> StoreResult<Option<EntityCorrelation>> {
        self.find_entity(
            scope,
            r#"
            SELECT * FROM entity_correlations
            WHERE user_id = ? AND entity_type = ? AND remote_entity_id = ?
            "#,
            remote_entity_id,
        )
        .await
    }

    async fn find_by_collection_pair(
        &self,
        scope: CorrelationScope<'_>,
        local_collection_id: &str,
        remote_collection_id: &str,
    ) -> StoreResult<Vec<EntityCorrelation>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM entity_correlations
            WHERE user_id = ? AND entity_type = ?
              AND local_collection_id = ? AND remote_collection_id = ?
            ORDER BY id
            "#,
        )
        .bind(scope.user_id)
        .bind(scope.entity_type.as_str())
        .bind(local_collection_id)
        .bind(remote_collection_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entity_from_row).collect()
    }

    async fn upsert(&self, correlation: &EntityCorrelation) -> StoreResult<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO entity_correlations (
                id, entity_type, user_id, affiliation_id,
                local_entity_id, local_signature, local_collection_id,
                remote_entity_id, remote_signature, remote_collection_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                affiliation_id = excluded.affiliation_id,
                local_entity_id = excluded.local_entity_id,
                local_signature = excluded.local_signature,
                local_collection_id = excluded.local_collection_id,
                remote_entity_id = excluded.remote_entity_id,
                remote_signature = excluded.remote_signature,
                remote_collection_id = excluded.remote_collection_id,
                updated_at = CURRENT_TIMESTAMP
            RETURNING id
            "#,
        )
        .bind(correlation.id)
        .bind(correlation.entity_type.as_str())
        .bind(&correlation.user_id)
        .bind(correlation.affiliation_id)
        .bind(&correlation.local_entity_id)
        .bind(&correlation.local_signature)
        .bind(&correlation.local_collection_id)
        .bind(&correlation.remote_entity_id)
        .bind(&correlation.remote_signature)
        .bind(&correlation.remote_collection_id)
        .fetch_one(&self.pool)
        .await?;

        let id: i64 = row.try_get("id")?;
        debug!(
            "Stored correlation {} ({} <-> {})",
            id, correlation.local_entity_id, correlation.remote_entity_id
        );
        Ok(id)
    }

    async fn delete(&self, scope: CorrelationScope<'_>, id: i64) -> StoreResult<bool> {
        let result = sqlx::query(
            "DELETE FROM entity_correlations WHERE id = ? AND user_id = ? AND entity_type = ?",
        )
        .bind(id)
        .bind(scope.user_id)
        .bind(scope.entity_type.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_affiliation_id(&self, affiliation_id: i64) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM entity_correlations WHERE affiliation_id = ?")
            .bind(affiliation_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn create_collection_correlation(
        &self,
        scope: CorrelationScope<'_>,
        local_collection_id: &str,
        remote_collection_id: &str,
    ) -> StoreResult<CollectionCorrelation> {
        let row = sqlx::query(
            r#"
            INSERT INTO collection_correlations (user_id, entity_type, local_collection_id, remote_collection_id)
            VALUES (?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(scope.user_id)
        .bind(scope.entity_type.as_str())
        .bind(local_collection_id)
        .bind(remote_collection_id)
        .fetch_one(&self.pool)
        .await?;

        let collection = collection_from_row(&row)?;
        info!(
            "🔗 Paired {} collections {} <-> {} for {} (affiliation {})",
            scope.entity_type,
            local_collection_id,
            remote_collection_id,
            scope.user_id,
            collection.affiliation_id
        );
        Ok(collection)
    }

    async fn find_collection_correlation(
        &self,
        scope: CorrelationScope<'_>,
        local_collection_id: &str,
        remote_collection_id: &str,
    ) -> StoreResult<Option<CollectionCorrelation>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM collection_correlations
            WHERE user_id = ? AND entity_type = ?
              AND local_collection_id = ? AND remote_collection_id = ?
            "#,
        )
        .bind(scope.user_id)
        .bind(scope.entity_type.as_str())
        .bind(local_collection_id)
        .bind(remote_collection_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(collection_from_row).transpose()
    }

    async fn collection_correlations_for_user(
        &self,
        user_id: &str,
    ) -> StoreResult<Vec<CollectionCorrelation>> {
        let rows = sqlx::query(
            "SELECT * FROM collection_correlations WHERE user_id = ? ORDER BY affiliation_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(collection_from_row).collect()
    }

    async fn delete_collection_correlation(&self, affiliation_id: i64) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM entity_correlations WHERE affiliation_id = ?")
            .bind(affiliation_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM collection_correlations WHERE affiliation_id = ?")
            .bind(affiliation_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            "🗑️ Removed collection correlation {} with {} entity correlations",
            affiliation_id, removed
        );
        Ok(removed)
    }

    async fn store_cursor(&self, affiliation_id: i64, side: Side, cursor: &str) -> StoreResult<()> {
        let query = match side {
            Side::Local => {
                "UPDATE collection_correlations SET local_cursor = ?, updated_at = CURRENT_TIMESTAMP WHERE affiliation_id = ?"
            }
            Side::Remote => {
                "UPDATE collection_correlations SET remote_cursor = ?, updated_at = CURRENT_TIMESTAMP WHERE affiliation_id = ?"
            }
        };

        let result = sqlx::query(query)
            .bind(cursor)
            .bind(affiliation_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "collection correlation {}",
                affiliation_id
            )));
        }

        debug!("Stored {} cursor {} for affiliation {}", side, cursor, affiliation_id);
        Ok(())
    }
}

fn parse_entity_type(row: &SqliteRow) -> StoreResult<EntityType> {
    let raw: String = row.try_get("entity_type")?;
    raw.parse()
        .map_err(|_| StoreError::Corrupt(format!("unknown entity type {}", raw)))
}

fn entity_from_row(row: &SqliteRow) -> StoreResult<EntityCorrelation> {
    Ok(EntityCorrelation {
        id: Some(row.try_get("id")?),
        entity_type: parse_entity_type(row)?,
        user_id: row.try_get("user_id")?,
        affiliation_id: row.try_get("affiliation_id")?,
        local_entity_id: row.try_get("local_entity_id")?,
        local_signature: row.try_get("local_signature")?,
        local_collection_id: row.try_get("local_collection_id")?,
        remote_entity_id: row.try_get("remote_entity_id")?,
        remote_signature: row.try_get("remote_signature")?,
        remote_collection_id: row.try_get("remote_collection_id")?,
    })
}

fn collection_from_row(row: &SqliteRow) -> StoreResult<CollectionCorrelation> {
    Ok(CollectionCorrelation {
        affiliation_id: row.try_get("affiliation_id")?,
        user_id: row.try_get("user_id")?,
        entity_type: parse_entity_type(row)?,
        local_collection_id: row.try_get("local_collection_id")?,
        remote_collection_id: row.try_get("remote_collection_id")?,
        local_cursor: row.try_get("local_cursor")?,
        remote_cursor: row.try_get("remote_cursor")?,
    })
}
