#![allow(dead_code)]
use async_trait::async_trait;
use groupware_sync_daemon::persistency::correlation_repository::{
    CorrelationRepository, CorrelationStore, StoreError, StoreResult,
};
use groupware_sync_daemon::persistency::types::{CollectionCorrelation, CorrelationScope, EntityCorrelation};
use groupware_sync_lib::Side;
use std::sync::atomic::{AtomicBool, Ordering};

/// Correlation store whose cursor writes can be switched to fail
pub struct CursorFailingStore {
    inner: CorrelationRepository,
    fail_cursor_writes: AtomicBool,
}

impl CursorFailingStore {
    pub fn new(inner: CorrelationRepository) -> Self {
        Self {
            inner,
            fail_cursor_writes: AtomicBool::new(true),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_cursor_writes.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl CorrelationStore for CursorFailingStore {
    async fn find_by_local_id(
        &self,
        scope: CorrelationScope<'_>,
        local_entity_id: &str,
    ) -> StoreResult<Option<EntityCorrelation>> {
        self.inner.find_by_local_id(scope, local_entity_id).await
    }

    async fn find_by_remote_id(
        &self,
        scope: CorrelationScope<'_>,
        remote_entity_id: &str,
    ) -> StoreResult<Option<EntityCorrelation>> {
        self.inner.find_by_remote_id(scope, remote_entity_id).await
    }

    async fn find_by_collection_pair(
        &self,
        scope: CorrelationScope<'_>,
        local_collection_id: &str,
        remote_collection_id: &str,
    ) -> StoreResult<Vec<EntityCorrelation>> {
        self.inner
            .find_by_collection_pair(scope, local_collection_id, remote_collection_id)
            .await
    }

    async fn upsert(&self, correlation: &EntityCorrelation) -> StoreResult<i64> {
        self.inner.upsert(correlation).await
    }

    async fn delete(&self, scope: CorrelationScope<'_>, id: i64) -> StoreResult<bool> {
        self.inner.delete(scope, id).await
    }

    async fn delete_by_affiliation_id(&self, affiliation_id: i64) -> StoreResult<u64> {
        self.inner.delete_by_affiliation_id(affiliation_id).await
    }

    async fn create_collection_correlation(
        &self,
        scope: CorrelationScope<'_>,
        local_collection_id: &str,
        remote_collection_id: &str,
    ) -> StoreResult<CollectionCorrelation> {
        self.inner
            .create_collection_correlation(scope, local_collection_id, remote_collection_id)
            .await
    }

    async fn find_collection_correlation(
        &self,
        scope: CorrelationScope<'_>,
        local_collection_id: &str,
        remote_collection_id: &str,
    ) -> StoreResult<Option<CollectionCorrelation>> {
        self.inner
            .find_collection_correlation(scope, local_collection_id, remote_collection_id)
            .await
    }

    async fn collection_correlations_for_user(
        &self,
        user_id: &str,
    ) -> StoreResult<Vec<CollectionCorrelation>> {
        self.inner.collection_correlations_for_user(user_id).await
    }

    async fn delete_collection_correlation(&self, affiliation_id: i64) -> StoreResult<u64> {
        self.inner.delete_collection_correlation(affiliation_id).await
    }

    async fn store_cursor(&self, affiliation_id: i64, side: Side, cursor: &str) -> StoreResult<()> {
        if self.fail_cursor_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.store_cursor(affiliation_id, side, cursor).await
    }
}
