//! Per-account orchestration
//!
//! The supervisor turns configured pairings into collection correlations and then
//! reconciles every pairing of an account one after the other. Remote sessions are
//! stateful, so collections of one account never run concurrently.

use super::errors::HarmonizeError;
use super::harmonizer::Harmonizer;
use crate::adapters::EntityAdapter;
use crate::persistency::correlation_repository::CorrelationStore;
use crate::persistency::types::{CollectionCorrelation, CorrelationScope};
use anyhow::{Context, Result};
use groupware_sync_lib::{AccountStatus, EntityType, PairingSettings, PrevalenceSettings, Side, Statistics};
use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Both ends of one entity type for one account
#[derive(Clone)]
pub struct AdapterSet {
    pub local: Arc<dyn EntityAdapter>,
    pub remote: Arc<dyn EntityAdapter>,
}

impl AdapterSet {
    pub fn side(&self, side: Side) -> &Arc<dyn EntityAdapter> {
        match side {
            Side::Local => &self.local,
            Side::Remote => &self.remote,
        }
    }
}

/// Adapters an account can be reconciled through
#[derive(Clone)]
pub struct AccountSession {
    pub user_id: String,
    adapters: HashMap<EntityType, AdapterSet>,
}

impl AccountSession {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            adapters: HashMap::new(),
        }
    }

    pub fn with_adapters(
        mut self,
        entity_type: EntityType,
        local: Arc<dyn EntityAdapter>,
        remote: Arc<dyn EntityAdapter>,
    ) -> Self {
        self.adapters.insert(entity_type, AdapterSet { local, remote });
        self
    }

    pub fn adapters(&self, entity_type: EntityType) -> Option<&AdapterSet> {
        self.adapters.get(&entity_type)
    }
}

pub struct CollectionSupervisor {
    store: Arc<dyn CorrelationStore>,
}

impl CollectionSupervisor {
    pub fn new(store: Arc<dyn CorrelationStore>) -> Self {
        Self { store }
    }

    /// Create a collection correlation for every configured pairing that does not have
    /// one yet. Pairings whose collections do not exist on both sides are left for a
    /// later pass.
    pub async fn ensure_pairings(
        &self,
        session: &AccountSession,
        pairings: &[PairingSettings],
    ) -> Result<Vec<CollectionCorrelation>> {
        let mut created = Vec::new();
        for pairing in pairings {
            let scope = CorrelationScope::new(&session.user_id, pairing.entity_type);
            let existing = self
                .store
                .find_collection_correlation(scope, &pairing.local_collection, &pairing.remote_collection)
                .await
                .context("Failed to look up collection correlation")?;
            if existing.is_some() {
                continue;
            }

            let Some(adapters) = session.adapters(pairing.entity_type) else {
                warn!(
                    "⚠️ No {} adapters for {}, pairing {} <-> {} ignored",
                    pairing.entity_type, session.user_id, pairing.local_collection, pairing.remote_collection
                );
                continue;
            };
            if !Self::both_present(adapters, pairing).await {
                continue;
            }

            let collection = self
                .store
                .create_collection_correlation(scope, &pairing.local_collection, &pairing.remote_collection)
                .await
                .context("Failed to create collection correlation")?;
            created.push(collection);
        }
        Ok(created)
    }

    async fn both_present(adapters: &AdapterSet, pairing: &PairingSettings) -> bool {
        for (side, collection_id) in [
            (Side::Local, &pairing.local_collection),
            (Side::Remote, &pairing.remote_collection),
        ] {
            match adapters.side(side).probe_collection(collection_id).await {
                Ok(true) => {}
                Ok(false) => {
                    info!("⏳ {} collection {} does not exist yet", side, collection_id);
                    return false;
                }
                Err(e) => {
                    warn!("⚠️ Could not probe {} collection {}: {}", side, collection_id, e);
                    return false;
                }
            }
        }
        true
    }

    /// Reconcile every collection correlation of the account, in order.
    ///
    /// The first failing collection ends the pass; collections already reconciled keep
    /// their persisted cursors.
    pub async fn run_pass(
        &self,
        session: &AccountSession,
        prevalence: PrevalenceSettings,
        cancel: &CancellationToken,
    ) -> Result<Statistics> {
        let collections = self
            .store
            .collection_correlations_for_user(&session.user_id)
            .await
            .context("Failed to load collection correlations")?;

        let mut total = Statistics::default();
        for collection in collections {
            if cancel.is_cancelled() {
                return Err(HarmonizeError::Cancelled.into());
            }
            let Some(adapters) = session.adapters(collection.entity_type) else {
                warn!(
                    "⚠️ No {} adapters for {}, skipping affiliation {}",
                    collection.entity_type, session.user_id, collection.affiliation_id
                );
                continue;
            };

            let harmonizer = Harmonizer::new(
                collection.entity_type,
                adapters.local.clone(),
                adapters.remote.clone(),
                self.store.clone(),
            );
            let stats = harmonizer
                .reconcile(&collection, prevalence.for_type(collection.entity_type), cancel)
                .await
                .with_context(|| {
                    format!(
                        "Failed to reconcile {} {} <-> {}",
                        collection.entity_type, collection.local_collection_id, collection.remote_collection_id
                    )
                })?;
            total.merge(&stats);
        }

        info!("📊 Pass for {} finished: {}", session.user_id, total);
        Ok(total)
    }
}

/// Consecutive-failure tracking behind the account status
#[derive(Debug, Clone)]
pub struct AccountHealth {
    threshold: u32,
    consecutive_failures: u32,
    status: AccountStatus,
}

impl AccountHealth {
    pub fn new(disconnect_after_failures: u32) -> Self {
        Self {
            threshold: disconnect_after_failures.max(1),
            consecutive_failures: 0,
            status: AccountStatus::Connected,
        }
    }

    pub fn status(&self) -> &AccountStatus {
        &self.status
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Returns the new status when it changed
    pub fn record_success(&mut self) -> Option<AccountStatus> {
        self.consecutive_failures = 0;
        self.transition(AccountStatus::Connected)
    }

    /// Returns the new status when it changed
    pub fn record_failure(&mut self, reason: &str) -> Option<AccountStatus> {
        self.consecutive_failures += 1;
        if self.consecutive_failures < self.threshold || self.status != AccountStatus::Connected {
            return None;
        }
        self.transition(AccountStatus::Disconnected(reason.to_string()))
    }

    fn transition(&mut self, status: AccountStatus) -> Option<AccountStatus> {
        if self.status == status {
            return None;
        }
        self.status = status.clone();
        Some(status)
    }
}
