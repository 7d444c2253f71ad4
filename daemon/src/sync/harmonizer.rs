//! Bidirectional reconciliation of one collection pair
//!
//! A pass runs the local leg, then the remote leg. Each leg fetches its side's delta
//! since the stored cursor, applies every added, modified and deleted id, and only
//! then persists the new cursor, so a crash replays a delta instead of skipping it.

use super::conflict_resolution::{resolve, Decision};
use super::errors::HarmonizeError;
use super::pass_cache::PassCache;
use crate::adapters::{AdapterError, Entity, EntityAdapter};
use crate::persistency::correlation_repository::CorrelationStore;
use crate::persistency::types::{CollectionCorrelation, EntityCorrelation};
use groupware_sync_lib::{EntityType, Outcome, Prevalence, Side, Statistics};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

type Result<T> = std::result::Result<T, HarmonizeError>;

/// State that lives for exactly one pass
struct Pass<'a> {
    collection: &'a CollectionCorrelation,
    prevalence: Prevalence,
    cache: PassCache,
    stats: Statistics,
}

pub struct Harmonizer {
    entity_type: EntityType,
    local: Arc<dyn EntityAdapter>,
    remote: Arc<dyn EntityAdapter>,
    store: Arc<dyn CorrelationStore>,
}

impl Harmonizer {
    pub fn new(
        entity_type: EntityType,
        local: Arc<dyn EntityAdapter>,
        remote: Arc<dyn EntityAdapter>,
        store: Arc<dyn CorrelationStore>,
    ) -> Self {
        Self {
            entity_type,
            local,
            remote,
            store,
        }
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    fn adapter(&self, side: Side) -> &dyn EntityAdapter {
        match side {
            Side::Local => self.local.as_ref(),
            Side::Remote => self.remote.as_ref(),
        }
    }

    /// Run one pass over a collection pair.
    ///
    /// A collection confirmed gone on either side removes the pairing and all its entity
    /// correlations, and yields empty statistics.
    pub async fn reconcile(
        &self,
        collection: &CollectionCorrelation,
        prevalence: Prevalence,
        cancel: &CancellationToken,
    ) -> Result<Statistics> {
        if collection.entity_type != self.entity_type {
            return Err(HarmonizeError::EntityTypeMismatch {
                affiliation_id: collection.affiliation_id,
                expected: self.entity_type,
                found: collection.entity_type,
            });
        }

        if !self.collections_present(collection).await? {
            self.store
                .delete_collection_correlation(collection.affiliation_id)
                .await
                .map_err(HarmonizeError::Store)?;
            return Ok(Statistics::default());
        }

        let mut pass = Pass {
            collection,
            prevalence,
            cache: PassCache::new(),
            stats: Statistics::default(),
        };

        for side in [Side::Local, Side::Remote] {
            self.run_leg(&mut pass, side, cancel).await?;
        }

        info!(
            "✅ Reconciled {} {} <-> {} for {}: {}",
            self.entity_type,
            collection.local_collection_id,
            collection.remote_collection_id,
            collection.user_id,
            pass.stats
        );
        Ok(pass.stats)
    }

    async fn collections_present(&self, collection: &CollectionCorrelation) -> Result<bool> {
        for side in [Side::Local, Side::Remote] {
            let collection_id = collection.collection_id(side);
            let present = self
                .adapter(side)
                .probe_collection(collection_id)
                .await
                .map_err(|e| HarmonizeError::from_adapter(side, e))?;
            if !present {
                warn!(
                    "🧹 {} collection {} is gone, dropping pairing {}",
                    side, collection_id, collection.affiliation_id
                );
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn run_leg(&self, pass: &mut Pass<'_>, side: Side, cancel: &CancellationToken) -> Result<()> {
        let collection = pass.collection;
        let collection_id = collection.collection_id(side);
        let stored_cursor = collection.cursor(side);

        let delta = match self
            .adapter(side)
            .fetch_collection_delta(collection_id, stored_cursor)
            .await
        {
            Ok(delta) => delta,
            Err(AdapterError::StaleCursor(reason)) if stored_cursor.is_some() => {
                warn!(
                    "⚠️ {} cursor for {} rejected ({}), restarting from the beginning",
                    side, collection_id, reason
                );
                self.adapter(side)
                    .fetch_collection_delta(collection_id, None)
                    .await
                    .map_err(|e| HarmonizeError::from_adapter(side, e))?
            }
            Err(e) => return Err(HarmonizeError::from_adapter(side, e)),
        };

        debug!(
            "{} delta for {}: {} changed, {} deleted",
            side,
            collection_id,
            delta.added.len() + delta.modified.len(),
            delta.deleted.len()
        );

        // Deletions first, so an item recreated under the same uuid finds its old
        // counterpart already unlinked
        for id in &delta.deleted {
            if cancel.is_cancelled() {
                return Err(HarmonizeError::Cancelled);
            }
            let result = self.apply_deletion(pass, side, id).await;
            self.settle_item(pass, side, id, result)?;
        }

        for id in delta.changed() {
            if cancel.is_cancelled() {
                return Err(HarmonizeError::Cancelled);
            }
            let result = self.apply_change(pass, side, id).await;
            self.settle_item(pass, side, id, result)?;
        }

        if cancel.is_cancelled() {
            return Err(HarmonizeError::Cancelled);
        }

        if stored_cursor != Some(delta.new_cursor.as_str()) {
            self.store
                .store_cursor(collection.affiliation_id, side, &delta.new_cursor)
                .await
                .map_err(|source| HarmonizeError::CursorPersistence { side, source })?;
        }
        Ok(())
    }

    /// Count a finished item, or decide whether its failure ends the pass
    fn settle_item(&self, pass: &mut Pass<'_>, side: Side, id: &str, result: Result<Outcome>) -> Result<()> {
        match result {
            Ok(outcome) => {
                pass.stats.record(outcome);
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e @ HarmonizeError::EntityVanished { .. }) => {
                debug!("{}", e);
                Ok(())
            }
            Err(e) => {
                warn!("⚠️ Skipping {} {} {}: {}", side, self.entity_type, id, e);
                Ok(())
            }
        }
    }

    async fn apply_change(&self, pass: &mut Pass<'_>, side: Side, id: &str) -> Result<Outcome> {
        let collection = pass.collection;
        let scope = collection.scope();
        let other = side.opposite();

        let entity = self
            .fetch(side, collection.collection_id(side), id)
            .await?
            .ok_or_else(|| HarmonizeError::EntityVanished {
                side,
                id: id.to_string(),
            })?;

        let correlation = self
            .store
            .find_by_entity_id(scope, side, id)
            .await
            .map_err(HarmonizeError::from_store)?
            .filter(|c| c.affiliation_id == collection.affiliation_id);

        if let Some(existing) = &correlation {
            if existing.signature(side) == entity.signature() {
                debug!("🔁 {} {} unchanged since last pass", side, id);
                return Ok(Outcome::Unchanged);
            }
        }

        let counterpart = match &correlation {
            Some(existing) => {
                self.fetch(other, collection.collection_id(other), existing.entity_id(other))
                    .await?
            }
            None => self.match_by_uuid(pass, other, &entity).await?,
        };

        let (local, remote) = match side {
            Side::Local => (Some(&entity), counterpart.as_ref()),
            Side::Remote => (counterpart.as_ref(), Some(&entity)),
        };
        let decision = resolve(side, local, remote, correlation.as_ref(), pass.prevalence);
        debug!("{} {} {}: {}", side, self.entity_type, id, decision.as_str());

        let Some((local, remote, outcome)) = self.execute(pass, decision, local, remote).await? else {
            return Ok(Outcome::Unchanged);
        };

        let record = EntityCorrelation {
            id: correlation.as_ref().and_then(|c| c.id),
            entity_type: self.entity_type,
            user_id: collection.user_id.clone(),
            affiliation_id: collection.affiliation_id,
            local_signature: local.signature().to_string(),
            local_entity_id: local.id,
            local_collection_id: collection.local_collection_id.clone(),
            remote_signature: remote.signature().to_string(),
            remote_entity_id: remote.id,
            remote_collection_id: collection.remote_collection_id.clone(),
        };
        self.store
            .upsert(&record)
            .await
            .map_err(HarmonizeError::from_store)?;

        Ok(outcome)
    }

    /// Perform the writes a decision calls for. Returns the reconciled pair.
    async fn execute(
        &self,
        pass: &mut Pass<'_>,
        decision: Decision,
        local: Option<&Entity>,
        remote: Option<&Entity>,
    ) -> Result<Option<(Entity, Entity, Outcome)>> {
        let collection = pass.collection;
        let written = match (decision, local, remote) {
            (Decision::PushRemote | Decision::PullLocal, Some(local), Some(remote))
                if local.signature() == remote.signature() =>
            {
                (local.clone(), remote.clone(), Outcome::Unchanged)
            }
            (Decision::PushRemote, Some(local), Some(remote)) => {
                let updated = self
                    .update(Side::Remote, &collection.remote_collection_id, &remote.id, local)
                    .await?;
                pass.cache.remember(Side::Remote, &updated);
                (local.clone(), updated, Outcome::RemoteUpdated)
            }
            (Decision::PullLocal, Some(local), Some(remote)) => {
                let updated = self
                    .update(Side::Local, &collection.local_collection_id, &local.id, remote)
                    .await?;
                pass.cache.remember(Side::Local, &updated);
                (updated, remote.clone(), Outcome::LocalUpdated)
            }
            (Decision::Create(Side::Remote), Some(local), None) => {
                let created = self
                    .create(Side::Remote, &collection.remote_collection_id, local)
                    .await?;
                pass.cache.remember(Side::Remote, &created);
                (local.clone(), created, Outcome::RemoteCreated)
            }
            (Decision::Create(Side::Local), None, Some(remote)) => {
                let created = self
                    .create(Side::Local, &collection.local_collection_id, remote)
                    .await?;
                pass.cache.remember(Side::Local, &created);
                (created, remote.clone(), Outcome::LocalCreated)
            }
            _ => return Ok(None),
        };
        Ok(Some(written))
    }

    async fn apply_deletion(&self, pass: &mut Pass<'_>, side: Side, id: &str) -> Result<Outcome> {
        let collection = pass.collection;
        let scope = collection.scope();
        let other = side.opposite();

        let Some(correlation) = self
            .store
            .find_by_entity_id(scope, side, id)
            .await
            .map_err(HarmonizeError::from_store)?
            .filter(|c| c.affiliation_id == collection.affiliation_id)
        else {
            debug!("{} {} deleted without correlation", side, id);
            return Ok(Outcome::Unchanged);
        };

        let counterpart_id = correlation.entity_id(other);
        let counterpart = self
            .fetch(other, collection.collection_id(other), counterpart_id)
            .await?;

        // An edit made since the last pass outlives the deletion; the unlinked
        // counterpart is recreated on this side when its own leg sees it.
        let diverged = counterpart
            .as_ref()
            .is_some_and(|c| c.signature() != correlation.signature(other));
        let existed = match counterpart {
            Some(_) if diverged => {
                warn!(
                    "{} {} was deleted but {} {} changed since, keeping it",
                    side, id, other, counterpart_id
                );
                false
            }
            Some(_) => {
                let deleted = self
                    .adapter(other)
                    .delete_entity(collection.collection_id(other), counterpart_id)
                    .await
                    .map_err(|e| HarmonizeError::from_adapter(other, e))?;
                pass.cache.forget_id(other, counterpart_id);
                deleted
            }
            None => false,
        };

        if let Some(correlation_id) = correlation.id {
            self.store
                .delete(scope, correlation_id)
                .await
                .map_err(HarmonizeError::from_store)?;
        }

        if !existed {
            debug!("{} counterpart {} was already gone", other, counterpart_id);
            return Ok(Outcome::Unchanged);
        }
        Ok(match other {
            Side::Local => Outcome::LocalDeleted,
            Side::Remote => Outcome::RemoteDeleted,
        })
    }

    /// Look up the other side's entity sharing this uuid. An entity already linked
    /// to something else is a conflict, not a match.
    async fn match_by_uuid(&self, pass: &mut Pass<'_>, side: Side, entity: &Entity) -> Result<Option<Entity>> {
        let Some(uuid) = entity.uuid.as_deref() else {
            return Ok(None);
        };
        let collection = pass.collection;

        if !pass.cache.is_loaded(side) {
            let listed = self
                .adapter(side)
                .list_entities(collection.collection_id(side))
                .await
                .map_err(|e| HarmonizeError::from_adapter(side, e))?;
            let signed = listed.into_iter().map(|e| self.signed(side, e)).collect();
            pass.cache.fill(side, signed);
        }

        let Some(candidate) = pass.cache.find_by_uuid(side, uuid).cloned() else {
            return Ok(None);
        };

        let linked = self
            .store
            .find_by_entity_id(collection.scope(), side, &candidate.id)
            .await
            .map_err(HarmonizeError::from_store)?;
        if let Some(linked) = linked {
            return Err(HarmonizeError::CorrelationConflict(format!(
                "{} {} shares uuid {} with {} {}, which is already linked to {}",
                side.opposite(),
                entity.id,
                uuid,
                side,
                candidate.id,
                linked.entity_id(side.opposite())
            )));
        }
        Ok(Some(candidate))
    }

    async fn fetch(&self, side: Side, collection_id: &str, id: &str) -> Result<Option<Entity>> {
        let entity = self
            .adapter(side)
            .fetch_entity(collection_id, id)
            .await
            .map_err(|e| HarmonizeError::from_adapter(side, e))?;
        Ok(entity.map(|e| self.signed(side, e)))
    }

    async fn create(&self, side: Side, collection_id: &str, source: &Entity) -> Result<Entity> {
        let created = self
            .adapter(side)
            .create_entity(collection_id, source)
            .await
            .map_err(|e| HarmonizeError::from_adapter(side, e))?;
        Ok(self.signed(side, created))
    }

    async fn update(&self, side: Side, collection_id: &str, target_id: &str, source: &Entity) -> Result<Entity> {
        let updated = self
            .adapter(side)
            .update_entity(collection_id, target_id, source)
            .await
            .map_err(|e| HarmonizeError::from_adapter(side, e))?;
        Ok(self.signed(side, updated))
    }

    fn signed(&self, side: Side, mut entity: Entity) -> Entity {
        if entity.signature.is_none() {
            entity.signature = Some(self.adapter(side).compute_signature(&entity));
        }
        entity
    }
}
