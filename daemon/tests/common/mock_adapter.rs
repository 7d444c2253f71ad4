#![allow(dead_code)]
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use groupware_sync_daemon::adapters::signature::fingerprint;
use groupware_sync_daemon::adapters::{
    AdapterError, AdapterResult, CollectionDelta, Entity, EntityAdapter,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq)]
enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

/// One collection with a change journal; a cursor is the journal length
#[derive(Debug, Default)]
struct MockCollection {
    entities: BTreeMap<String, Entity>,
    journal: Vec<(String, ChangeKind)>,
}

impl MockCollection {
    fn record(&mut self, id: &str, kind: ChangeKind) {
        self.journal.push((id.to_string(), kind));
    }

    fn delta_since(&self, from: usize) -> CollectionDelta {
        let mut first_seen: Vec<(&str, ChangeKind)> = Vec::new();
        for (id, kind) in &self.journal[from..] {
            if !first_seen.iter().any(|(seen, _)| *seen == id.as_str()) {
                first_seen.push((id.as_str(), *kind));
            }
        }

        let mut delta = CollectionDelta::default();
        for (id, first) in first_seen {
            let exists = self.entities.contains_key(id);
            match (first, exists) {
                (ChangeKind::Added, true) => delta.added.push(id.to_string()),
                (ChangeKind::Added, false) => {}
                (_, true) => delta.modified.push(id.to_string()),
                (_, false) => delta.deleted.push(id.to_string()),
            }
        }
        delta.new_cursor = self.journal.len().to_string();
        delta
    }
}

#[derive(Debug, Default)]
struct MockState {
    collections: HashMap<String, MockCollection>,
    unavailable: bool,
    unavailable_operations: HashSet<String>,
    failing_operations: HashSet<String>,
    rejected_sources: HashSet<String>,
    cursor_rejections: usize,
    next_id: u64,
}

/// In-memory entity store for one side of a pairing
pub struct MockAdapter {
    prefix: String,
    supplies_signatures: bool,
    state: Mutex<MockState>,
    call_counter: Mutex<HashMap<String, usize>>,
}

impl MockAdapter {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            supplies_signatures: false,
            state: Mutex::new(MockState::default()),
            call_counter: Mutex::new(HashMap::new()),
        }
    }

    /// Sign every written entity itself instead of leaving it to the engine
    pub fn supplying_signatures(mut self) -> Self {
        self.supplies_signatures = true;
        self
    }

    pub fn with_collection(self, collection_id: &str) -> Self {
        self.add_collection(collection_id);
        self
    }

    pub fn add_collection(&self, collection_id: &str) {
        self.state
            .lock()
            .unwrap()
            .collections
            .entry(collection_id.to_string())
            .or_default();
    }

    pub fn remove_collection(&self, collection_id: &str) {
        self.state.lock().unwrap().collections.remove(collection_id);
    }

    /// Insert or replace an entity as if a user edited the store directly
    pub fn put(&self, collection_id: &str, entity: Entity) {
        let mut state = self.state.lock().unwrap();
        let collection = state
            .collections
            .get_mut(collection_id)
            .expect("collection exists");
        let kind = if collection.entities.contains_key(&entity.id) {
            ChangeKind::Modified
        } else {
            ChangeKind::Added
        };
        collection.record(&entity.id, kind);
        collection.entities.insert(entity.id.clone(), entity);
    }

    pub fn remove(&self, collection_id: &str, id: &str) {
        let mut state = self.state.lock().unwrap();
        let collection = state
            .collections
            .get_mut(collection_id)
            .expect("collection exists");
        if collection.entities.remove(id).is_some() {
            collection.record(id, ChangeKind::Deleted);
        }
    }

    /// Report an entity as modified without changing its content
    pub fn touch(&self, collection_id: &str, id: &str) {
        let mut state = self.state.lock().unwrap();
        let collection = state
            .collections
            .get_mut(collection_id)
            .expect("collection exists");
        collection.record(id, ChangeKind::Modified);
    }

    pub fn get(&self, collection_id: &str, id: &str) -> Option<Entity> {
        let state = self.state.lock().unwrap();
        state.collections.get(collection_id)?.entities.get(id).cloned()
    }

    pub fn entities(&self, collection_id: &str) -> Vec<Entity> {
        let state = self.state.lock().unwrap();
        state
            .collections
            .get(collection_id)
            .map(|c| c.entities.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    /// Make one operation report the store as unreachable
    pub fn unavailable_for(&self, operation: &str) {
        self.state
            .lock()
            .unwrap()
            .unavailable_operations
            .insert(operation.to_string());
    }

    /// Make one operation fail with a generic error
    pub fn fail_operation(&self, operation: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_operations
            .insert(operation.to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.unavailable = false;
        state.unavailable_operations.clear();
        state.failing_operations.clear();
        state.rejected_sources.clear();
        state.cursor_rejections = 0;
    }

    /// Refuse writes whose source entity has this id
    pub fn reject_writes_from(&self, source_id: &str) {
        self.state
            .lock()
            .unwrap()
            .rejected_sources
            .insert(source_id.to_string());
    }

    /// Answer the next `count` delta requests with a stale cursor error
    pub fn reject_cursors(&self, count: usize) {
        self.state.lock().unwrap().cursor_rejections = count;
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.call_counter
            .lock()
            .unwrap()
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    fn enter(&self, operation: &str) -> AdapterResult<std::sync::MutexGuard<'_, MockState>> {
        *self
            .call_counter
            .lock()
            .unwrap()
            .entry(operation.to_string())
            .or_insert(0) += 1;

        let state = self.state.lock().unwrap();
        if state.unavailable || state.unavailable_operations.contains(operation) {
            return Err(AdapterError::Unavailable(format!("{} is offline", self.prefix)));
        }
        if state.failing_operations.contains(operation) {
            return Err(AdapterError::Other(anyhow!("Mock {} failure", operation)));
        }
        Ok(state)
    }

    fn stamp(&self, mut entity: Entity) -> Entity {
        entity.signature = self
            .supplies_signatures
            .then(|| format!("{}:{}", self.prefix, fingerprint(&entity.payload)));
        entity
    }
}

fn collection_mut<'a>(
    state: &'a mut MockState,
    collection_id: &str,
) -> AdapterResult<&'a mut MockCollection> {
    state
        .collections
        .get_mut(collection_id)
        .ok_or_else(|| AdapterError::Other(anyhow!("No collection {}", collection_id)))
}

#[async_trait]
impl EntityAdapter for MockAdapter {
    async fn probe_collection(&self, collection_id: &str) -> AdapterResult<bool> {
        let state = self.enter("probe_collection")?;
        Ok(state.collections.contains_key(collection_id))
    }

    async fn fetch_entity(&self, collection_id: &str, id: &str) -> AdapterResult<Option<Entity>> {
        let mut state = self.enter("fetch_entity")?;
        Ok(collection_mut(&mut state, collection_id)?.entities.get(id).cloned())
    }

    async fn list_entities(&self, collection_id: &str) -> AdapterResult<Vec<Entity>> {
        let mut state = self.enter("list_entities")?;
        Ok(collection_mut(&mut state, collection_id)?
            .entities
            .values()
            .cloned()
            .collect())
    }

    async fn fetch_collection_delta(
        &self,
        collection_id: &str,
        cursor: Option<&str>,
    ) -> AdapterResult<CollectionDelta> {
        let mut state = self.enter("fetch_collection_delta")?;
        if state.cursor_rejections > 0 {
            state.cursor_rejections -= 1;
            return Err(AdapterError::StaleCursor(format!("{:?} expired", cursor)));
        }

        let collection = collection_mut(&mut state, collection_id)?;
        match cursor {
            None => Ok(CollectionDelta {
                added: collection.entities.keys().cloned().collect(),
                new_cursor: collection.journal.len().to_string(),
                ..Default::default()
            }),
            Some(raw) => {
                let from = raw
                    .parse::<usize>()
                    .ok()
                    .filter(|from| *from <= collection.journal.len())
                    .ok_or_else(|| AdapterError::StaleCursor(raw.to_string()))?;
                Ok(collection.delta_since(from))
            }
        }
    }

    async fn create_entity(&self, collection_id: &str, source: &Entity) -> AdapterResult<Entity> {
        let mut state = self.enter("create_entity")?;
        if state.rejected_sources.contains(&source.id) {
            return Err(AdapterError::Rejected(format!("{} refused", source.id)));
        }
        state.next_id += 1;
        let id = format!("{}-{}", self.prefix, state.next_id);

        let entity = self.stamp(Entity {
            id: id.clone(),
            uuid: source.uuid.clone(),
            signature: None,
            modified_on: Utc::now(),
            payload: source.payload.clone(),
        });
        let collection = collection_mut(&mut state, collection_id)?;
        collection.record(&id, ChangeKind::Added);
        collection.entities.insert(id, entity.clone());
        Ok(entity)
    }

    async fn update_entity(
        &self,
        collection_id: &str,
        target_id: &str,
        source: &Entity,
    ) -> AdapterResult<Entity> {
        let mut state = self.enter("update_entity")?;
        if state.rejected_sources.contains(&source.id) {
            return Err(AdapterError::Rejected(format!("{} refused", source.id)));
        }
        let collection = collection_mut(&mut state, collection_id)?;
        let existing = collection
            .entities
            .get(target_id)
            .ok_or_else(|| AdapterError::Rejected(format!("{} does not exist", target_id)))?;

        let entity = self.stamp(Entity {
            id: target_id.to_string(),
            uuid: source.uuid.clone().or_else(|| existing.uuid.clone()),
            signature: None,
            modified_on: Utc::now(),
            payload: source.payload.clone(),
        });
        collection.record(target_id, ChangeKind::Modified);
        collection.entities.insert(target_id.to_string(), entity.clone());
        Ok(entity)
    }

    async fn delete_entity(&self, collection_id: &str, target_id: &str) -> AdapterResult<bool> {
        let mut state = self.enter("delete_entity")?;
        let collection = collection_mut(&mut state, collection_id)?;
        let existed = collection.entities.remove(target_id).is_some();
        if existed {
            collection.record(target_id, ChangeKind::Deleted);
        }
        Ok(existed)
    }
}
