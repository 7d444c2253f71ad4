use crate::adapters::Entity;
use groupware_sync_lib::Side;
use std::collections::HashMap;

/// Per-pass index of each side's collection by uuid.
///
/// A side is listed at most once per pass, on the first uuid lookup against it.
/// Entities the pass writes are folded back in so later lookups see them.
#[derive(Debug, Default)]
pub struct PassCache {
    local: Option<HashMap<String, Entity>>,
    remote: Option<HashMap<String, Entity>>,
}

impl PassCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, side: Side) -> &Option<HashMap<String, Entity>> {
        match side {
            Side::Local => &self.local,
            Side::Remote => &self.remote,
        }
    }

    fn slot_mut(&mut self, side: Side) -> &mut Option<HashMap<String, Entity>> {
        match side {
            Side::Local => &mut self.local,
            Side::Remote => &mut self.remote,
        }
    }

    pub fn is_loaded(&self, side: Side) -> bool {
        self.slot(side).is_some()
    }

    /// Index a full listing; the first entity listed wins a shared uuid
    pub fn fill(&mut self, side: Side, entities: Vec<Entity>) {
        let mut index = HashMap::with_capacity(entities.len());
        for entity in entities {
            if let Some(uuid) = entity.uuid.clone() {
                index.entry(uuid).or_insert(entity);
            }
        }
        *self.slot_mut(side) = Some(index);
    }

    pub fn find_by_uuid(&self, side: Side, uuid: &str) -> Option<&Entity> {
        self.slot(side).as_ref()?.get(uuid)
    }

    /// Record an entity the pass just wrote. No-op until the side has been listed.
    pub fn remember(&mut self, side: Side, entity: &Entity) {
        if let (Some(index), Some(uuid)) = (self.slot_mut(side).as_mut(), entity.uuid.as_ref()) {
            index.insert(uuid.clone(), entity.clone());
        }
    }

    pub fn forget_id(&mut self, side: Side, id: &str) {
        if let Some(index) = self.slot_mut(side).as_mut() {
            index.retain(|_, entity| entity.id != id);
        }
    }
}
