use groupware_sync_lib::{EntityType, Side};

/// Correlations are always read and written within one user and entity type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationScope<'a> {
    pub user_id: &'a str,
    pub entity_type: EntityType,
}

impl<'a> CorrelationScope<'a> {
    pub fn new(user_id: &'a str, entity_type: EntityType) -> Self {
        Self {
            user_id,
            entity_type,
        }
    }
}

/// A paired local and remote collection plus the delta cursors consumed so far
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionCorrelation {
    pub affiliation_id: i64,
    pub user_id: String,
    pub entity_type: EntityType,
    pub local_collection_id: String,
    pub remote_collection_id: String,
    pub local_cursor: Option<String>,
    pub remote_cursor: Option<String>,
}

impl CollectionCorrelation {
    pub fn scope(&self) -> CorrelationScope<'_> {
        CorrelationScope::new(&self.user_id, self.entity_type)
    }

    pub fn collection_id(&self, side: Side) -> &str {
        match side {
            Side::Local => &self.local_collection_id,
            Side::Remote => &self.remote_collection_id,
        }
    }

    pub fn cursor(&self, side: Side) -> Option<&str> {
        match side {
            Side::Local => self.local_cursor.as_deref(),
            Side::Remote => self.remote_cursor.as_deref(),
        }
    }
}

/// Link between one local and one remote entity, with the signatures both had
/// when they were last reconciled
#[derive(Debug, Clone, PartialEq)]
pub struct EntityCorrelation {
    /// `None` until the row has been written
    pub id: Option<i64>,
    pub entity_type: EntityType,
    pub user_id: String,
    pub affiliation_id: i64,
    pub local_entity_id: String,
    pub local_signature: String,
    pub local_collection_id: String,
    pub remote_entity_id: String,
    pub remote_signature: String,
    pub remote_collection_id: String,
}

impl EntityCorrelation {
    pub fn entity_id(&self, side: Side) -> &str {
        match side {
            Side::Local => &self.local_entity_id,
            Side::Remote => &self.remote_entity_id,
        }
    }

    pub fn signature(&self, side: Side) -> &str {
        match side {
            Side::Local => &self.local_signature,
            Side::Remote => &self.remote_signature,
        }
    }
}
