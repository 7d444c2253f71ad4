//! Entity adapter contract
//!
//! Each side of a pairing (local store, remote groupware server) is reached through
//! an [`EntityAdapter`]. Adapters own all native format handling and hand the engine
//! normalized [`Entity`] values; the engine never looks inside a payload.

pub mod directory_store;
pub mod signature;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A contact, event or task as seen by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Identity on the side that produced this value
    pub id: String,
    /// Cross-side identity (vCard/iCalendar UID), used to link items seen for the first time
    pub uuid: Option<String>,
    /// Content fingerprint; `None` until the store or the engine has signed it
    pub signature: Option<String>,
    pub modified_on: DateTime<Utc>,
    /// Adapter-normalized fields, forwarded verbatim between sides
    pub payload: Value,
}

impl Entity {
    pub fn signature(&self) -> &str {
        self.signature.as_deref().unwrap_or_default()
    }
}

/// Changes in one collection since a cursor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionDelta {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
    pub new_cursor: String,
}

impl CollectionDelta {
    /// Added and modified ids, in delta order
    pub fn changed(&self) -> impl Iterator<Item = &String> {
        self.added.iter().chain(self.modified.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("cursor rejected: {0}")]
    StaleCursor(String),

    #[error("write rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Uniform access to one side's store for one entity type
#[async_trait]
pub trait EntityAdapter: Send + Sync {
    /// `Ok(false)` only when the collection is confirmed gone
    async fn probe_collection(&self, collection_id: &str) -> AdapterResult<bool>;

    async fn fetch_entity(&self, collection_id: &str, id: &str) -> AdapterResult<Option<Entity>>;

    async fn list_entities(&self, collection_id: &str) -> AdapterResult<Vec<Entity>>;

    /// Passing `None` requests the full collection as `added`
    async fn fetch_collection_delta(
        &self,
        collection_id: &str,
        cursor: Option<&str>,
    ) -> AdapterResult<CollectionDelta>;

    /// Returns the stored entity with its assigned id
    async fn create_entity(&self, collection_id: &str, source: &Entity) -> AdapterResult<Entity>;

    async fn update_entity(
        &self,
        collection_id: &str,
        target_id: &str,
        source: &Entity,
    ) -> AdapterResult<Entity>;

    /// `Ok(false)` when there was nothing to delete
    async fn delete_entity(&self, collection_id: &str, target_id: &str) -> AdapterResult<bool>;

    /// Signature for entities the store delivered unsigned
    fn compute_signature(&self, entity: &Entity) -> String {
        signature::fingerprint(&entity.payload)
    }
}
