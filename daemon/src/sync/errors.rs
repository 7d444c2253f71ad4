use crate::adapters::AdapterError;
use crate::persistency::correlation_repository::StoreError;
use groupware_sync_lib::{EntityType, Side};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarmonizeError {
    #[error("{side} store unavailable: {reason}")]
    AdapterUnavailable { side: Side, reason: String },

    #[error("{side} entity {id} vanished before it could be read")]
    EntityVanished { side: Side, id: String },

    #[error("correlation conflict: {0}")]
    CorrelationConflict(String),

    #[error("{side} cursor rejected: {reason}")]
    StaleCursorRejected { side: Side, reason: String },

    #[error("failed to persist {side} cursor: {source}")]
    CursorPersistence {
        side: Side,
        #[source]
        source: StoreError,
    },

    #[error("correlation store failure: {0}")]
    Store(#[source] StoreError),

    #[error("{side} adapter error: {source}")]
    Adapter {
        side: Side,
        #[source]
        source: AdapterError,
    },

    #[error("collection correlation {affiliation_id} holds {found} entities, harmonizer serves {expected}")]
    EntityTypeMismatch {
        affiliation_id: i64,
        expected: EntityType,
        found: EntityType,
    },

    #[error("pass cancelled")]
    Cancelled,
}

impl HarmonizeError {
    pub fn from_adapter(side: Side, error: AdapterError) -> Self {
        match error {
            AdapterError::Unavailable(reason) => HarmonizeError::AdapterUnavailable { side, reason },
            AdapterError::StaleCursor(reason) => HarmonizeError::StaleCursorRejected { side, reason },
            source => HarmonizeError::Adapter { side, source },
        }
    }

    pub fn from_store(error: StoreError) -> Self {
        match error {
            StoreError::Conflict(message) => HarmonizeError::CorrelationConflict(message),
            other => HarmonizeError::Store(other),
        }
    }

    /// Whether the error ends the pass instead of skipping one item
    pub fn is_fatal(&self) -> bool {
        match self {
            HarmonizeError::AdapterUnavailable { .. }
            | HarmonizeError::StaleCursorRejected { .. }
            | HarmonizeError::CursorPersistence { .. }
            | HarmonizeError::Store(_)
            | HarmonizeError::EntityTypeMismatch { .. }
            | HarmonizeError::Cancelled => true,
            HarmonizeError::EntityVanished { .. }
            | HarmonizeError::CorrelationConflict(_)
            | HarmonizeError::Adapter { .. } => false,
        }
    }
}

/// True when a pass ended because it was cancelled, not because something broke
pub fn is_cancellation(error: &anyhow::Error) -> bool {
    matches!(error.downcast_ref::<HarmonizeError>(), Some(HarmonizeError::Cancelled))
}
