//! Deterministic content signatures for stores that do not supply one

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Top-level payload keys with this prefix are engine bookkeeping, not content
pub const BOOKKEEPING_PREFIX: char = '_';

/// SHA-256 over the canonical JSON form of the payload, bookkeeping keys excluded
pub fn fingerprint(payload: &Value) -> String {
    let content = match payload {
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .filter(|(key, _)| !key.starts_with(BOOKKEEPING_PREFIX))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        ),
        other => other.clone(),
    };

    let canonical = canonicalize(&content).to_string();
    format!("{:x}", Sha256::digest(canonical.as_bytes()))
}

// Rebuild objects with sorted keys so the digest does not depend on map ordering.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(fields) => {
            let mut keys: Vec<&String> = fields.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&fields[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
