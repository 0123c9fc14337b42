//! Canonical JSON serialization and fingerprints
//!
//! Model artifacts, feature layouts, filter specs and dataset snapshots are
//! identified by the blake3 hash of their canonical JSON form (recursively
//! sorted object keys, no whitespace).

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CanonicalError {
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Canonical JSON text of a model, layout, filter or row set.
///
/// Two values that differ only in map insertion order (a filter built from
/// flags vs. one read from a JSON file, a model saved as bincode vs. JSON)
/// produce the same text and therefore the same fingerprint.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String, CanonicalError> {
    let tree = serde_json::to_value(value)
        .map_err(|e| CanonicalError::SerializationError(e.to_string()))?;
    serde_json::to_string(&sort_keys(tree))
        .map_err(|e| CanonicalError::SerializationError(e.to_string()))
}

/// Keys in byte order at every depth; array order is untouched
fn sort_keys(value: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        leaf => leaf,
    }
}

/// Model identity: blake3 over the canonical JSON text
pub fn hash_canonical<T: Serialize>(value: &T) -> Result<[u8; 32], CanonicalError> {
    let json = to_canonical_json(value)?;
    Ok(*blake3::hash(json.as_bytes()).as_bytes())
}

/// Hex fingerprint used for model hashes, layout fingerprints, filter
/// fingerprints and record-built dataset versions
pub fn hash_canonical_hex<T: Serialize>(value: &T) -> Result<String, CanonicalError> {
    Ok(hex::encode(hash_canonical(value)?))
}

/// Dataset version for a file snapshot, taken over the file bytes as read
pub fn hash_bytes_hex(bytes: &[u8]) -> String {
    hex::encode(blake3::hash(bytes).as_bytes())
}
