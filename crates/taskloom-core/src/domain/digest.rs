//! Canonical JSON and SHA-256 digests used for task identity.
//!
//! Canonical form:
//! - object keys sorted by Unicode code point, recursively
//! - integer-valued floats written as integers; NaN/Infinity rejected
//! - compact output, no insignificant whitespace, UTF-8

use sha2::{Digest, Sha256};

use crate::domain::error::{GraphError, GraphResult};

/// Number of hex characters kept for a task id.
pub const TASK_ID_LEN: usize = 16;

/// Recursively sort object keys by code point.
pub(crate) fn sort_keys(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            let mut sorted = serde_json::Map::new();
            for key in keys {
                if let Some(v) = map.get(key) {
                    sorted.insert(key.clone(), sort_keys(v));
                }
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(arr) => serde_json::Value::Array(arr.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

fn normalize_value(value: &serde_json::Value) -> GraphResult<serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => {
            let mut normalized = serde_json::Map::new();
            for (k, v) in map {
                normalized.insert(k.clone(), normalize_value(v)?);
            }
            Ok(serde_json::Value::Object(normalized))
        }
        serde_json::Value::Array(arr) => Ok(serde_json::Value::Array(
            arr.iter().map(normalize_value).collect::<GraphResult<Vec<_>>>()?,
        )),
        serde_json::Value::Number(n) if !(n.is_i64() || n.is_u64()) => {
            let Some(f) = n.as_f64() else {
                return Ok(serde_json::Value::Number(n.clone()));
            };
            if !f.is_finite() {
                return Err(GraphError::Canonicalization(
                    "NaN/Infinity not permitted in canonical JSON".to_string(),
                ));
            }
            if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                Ok(serde_json::Value::Number(serde_json::Number::from(f as i64)))
            } else {
                Ok(serde_json::Value::Number(n.clone()))
            }
        }
        other => Ok(other.clone()),
    }
}

/// Convert a JSON value to its canonical string form.
pub fn canonical_json(value: &serde_json::Value) -> GraphResult<String> {
    let normalized = normalize_value(value)?;
    Ok(serde_json::to_string(&sort_keys(&normalized))?)
}

/// SHA-256 hex digest of the canonical form of `value`.
pub fn compute_digest(value: &serde_json::Value) -> GraphResult<String> {
    let canonical = canonical_json(value)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Short content-addressed id: the first [`TASK_ID_LEN`] hex chars of the digest.
pub fn short_digest(value: &serde_json::Value) -> GraphResult<String> {
    let mut digest = compute_digest(value)?;
    digest.truncate(TASK_ID_LEN);
    Ok(digest)
}
