use crate::error::{CryptoError, CryptoResult};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Encode `value` as compact JSON with object keys sorted at every depth.
///
/// Signer and verifier both go through this function, so field order in the
/// Rust type has no influence on the signed bytes.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> CryptoResult<String> {
    let value = serde_json::to_value(value).map_err(|e| CryptoError::Encoding(e.to_string()))?;
    Ok(canonical_value(value).to_string())
}

/// SHA-256 of [`canonical_json`].
pub fn canonical_digest<T: Serialize + ?Sized>(value: &T) -> CryptoResult<[u8; 32]> {
    let encoded = canonical_json(value)?;
    Ok(Sha256::digest(encoded.as_bytes()).into())
}

/// Lowercase hex SHA-256 of raw bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Reorder every object in `value` by key.
///
/// Objects are rebuilt from a sorted entry list so the output is ordered even
/// when serde_json is compiled with `preserve_order`.
pub fn canonical_value(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, inner) in entries {
                sorted.insert(key, canonical_value(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonical_value).collect()),
        other => other,
    }
}
