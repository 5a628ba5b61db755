//! Stable keys identifying a call for coalescing and caching.

use jsonrpc_core::Params;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Derives the key under which a call is deduplicated and memoized.
///
/// Scalar arguments are inlined as JSON literals, so `"0x2a"` and `42` derive
/// different keys. Structured arguments are reduced to a SHA-256 hash of
/// their canonical JSON text; `serde_json` backs objects with a sorted map,
/// so structurally equal values always serialize identically.
pub fn derive_key(method: &str, params: &Params) -> String {
    let mut parts = Vec::new();
    match params {
        Params::None => {}
        Params::Array(values) => {
            for value in values {
                parts.push(render(value));
            }
        }
        Params::Map(map) => parts.push(content_hash(&Value::Object(map.clone()))),
    }
    format!("{method}({})", parts.join(","))
}

fn render(value: &Value) -> String {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => value.to_string(),
        Value::Array(_) | Value::Object(_) => content_hash(value),
    }
}

fn content_hash(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    format!("#{}", hex::encode(hasher.finalize()))
}
