//! Canonical JSON and request fingerprints.
//!
//! Two logically-equivalent argument objects must hash identically:
//! object keys are sorted recursively, strings (keys and values) are
//! NFC-normalized, array order is preserved, and numbers rely on
//! `serde_json`'s canonical rendering (integers stay integers, floats get
//! the shortest round-trip form).

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

/// Separator between the tool name and the canonical argument bytes in the
/// hash preimage, so `("ab", {})` and `("a", "b"-ish args)` cannot collide.
const HASH_SEPARATOR: u8 = 0x1f;

/// Recursively canonicalize a JSON value.
#[must_use]
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => value.clone(),
        Value::String(s) => Value::String(nfc(s)),
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));

            let mut out = Map::with_capacity(map.len());
            for (k, v) in entries {
                out.insert(nfc(k), canonicalize(v));
            }
            Value::Object(out)
        }
    }
}

/// Canonical compact rendering.
#[must_use]
pub fn canonical_string(value: &Value) -> String {
    serde_json::to_string(&canonicalize(value)).unwrap_or_else(|_| "null".to_string())
}

/// `sha256(tool_name || 0x1F || canonical_json(args))`, lowercase hex.
#[must_use]
pub fn request_hash(tool_name: &str, args: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tool_name.as_bytes());
    hasher.update([HASH_SEPARATOR]);
    hasher.update(canonical_string(args).as_bytes());
    hex::encode(hasher.finalize())
}

/// Lowercase hex SHA-256 of raw bytes. Also used for content addressing.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Mint a replay ID: opaque, unique per invocation.
#[must_use]
pub fn new_replay_id() -> String {
    format!("inv_{}", Uuid::new_v4().simple())
}

fn nfc(s: &str) -> String {
    s.nfc().collect()
}
