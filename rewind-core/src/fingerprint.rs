// Copyright 2025 Rewind (https://github.com/rewindhq/rewind)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Fingerprint canonicalization
//!
//! Produces the deterministic representation of a request's input used
//! both for mock lookup and for the recorded payload. Record and replay
//! canonicalize through the same function; a split would introduce false
//! misses.
//!
//! Canonical form: object keys sorted, absent-valued fields dropped,
//! arrays preserved in order, structures deeper than [`MAX_DEPTH`]
//! replaced with the `"[Circular]"` sentinel, binary payloads carried as
//! base64 strings.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Sentinel replacing structures too deep to fingerprint.
pub const CIRCULAR_SENTINEL: &str = "[Circular]";

/// Depth bound standing in for cycle detection on tree-shaped values.
pub const MAX_DEPTH: usize = 64;

/// Per-field match importance. Weight `0` marks a field as ignorable
/// during comparison (headers, cookies, timestamps).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeMap(pub HashMap<String, f64>);

impl MergeMap {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn ignore(mut self, path: impl Into<String>) -> Self {
        self.0.insert(path.into(), 0.0);
        self
    }

    pub fn weight(mut self, path: impl Into<String>, w: f64) -> Self {
        self.0.insert(path.into(), w);
        self
    }

    /// Whether the field at `path` carries zero match importance.
    pub fn is_ignorable(&self, path: &str) -> bool {
        matches!(self.0.get(path), Some(w) if *w == 0.0)
    }
}

/// Canonicalize a value. Idempotent.
pub fn canonicalize(value: &Value) -> Value {
    canonicalize_at(value, 0)
}

fn canonicalize_at(value: &Value, depth: usize) -> Value {
    if depth > MAX_DEPTH {
        return Value::String(CIRCULAR_SENTINEL.to_string());
    }
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                if v.is_null() {
                    continue;
                }
                out.insert(k.clone(), canonicalize_at(v, depth + 1));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| canonicalize_at(v, depth + 1))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Remove fields whose merge weight is zero. Paths are dot-joined object
/// keys; array elements inherit the enclosing path.
pub fn project(value: &Value, weights: &MergeMap) -> Value {
    project_at(value, weights, String::new())
}

fn project_at(value: &Value, weights: &MergeMap, prefix: String) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                let path = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                if weights.is_ignorable(&path) {
                    continue;
                }
                out.insert(k.clone(), project_at(v, weights, path));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| project_at(v, weights, prefix.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Canonical JSON text. Keys come out sorted because the canonical value
/// is rebuilt through ordered maps.
pub fn canonical_string(value: &Value) -> String {
    serde_json::to_string(&canonicalize(value)).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "canonical serialization failed");
        String::new()
    })
}

/// Canonical fingerprint digest: SHA-256 over the canonical text after
/// weighted projection.
pub fn fingerprint_hex(value: &Value, weights: Option<&MergeMap>) -> String {
    let projected = match weights {
        Some(w) => project(&canonicalize(value), w),
        None => canonicalize(value),
    };
    let mut hasher = Sha256::new();
    hasher.update(canonical_string(&projected).as_bytes());
    hex::encode(hasher.finalize())
}

/// Fingerprint equality modulo zero-weight fields.
pub fn eq_with_weights(a: &Value, b: &Value, weights: Option<&MergeMap>) -> bool {
    fingerprint_hex(a, weights) == fingerprint_hex(b, weights)
}

/// Encode a binary payload once as a base64 string leaf.
pub fn binary_to_value(bytes: &[u8]) -> Value {
    Value::String(BASE64.encode(bytes))
}

/// Decode a base64 string leaf back to bytes.
pub fn value_to_binary(value: &Value) -> Option<Vec<u8>> {
    BASE64.decode(value.as_str()?).ok()
}
