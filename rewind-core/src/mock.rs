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

//! Mock store
//!
//! Replay-side lookup of previously recorded responses. A lookup narrows
//! first by scope (package, instrumentation, submodule, kind), then by
//! span name, then by weighted fingerprint equality; ties break by
//! insertion order. A matched entry is consumed and will not match again
//! within the same replay run.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};
use crate::fingerprint::{eq_with_weights, MergeMap};
use crate::span::{attr, SpanData, SpanKind, SpanMeta, SpanStatus};

/// Lookup scope narrowing a mock search.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub package_name: String,
    pub instrumentation_name: String,
    pub submodule_name: String,
    pub kind: SpanKind,
}

impl From<&SpanMeta> for Scope {
    fn from(meta: &SpanMeta) -> Self {
        Scope {
            package_name: meta.package_name.clone(),
            instrumentation_name: meta.instrumentation_name.clone(),
            submodule_name: meta.submodule.clone(),
            kind: meta.kind,
        }
    }
}

/// Metadata attached to a recorded entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Span name the entry was recorded under.
    pub name: String,
    /// Per-field match importance captured at record time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_weights: Option<MergeMap>,
    /// Whether the recorded call happened before the app was ready.
    #[serde(default)]
    pub pre_app_start: bool,
    /// A reusable entry matches any number of times instead of being
    /// consumed. Off by default.
    #[serde(default)]
    pub reusable: bool,
}

/// One recorded interaction: the canonical input and the captured result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedEntry {
    pub input_value: Value,
    pub result: Value,
    #[serde(default)]
    pub metadata: EntryMetadata,
}

/// A replay lookup request.
#[derive(Debug, Clone)]
pub struct MockQuery {
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub scope: Scope,
    pub name: String,
    pub fingerprint: Value,
    pub stack_trace: Option<Value>,
    pub merge_map: Option<MergeMap>,
    pub pre_app_start: bool,
}

impl MockQuery {
    pub fn new(scope: Scope, name: impl Into<String>, fingerprint: Value) -> Self {
        Self {
            trace_id: None,
            span_id: None,
            scope,
            name: name.into(),
            fingerprint,
            stack_trace: None,
            merge_map: None,
            pre_app_start: false,
        }
    }

    pub fn with_merge_map(mut self, weights: MergeMap) -> Self {
        self.merge_map = Some(weights);
        self
    }

    pub fn pre_app_start(mut self, flag: bool) -> Self {
        self.pre_app_start = flag;
        self
    }
}

/// Source of recorded entries backing replay.
///
/// `find_sync` exists only for adapters whose intercepted operation
/// cannot suspend; it must answer from already-loaded state and never
/// wait on remote lookup.
#[async_trait]
pub trait MockSource: Send + Sync + std::fmt::Debug {
    async fn find(&self, query: &MockQuery) -> Option<RecordedEntry>;

    fn find_sync(&self, query: &MockQuery) -> Option<RecordedEntry>;
}

#[derive(Debug, Clone)]
struct StoredEntry {
    entry: RecordedEntry,
    consumed: bool,
}

/// In-memory mock source with per-scope consumption cursors.
#[derive(Debug, Default)]
pub struct InMemoryMockStore {
    scopes: DashMap<Scope, Mutex<Vec<StoredEntry>>>,
}

impl InMemoryMockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry under `scope`, after all existing entries.
    pub fn insert(&self, scope: Scope, entry: RecordedEntry) {
        self.scopes
            .entry(scope)
            .or_default()
            .lock()
            .push(StoredEntry {
                entry,
                consumed: false,
            });
    }

    /// Reset all consumption cursors, e.g. between replay runs.
    pub fn reset_consumption(&self) {
        for slot in self.scopes.iter() {
            for stored in slot.value().lock().iter_mut() {
                stored.consumed = false;
            }
        }
    }

    /// Total number of entries, consumed or not.
    pub fn len(&self) -> usize {
        self.scopes.iter().map(|s| s.value().lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build a store from recorded spans, reading the fixed attribute
    /// namespace. Spans without an input value are skipped.
    pub fn ingest_spans(&self, spans: &[SpanData]) {
        for span in spans {
            if !matches!(span.status, SpanStatus::Ok) {
                continue;
            }
            let Some(input_value) = span.attributes.get(attr::INPUT_VALUE).cloned() else {
                continue;
            };
            let result = span
                .attributes
                .get(attr::OUTPUT_VALUE)
                .cloned()
                .unwrap_or(Value::Null);
            let get_str = |key: &str| {
                span.attributes
                    .get(key)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            let kind = match span.attributes.get(attr::KIND).and_then(Value::as_str) {
                Some("SERVER") => SpanKind::Server,
                Some("INTERNAL") => SpanKind::Internal,
                _ => SpanKind::Client,
            };
            let scope = Scope {
                package_name: get_str(attr::PACKAGE_NAME),
                instrumentation_name: get_str(attr::INSTRUMENTATION_NAME),
                submodule_name: get_str(attr::SUBMODULE),
                kind,
            };
            let merge_weights = span
                .attributes
                .get(attr::INPUT_SCHEMA_MERGES)
                .and_then(|v| serde_json::from_value(v.clone()).ok());
            let pre_app_start = span
                .attributes
                .get(attr::IS_PRE_APP_START)
                .and_then(Value::as_bool)
                .unwrap_or(false);
            self.insert(
                scope,
                RecordedEntry {
                    input_value,
                    result,
                    metadata: EntryMetadata {
                        name: span.name.clone(),
                        merge_weights,
                        pre_app_start,
                        reusable: false,
                    },
                },
            );
        }
    }

    /// Serialize all entries as JSON Lines, one `{scope, entry}` per line.
    pub fn export_jsonl(&self) -> CoreResult<String> {
        #[derive(Serialize)]
        struct Line<'a> {
            scope: &'a Scope,
            entry: &'a RecordedEntry,
        }
        let mut out = String::new();
        for slot in self.scopes.iter() {
            for stored in slot.value().lock().iter() {
                let line = Line {
                    scope: slot.key(),
                    entry: &stored.entry,
                };
                out.push_str(&serde_json::to_string(&line)?);
                out.push('\n');
            }
        }
        Ok(out)
    }

    /// Load entries from JSON Lines produced by [`export_jsonl`].
    ///
    /// [`export_jsonl`]: InMemoryMockStore::export_jsonl
    pub fn import_jsonl(data: &str) -> CoreResult<Self> {
        #[derive(Deserialize)]
        struct Line {
            scope: Scope,
            entry: RecordedEntry,
        }
        let store = Self::new();
        for (idx, raw) in data.lines().enumerate() {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let line: Line = serde_json::from_str(raw)
                .map_err(|e| CoreError::Store(format!("line {}: {e}", idx + 1)))?;
            store.insert(line.scope, line.entry);
        }
        Ok(store)
    }

    fn find_inner(&self, query: &MockQuery) -> Option<RecordedEntry> {
        let slot = self.scopes.get(&query.scope)?;
        let mut entries = slot.lock();

        // Exact pass: name, then weighted fingerprint equality.
        let exact = entries.iter().position(|stored| {
            !stored.consumed
                && stored.entry.metadata.name == query.name
                && fingerprints_match(query, &stored.entry)
        });

        // Pre-app-start traffic is matched with relaxed constraints: the
        // fingerprint check falls away, the name must still agree.
        let pos = exact.or_else(|| {
            if !query.pre_app_start {
                return None;
            }
            entries
                .iter()
                .position(|stored| !stored.consumed && stored.entry.metadata.name == query.name)
        })?;

        let stored = &mut entries[pos];
        if !stored.entry.metadata.reusable {
            stored.consumed = true;
        }
        Some(stored.entry.clone())
    }
}

fn fingerprints_match(query: &MockQuery, entry: &RecordedEntry) -> bool {
    let weights = entry
        .metadata
        .merge_weights
        .as_ref()
        .or(query.merge_map.as_ref());
    eq_with_weights(&query.fingerprint, &entry.input_value, weights)
}

#[async_trait]
impl MockSource for InMemoryMockStore {
    async fn find(&self, query: &MockQuery) -> Option<RecordedEntry> {
        self.find_inner(query)
    }

    fn find_sync(&self, query: &MockQuery) -> Option<RecordedEntry> {
        self.find_inner(query)
    }
}
