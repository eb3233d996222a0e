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

//! Snapshot facades
//!
//! Replay materializes objects with the same observable surface the real
//! client library exposes: document snapshots with `data()` / `exists` /
//! `id`, query snapshots with `for_each` / `doc_changes` / `is_equal`,
//! and `{seconds, nanoseconds}` timestamps convertible to dates. The
//! same types serialize into the recorded output values.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DocError, DocResult};

/// Wall-clock instant split into seconds and nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanoseconds: u32,
}

impl Timestamp {
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            seconds: now.timestamp(),
            nanoseconds: now.timestamp_subsec_nanos(),
        }
    }

    /// Millisecond-resolution date value:
    /// `seconds * 1000 + nanoseconds / 1_000_000`.
    pub fn to_date(&self) -> DateTime<Utc> {
        let millis = self.seconds * 1000 + i64::from(self.nanoseconds) / 1_000_000;
        Utc.timestamp_millis_opt(millis)
            .single()
            .unwrap_or_else(|| Utc.timestamp_millis_opt(0).single().unwrap_or_default())
    }
}

/// Address of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DocRef {
    pub id: String,
    pub path: String,
}

/// One read document, existing or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSnapshot {
    pub id: String,
    pub path: String,
    pub exists: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_time: Option<Timestamp>,
}

impl DocumentSnapshot {
    pub fn existing(id: impl Into<String>, path: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            exists: true,
            data: Some(data),
            create_time: None,
            update_time: None,
            read_time: None,
        }
    }

    /// The neutral snapshot served on a documented replay miss.
    pub fn missing() -> Self {
        Self {
            id: String::new(),
            path: String::new(),
            exists: false,
            data: None,
            create_time: None,
            update_time: None,
            read_time: None,
        }
    }

    pub fn with_times(
        mut self,
        create: Option<Timestamp>,
        update: Option<Timestamp>,
        read: Option<Timestamp>,
    ) -> Self {
        self.create_time = create;
        self.update_time = update;
        self.read_time = read;
        self
    }

    /// Document fields, present only when the document exists.
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Equality the way the client library defines it: same address and
    /// same contents.
    pub fn is_equal(&self, other: &DocumentSnapshot) -> bool {
        self.id == other.id
            && self.path == other.path
            && self.exists == other.exists
            && self.data == other.data
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn from_value(value: &Value) -> DocResult<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| DocError::MalformedRecording(e.to_string()))
    }
}

/// One entry in `doc_changes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocChange {
    #[serde(rename = "type")]
    pub change_type: String,
    pub old_index: i64,
    pub new_index: i64,
    pub doc: DocumentSnapshot,
}

/// Result of a query over a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySnapshot {
    pub docs: Vec<DocumentSnapshot>,
    pub size: usize,
    pub empty: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_time: Option<Timestamp>,
}

impl QuerySnapshot {
    pub fn of(docs: Vec<DocumentSnapshot>) -> Self {
        let size = docs.len();
        Self {
            docs,
            size,
            empty: size == 0,
            read_time: None,
        }
    }

    /// The neutral snapshot served on a documented replay miss.
    pub fn neutral() -> Self {
        Self::of(Vec::new())
    }

    pub fn for_each(&self, mut f: impl FnMut(&DocumentSnapshot)) {
        for doc in &self.docs {
            f(doc);
        }
    }

    /// Initial-result changes: every document is an `added` entry.
    pub fn doc_changes(&self) -> Vec<DocChange> {
        self.docs
            .iter()
            .enumerate()
            .map(|(i, doc)| DocChange {
                change_type: "added".to_string(),
                old_index: -1,
                new_index: i as i64,
                doc: doc.clone(),
            })
            .collect()
    }

    pub fn is_equal(&self, other: &QuerySnapshot) -> bool {
        self.size == other.size
            && self
                .docs
                .iter()
                .zip(&other.docs)
                .all(|(a, b)| a.is_equal(b))
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn from_value(value: &Value) -> DocResult<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| DocError::MalformedRecording(e.to_string()))
    }
}

/// Result of a write operation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WriteResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_time: Option<Timestamp>,
}

impl WriteResult {
    /// The neutral result served on a documented replay miss: the
    /// current wall time.
    pub fn neutral() -> Self {
        Self {
            write_time: Some(Timestamp::now()),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn from_value(value: &Value) -> DocResult<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| DocError::MalformedRecording(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_timestamp_to_date() {
        let ts = Timestamp {
            seconds: 1_700_000_000,
            nanoseconds: 500_000_000,
        };
        assert_eq!(ts.to_date().timestamp_millis(), 1_700_000_000_500);
    }

    #[test]
    fn test_snapshot_serialization_shape() {
        let snap = DocumentSnapshot::existing("42", "users/42", json!({"name": "jo"})).with_times(
            Some(Timestamp {
                seconds: 1,
                nanoseconds: 2,
            }),
            None,
            None,
        );
        let v = snap.to_value();
        assert_eq!(v["id"], "42");
        assert_eq!(v["exists"], true);
        assert_eq!(v["createTime"], json!({"seconds": 1, "nanoseconds": 2}));
        assert!(v.get("updateTime").is_none());

        let back = DocumentSnapshot::from_value(&v).unwrap();
        assert!(back.is_equal(&snap));
    }

    #[test]
    fn test_query_snapshot_surface() {
        let snap = QuerySnapshot::of(vec![
            DocumentSnapshot::existing("1", "t/1", json!({"n": 1})),
            DocumentSnapshot::existing("2", "t/2", json!({"n": 2})),
        ]);
        assert_eq!(snap.size, 2);
        assert!(!snap.empty);

        let mut seen = Vec::new();
        snap.for_each(|d| seen.push(d.id.clone()));
        assert_eq!(seen, vec!["1", "2"]);

        let changes = snap.doc_changes();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].change_type, "added");
        assert_eq!(changes[0].old_index, -1);
        assert_eq!(changes[1].new_index, 1);

        assert!(snap.is_equal(&snap.clone()));
        assert!(!snap.is_equal(&QuerySnapshot::neutral()));
    }

    #[test]
    fn test_neutral_values() {
        let doc = DocumentSnapshot::missing();
        assert!(!doc.exists);
        assert_eq!(doc.id, "");
        assert_eq!(doc.path, "");

        let query = QuerySnapshot::neutral();
        assert_eq!(query.size, 0);
        assert!(query.empty);

        assert!(WriteResult::neutral().write_time.is_some());
    }
}
