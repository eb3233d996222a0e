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

//! Query results
//!
//! The native result surface is row-array-shaped with metadata riding
//! alongside: consumer code iterates the rows and still reads `count`,
//! `command`, `columns`, `state`, `statement`. For recording the whole
//! thing flattens into one ordinary JSON object; replay rehydrates that
//! object back into the same surface, bit-for-bit for the consumer.

use std::ops::Deref;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{SqlError, SqlResult};

/// One result row.
pub type Row = Map<String, Value>;

/// Column descriptor reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
}

/// A row array with result metadata.
///
/// Dereferences to `[Row]` so it iterates like the plain array the
/// driver hands back; the metadata accessors sit next to it the way the
/// native client exposes them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SqlRows {
    rows: Vec<Row>,
    count: u64,
    command: String,
    columns: Option<Vec<Column>>,
    state: Option<String>,
    statement: Option<String>,
}

impl SqlRows {
    /// Build a result whose count is the row count (SELECT-shaped).
    pub fn new(rows: Vec<Row>, command: impl Into<String>) -> Self {
        let count = rows.len() as u64;
        Self {
            rows,
            count,
            command: command.into(),
            columns: None,
            state: None,
            statement: None,
        }
    }

    /// Build a result with an explicit affected-row count.
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    pub fn with_columns(mut self, columns: Vec<Column>) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn with_statement(mut self, statement: impl Into<String>) -> Self {
        self.statement = Some(statement.into());
        self
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn columns(&self) -> Option<&[Column]> {
        self.columns.as_deref()
    }

    pub fn state(&self) -> Option<&str> {
        self.state.as_deref()
    }

    pub fn statement(&self) -> Option<&str> {
        self.statement.as_deref()
    }

    /// Normalize binary leaves to UTF-8 strings. Applied before
    /// serialization so byte buffers and their already-serialized
    /// `{type: "Buffer", data: [...]}` form come out identically.
    pub fn normalized(mut self) -> Self {
        for row in &mut self.rows {
            for (_, value) in row.iter_mut() {
                normalize_binary(value);
            }
        }
        self
    }

    /// Flatten into the recorded JSON object
    /// `{rows, count, command, columns?, state?, statement?}`.
    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        out.insert(
            "rows".to_string(),
            Value::Array(self.rows.iter().cloned().map(Value::Object).collect()),
        );
        out.insert("count".to_string(), Value::from(self.count));
        out.insert("command".to_string(), Value::String(self.command.clone()));
        if let Some(columns) = &self.columns {
            if let Ok(v) = serde_json::to_value(columns) {
                out.insert("columns".to_string(), v);
            }
        }
        if let Some(state) = &self.state {
            out.insert("state".to_string(), Value::String(state.clone()));
        }
        if let Some(statement) = &self.statement {
            out.insert("statement".to_string(), Value::String(statement.clone()));
        }
        Value::Object(out)
    }

    /// Rehydrate from the recorded JSON object.
    pub fn from_value(value: &Value) -> SqlResult<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| SqlError::MalformedRecording("result is not an object".into()))?;
        let rows = obj
            .get("rows")
            .and_then(Value::as_array)
            .ok_or_else(|| SqlError::MalformedRecording("missing rows array".into()))?
            .iter()
            .map(|r| {
                r.as_object()
                    .cloned()
                    .ok_or_else(|| SqlError::MalformedRecording("row is not an object".into()))
            })
            .collect::<SqlResult<Vec<Row>>>()?;
        let count = obj
            .get("count")
            .and_then(Value::as_u64)
            .unwrap_or(rows.len() as u64);
        let command = obj
            .get("command")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let columns = match obj.get("columns") {
            Some(v) => Some(
                serde_json::from_value(v.clone())
                    .map_err(|e| SqlError::MalformedRecording(e.to_string()))?,
            ),
            None => None,
        };
        Ok(Self {
            rows,
            count,
            command,
            columns,
            state: obj.get("state").and_then(Value::as_str).map(String::from),
            statement: obj
                .get("statement")
                .and_then(Value::as_str)
                .map(String::from),
        })
    }
}

impl Deref for SqlRows {
    type Target = [Row];

    fn deref(&self) -> &Self::Target {
        &self.rows
    }
}

impl<'a> IntoIterator for &'a SqlRows {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

impl IntoIterator for SqlRows {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

/// Rewrite a binary leaf (`{type: "Buffer", data: [...]}`) as a UTF-8
/// string, recursing into containers.
fn normalize_binary(value: &mut Value) {
    if let Some(bytes) = as_buffer(value) {
        *value = Value::String(String::from_utf8_lossy(&bytes).into_owned());
        return;
    }
    match value {
        Value::Array(items) => {
            for item in items {
                normalize_binary(item);
            }
        }
        Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                normalize_binary(v);
            }
        }
        _ => {}
    }
}

fn as_buffer(value: &Value) -> Option<Vec<u8>> {
    let obj = value.as_object()?;
    if obj.len() != 2 || obj.get("type")?.as_str()? != "Buffer" {
        return None;
    }
    obj.get("data")?
        .as_array()?
        .iter()
        .map(|n| n.as_u64().map(|b| b as u8))
        .collect()
}
