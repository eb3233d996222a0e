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

//! SQL statements
//!
//! A statement is what a query executes: text assembled from template
//! fragments with `$n` placeholders, raw text handed to `unsafe_query`,
//! or a file reference whose text loads at execution time. The statement
//! also produces the input value the fingerprint is computed from; a
//! file statement fingerprints on its path, not its contents.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{SqlError, SqlResult};

/// Where a statement's text came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum StatementSource {
    /// Built from template fragments and interpolated parameters.
    Template,
    /// Raw SQL passed through `unsafe_query`.
    Unsafe,
    /// SQL loaded from a file at execution time.
    File { path: String },
}

/// One executable SQL statement with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub text: String,
    pub params: Vec<Value>,
    pub source: StatementSource,
}

impl Statement {
    /// Assemble a template statement: `n` fragments and `n-1` parameters
    /// become `f[0] $1 f[1] $2 ... $n-1 f[n-1]`.
    pub fn template(fragments: &[&str], params: Vec<Value>) -> Self {
        let mut text = String::new();
        for (i, fragment) in fragments.iter().enumerate() {
            text.push_str(fragment);
            if i < params.len() {
                text.push_str(&format!("${}", i + 1));
            }
        }
        Self {
            text,
            params,
            source: StatementSource::Template,
        }
    }

    pub fn raw(text: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            text: text.into(),
            params,
            source: StatementSource::Unsafe,
        }
    }

    pub fn file(path: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            text: String::new(),
            params,
            source: StatementSource::File { path: path.into() },
        }
    }

    /// Load file-backed text if it has not been loaded yet. A no-op for
    /// template and raw statements.
    pub async fn ensure_loaded(&mut self) -> SqlResult<()> {
        if let StatementSource::File { path } = &self.source {
            if self.text.is_empty() {
                self.text = tokio::fs::read_to_string(path).await.map_err(|source| {
                    SqlError::FileLoad {
                        path: path.clone(),
                        source,
                    }
                })?;
            }
        }
        Ok(())
    }

    /// The text replay matching keys on: the query text, or the path for
    /// file statements.
    pub fn lookup_text(&self) -> &str {
        match &self.source {
            StatementSource::File { path } => path,
            _ => &self.text,
        }
    }

    /// The input value recorded for this statement.
    pub fn input_value(&self) -> Value {
        let mut v = json!({
            "query": self.lookup_text(),
            "parameters": self.params,
        });
        if let StatementSource::Unsafe = self.source {
            v["unsafe"] = Value::Bool(true);
        }
        if let StatementSource::File { path } = &self.source {
            v["file"] = Value::String(path.clone());
        }
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_interleaving() {
        let stmt = Statement::template(
            &["SELECT * FROM t WHERE id = ", " AND name = ", ""],
            vec![json!(42), json!("jo")],
        );
        assert_eq!(stmt.text, "SELECT * FROM t WHERE id = $1 AND name = $2");
        assert_eq!(stmt.params.len(), 2);
    }

    #[test]
    fn test_template_no_params() {
        let stmt = Statement::template(&["SELECT 1"], vec![]);
        assert_eq!(stmt.text, "SELECT 1");
    }

    #[test]
    fn test_file_fingerprints_on_path() {
        let stmt = Statement::file("queries/users.sql", vec![json!(1)]);
        let input = stmt.input_value();
        assert_eq!(input["query"], "queries/users.sql");
        assert_eq!(input["file"], "queries/users.sql");
    }

    #[tokio::test]
    async fn test_file_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.sql");
        std::fs::write(&path, "SELECT 2").unwrap();

        let mut stmt = Statement::file(path.to_string_lossy(), vec![]);
        stmt.ensure_loaded().await.unwrap();
        assert_eq!(stmt.text, "SELECT 2");

        let mut missing = Statement::file("/nonexistent/q.sql", vec![]);
        assert!(matches!(
            missing.ensure_loaded().await,
            Err(SqlError::FileLoad { .. })
        ));
    }

    #[test]
    fn test_unsafe_marker_in_input() {
        let stmt = Statement::raw("DROP TABLE t", vec![]);
        assert_eq!(stmt.input_value()["unsafe"], Value::Bool(true));
    }
}
