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

//! Transactions and savepoints
//!
//! `begin` runs a callback against a nested instrumented instance, so
//! queries inside the block record as children of the transaction span.
//! Resolving commits; an error rolls back and re-raises. Replay builds
//! the nested instance over a synthetic connection and lets the recorded
//! outer entry decide between returning the callback's value and
//! throwing the recorded rollback error.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use rewind_core::{Decision, Operation};

use crate::client::Sql;
use crate::driver::NullDriver;
use crate::error::{SqlError, SqlResult};

enum BlockKind {
    Begin,
    Savepoint(String),
}

impl BlockKind {
    fn label(&self) -> &'static str {
        match self {
            BlockKind::Begin => "postgres.transaction",
            BlockKind::Savepoint(_) => "postgres.savepoint",
        }
    }

    fn submodule(&self) -> &'static str {
        match self {
            BlockKind::Begin => "transaction",
            BlockKind::Savepoint(_) => "savepoint",
        }
    }

    fn input_value(&self) -> Value {
        match self {
            BlockKind::Begin => json!({"operation": "begin"}),
            BlockKind::Savepoint(name) => json!({"operation": "savepoint", "name": name}),
        }
    }
}

impl Sql {
    /// Open a transaction and run `cb` against a nested instrumented
    /// instance. Commit on resolve, rollback and re-raise on error.
    pub async fn begin<T, F, Fut>(&self, cb: F) -> SqlResult<T>
    where
        T: Serialize,
        F: FnOnce(Sql) -> Fut,
        Fut: Future<Output = SqlResult<T>>,
    {
        self.run_block(BlockKind::Begin, cb).await
    }

    /// Open a savepoint inside a transaction block. Recursively
    /// instrumented the same way `begin` is.
    pub async fn savepoint<T, F, Fut>(&self, name: Option<&str>, cb: F) -> SqlResult<T>
    where
        T: Serialize,
        F: FnOnce(Sql) -> Fut,
        Fut: Future<Output = SqlResult<T>>,
    {
        if !self.core.in_transaction {
            return Err(SqlError::SavepointOutsideTransaction);
        }
        let name = name.unwrap_or("savepoint").to_string();
        self.run_block(BlockKind::Savepoint(name), cb).await
    }

    async fn run_block<T, F, Fut>(&self, kind: BlockKind, cb: F) -> SqlResult<T>
    where
        T: Serialize,
        F: FnOnce(Sql) -> Fut,
        Fut: Future<Output = SqlResult<T>>,
    {
        match self.core.kernel.decide(kind.label()) {
            Decision::Skip | Decision::Execute => self.run_block_passthrough(kind, cb).await,
            Decision::Record => self.run_block_record(kind, cb).await,
            Decision::Replay => self.run_block_replay(kind, cb).await,
        }
    }

    async fn open_scope(&self, kind: &BlockKind) -> SqlResult<Arc<dyn crate::driver::SqlDriver>> {
        match kind {
            BlockKind::Begin => self.core.driver.begin().await,
            BlockKind::Savepoint(name) => self.core.driver.savepoint(name).await,
        }
    }

    async fn run_block_passthrough<T, F, Fut>(&self, kind: BlockKind, cb: F) -> SqlResult<T>
    where
        F: FnOnce(Sql) -> Fut,
        Fut: Future<Output = SqlResult<T>>,
    {
        let scoped = self.open_scope(&kind).await?;
        let nested = self.derived(scoped.clone(), None, true);
        match cb(nested).await {
            Ok(value) => {
                scoped.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = scoped.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn run_block_record<T, F, Fut>(&self, kind: BlockKind, cb: F) -> SqlResult<T>
    where
        T: Serialize,
        F: FnOnce(Sql) -> Fut,
        Fut: Future<Output = SqlResult<T>>,
    {
        let ctx = self.core.creation_context();
        let _restored = ctx.enter();
        let kernel = &self.core.kernel;
        let op = Operation::new(
            self.core.span_meta(kind.label(), kind.submodule()),
            kind.input_value(),
        );
        let span = kernel.open_span(&op.meta, &ctx);

        let scoped = match self.open_scope(&kind).await {
            Ok(scoped) => scoped,
            Err(e) => {
                kernel.finish_failed(&span, &op, &e.to_string());
                return Err(e);
            }
        };
        let nested = self.derived(scoped.clone(), Some(span.child_context()), true);

        match cb(nested).await {
            Ok(value) => {
                if let Err(e) = scoped.commit().await {
                    if let Err(rollback_err) = scoped.rollback().await {
                        tracing::warn!(error = %rollback_err, "rollback after failed commit failed");
                    }
                    kernel.finish_failed(&span, &op, &e.to_string());
                    return Err(e);
                }
                let result_value = serde_json::to_value(&value).unwrap_or(Value::Null);
                kernel.finish_recorded(
                    &span,
                    &op,
                    json!({"status": "committed", "result": result_value}),
                );
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = scoped.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                kernel.finish_recorded(
                    &span,
                    &op,
                    json!({"status": "rolled_back", "error": e.to_string()}),
                );
                Err(e)
            }
        }
    }

    async fn run_block_replay<T, F, Fut>(&self, kind: BlockKind, cb: F) -> SqlResult<T>
    where
        F: FnOnce(Sql) -> Fut,
        Fut: Future<Output = SqlResult<T>>,
    {
        let ctx = self.core.creation_context();
        let _restored = ctx.enter();
        let kernel = &self.core.kernel;
        let op = Operation::new(
            self.core.span_meta(kind.label(), kind.submodule()),
            kind.input_value(),
        );
        let span = kernel.open_span(&op.meta, &ctx);

        let Some(entry) = kernel.find_mock(&span, &op).await else {
            let miss = SqlError::mock_miss(kind.label(), "BEGIN");
            kernel.finish_failed(&span, &op, &miss.to_string());
            return Err(miss);
        };

        let nested = self.derived(Arc::new(NullDriver), Some(span.child_context()), true);
        let cb_result = cb(nested).await;

        let status = entry
            .result
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("committed");
        if status == "rolled_back" {
            let message = entry
                .result
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("transaction rolled back")
                .to_string();
            kernel.finish_recorded(&span, &op, entry.result.clone());
            return Err(SqlError::RolledBack(message));
        }

        match cb_result {
            Ok(value) => {
                kernel.finish_recorded(&span, &op, entry.result.clone());
                Ok(value)
            }
            Err(e) => {
                // The callback failed against mock data; surface it.
                kernel.finish_failed(&span, &op, &e.to_string());
                Err(e)
            }
        }
    }
}
