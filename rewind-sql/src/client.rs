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

//! Instrumented SQL client
//!
//! [`Sql`] wraps a [`SqlDriver`] with the interception kernel. The host
//! constructs it explicitly around its real client; nested instances
//! (transactions, savepoints, reserved connections) are derived from it
//! and carry the same instrumentation. During replay, derived instances
//! are synthetic: they own no connection and resolve queries from the
//! mock store.

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};

use rewind_core::{Decision, Rewind, SpanKind, SpanMeta, TraceContext};

use crate::driver::{NullDriver, SqlDriver};
use crate::error::SqlResult;
use crate::query::Query;
use crate::result::SqlRows;
use crate::statement::Statement;

/// Gate and transform-config key for this adapter.
pub const ADAPTER_NAME: &str = "postgres";

pub(crate) const PACKAGE_TYPE: &str = "pg";
pub(crate) const INSTRUMENTATION_NAME: &str = "PostgresAdapter";

pub(crate) struct ClientCore {
    pub(crate) kernel: rewind_core::AdapterKernel,
    pub(crate) driver: Arc<dyn SqlDriver>,
    /// Fixed creation context for instances living inside a transaction
    /// span; top-level instances capture the ambient context per query.
    pub(crate) ctx_override: Option<TraceContext>,
    pub(crate) in_transaction: bool,
}

impl ClientCore {
    pub(crate) fn span_meta(&self, name: &str, submodule: &str) -> SpanMeta {
        SpanMeta {
            name: name.to_string(),
            package_name: ADAPTER_NAME.to_string(),
            instrumentation_name: INSTRUMENTATION_NAME.to_string(),
            submodule: submodule.to_string(),
            package_type: PACKAGE_TYPE.to_string(),
            kind: SpanKind::Client,
        }
    }

    /// Creation-time context for a new query on this instance.
    pub(crate) fn creation_context(&self) -> TraceContext {
        self.ctx_override.unwrap_or_else(TraceContext::capture)
    }
}

impl std::fmt::Debug for ClientCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCore")
            .field("in_transaction", &self.in_transaction)
            .finish_non_exhaustive()
    }
}

/// The instrumented client. Clones share the underlying connection and
/// instrumentation.
#[derive(Debug, Clone)]
pub struct Sql {
    pub(crate) core: Arc<ClientCore>,
}

impl Sql {
    /// Wrap a driver with the runtime's `postgres` adapter kernel.
    pub fn new(rewind: &Rewind, driver: Arc<dyn SqlDriver>) -> Self {
        Self {
            core: Arc::new(ClientCore {
                kernel: rewind.adapter(ADAPTER_NAME),
                driver,
                ctx_override: None,
                in_transaction: false,
            }),
        }
    }

    pub(crate) fn derived(
        &self,
        driver: Arc<dyn SqlDriver>,
        ctx_override: Option<TraceContext>,
        in_transaction: bool,
    ) -> Self {
        Self {
            core: Arc::new(ClientCore {
                kernel: self.core.kernel.clone(),
                driver,
                ctx_override,
                in_transaction,
            }),
        }
    }

    /// Whether this instance lives inside a transaction block.
    pub fn is_transaction(&self) -> bool {
        self.core.in_transaction
    }

    /// Build a deferred query from template fragments and interpolated
    /// parameters: `n` fragments, `n-1` values.
    pub fn query(&self, fragments: &[&str], params: Vec<Value>) -> Query {
        Query::new(self.core.clone(), Statement::template(fragments, params))
    }

    /// Build a deferred query from raw SQL text.
    pub fn unsafe_query(&self, text: &str, params: Vec<Value>) -> Query {
        Query::new(self.core.clone(), Statement::raw(text, params))
    }

    /// Build a deferred query whose SQL loads from a file at execution
    /// time. Replay matching keys on the path.
    pub fn file(&self, path: &str, params: Vec<Value>) -> Query {
        Query::new(self.core.clone(), Statement::file(path, params))
    }

    /// Fire a server-side notification. Routed through the instrumented
    /// query surface, so it is observed like any other query.
    pub async fn notify(&self, channel: &str, payload: &str) -> SqlResult<SqlRows> {
        self.query(
            &["SELECT pg_notify(", ", ", ")"],
            vec![json!(channel), json!(payload)],
        )
        .await
    }

    /// Pin a single connection. During replay no connection is opened;
    /// the reservation is synthetic and `release` is a no-op.
    pub async fn reserve(&self) -> SqlResult<ReservedSql> {
        match self.core.kernel.decide("postgres.reserve") {
            Decision::Replay => Ok(ReservedSql {
                sql: self.derived(Arc::new(NullDriver), None, self.core.in_transaction),
                raw: None,
                released: AtomicBool::new(false),
            }),
            _ => {
                let reserved = self.core.driver.reserve().await?;
                Ok(ReservedSql {
                    sql: self.derived(reserved.clone(), None, self.core.in_transaction),
                    raw: Some(reserved),
                    released: AtomicBool::new(false),
                })
            }
        }
    }
}

/// A pinned connection, released explicitly.
#[derive(Debug)]
pub struct ReservedSql {
    sql: Sql,
    raw: Option<Arc<dyn SqlDriver>>,
    released: AtomicBool,
}

impl ReservedSql {
    pub fn sql(&self) -> &Sql {
        &self.sql
    }

    /// Whether this reservation is replay-synthetic.
    pub fn is_synthetic(&self) -> bool {
        self.raw.is_none()
    }

    /// Return the connection to the pool. Safe to call repeatedly; only
    /// the first call reaches the driver.
    pub async fn release(&self) -> SqlResult<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(raw) = &self.raw {
            raw.release().await?;
        }
        Ok(())
    }
}

impl Deref for ReservedSql {
    type Target = Sql;

    fn deref(&self) -> &Self::Target {
        &self.sql
    }
}
