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

//! Deferred queries
//!
//! A [`Query`] is constructed before it executes and does nothing until
//! one of its execution surfaces is invoked: awaiting it, streaming it
//! through a cursor, walking it row-by-row, or kicking it off eagerly
//! with [`Query::execute`]. The trace context is captured at
//! construction, so the span a surface eventually opens parents to where
//! the query was *created*, not where it happened to resolve.
//!
//! One query produces at most one span, whichever surfaces fire; the
//! `recorded` and `for_each_called` flags keep late awaiters from
//! double-reporting.

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use rewind_core::{canonicalize, Decision, MockQuery, Scope, TraceContext};

use crate::client::ClientCore;
use crate::cursor::Cursor;
use crate::driver::StreamMeta;
use crate::error::{SqlError, SqlResult};
use crate::result::{Row, SqlRows};
use crate::statement::{Statement, StatementSource};

/// Execution state of a deferred query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Created,
    Executing,
    Streaming,
    Ended,
}

/// Events that move a query between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryEvent {
    Await,
    Execute,
    Cursor,
    ForEach,
    Finish,
    Fail,
}

impl QueryState {
    pub fn transition(self, event: QueryEvent) -> Result<QueryState, SqlError> {
        use QueryEvent::*;
        use QueryState::*;

        let next = match (self, event) {
            (Created, Await) => Executing,
            (Created, Execute) => Executing,
            (Executing, Await) => Executing,
            (Created, Cursor) => Streaming,
            (Created, ForEach) => Streaming,
            (Executing, Finish) | (Streaming, Finish) => Ended,
            (_, Fail) => Ended,
            (state, event) => return Err(SqlError::InvalidTransition { state, event }),
        };
        Ok(next)
    }
}

pub(crate) struct QueryShared {
    pub(crate) core: Arc<ClientCore>,
    pub(crate) statement: Statement,
    /// Creation-time trace context; every surface restores it.
    pub(crate) ctx: TraceContext,
    pub(crate) state: Mutex<QueryState>,
    /// One-shot span flag: the first surface to fire owns the span.
    pub(crate) recorded: AtomicBool,
    /// Set by `for_each` so a later await never double-reports.
    pub(crate) for_each_called: AtomicBool,
    /// Result of an eager `execute()` kickoff, harvested at await time.
    pub(crate) eager: Mutex<Option<JoinHandle<SqlResult<SqlRows>>>>,
}

impl QueryShared {
    pub(crate) fn transition(&self, event: QueryEvent) -> SqlResult<()> {
        let mut state = self.state.lock();
        *state = state.transition(event)?;
        Ok(())
    }

    pub(crate) fn settle(&self, ok: bool) {
        let event = if ok { QueryEvent::Finish } else { QueryEvent::Fail };
        let mut state = self.state.lock();
        if let Ok(next) = state.transition(event) {
            *state = next;
        }
    }

    /// The operation label replay errors name, e.g. `postgres.query`.
    pub(crate) fn operation_label(&self) -> &'static str {
        match self.statement.source {
            StatementSource::Template => "postgres.query",
            StatementSource::Unsafe => "postgres.unsafe",
            StatementSource::File { .. } => "postgres.file",
        }
    }

    pub(crate) fn submodule(&self) -> &'static str {
        match self.statement.source {
            StatementSource::Template => "query",
            StatementSource::Unsafe => "unsafe",
            StatementSource::File { .. } => "file",
        }
    }

    pub(crate) fn operation(&self) -> rewind_core::Operation {
        rewind_core::Operation::new(
            self.core
                .span_meta(self.operation_label(), self.submodule()),
            self.statement.input_value(),
        )
    }

    /// Statement with file-backed text loaded, ready for the driver.
    pub(crate) async fn loaded_statement(&self) -> SqlResult<Statement> {
        let mut stmt = self.statement.clone();
        stmt.ensure_loaded().await?;
        Ok(stmt)
    }

    /// Harvest an eager kickoff if there was one, otherwise run the
    /// query on the driver now.
    pub(crate) async fn take_eager_or_execute(&self) -> SqlResult<SqlRows> {
        let pending = self.eager.lock().take();
        match pending {
            Some(handle) => match handle.await {
                Ok(result) => result,
                Err(e) => Err(SqlError::Driver(format!("eager execution failed: {e}"))),
            },
            None => {
                let stmt = self.loaded_statement().await?;
                self.core.driver.query(&stmt).await
            }
        }
    }

    /// Replay lookup shared by the awaited and degenerate second-await
    /// paths.
    pub(crate) async fn replay_entry(
        &self,
        span: Option<&rewind_core::SpanHandle>,
    ) -> SqlResult<(SqlRows, serde_json::Value)> {
        let op = self.operation();
        let entry = match span {
            Some(span) => self.core.kernel.find_mock(span, &op).await,
            None => {
                let query = MockQuery::new(
                    Scope::from(&op.meta),
                    op.meta.name.clone(),
                    canonicalize(&op.input_value),
                );
                self.core.kernel.store().find(&query).await
            }
        };
        match entry {
            Some(entry) => {
                let rows = SqlRows::from_value(&entry.result)?;
                Ok((rows, entry.result))
            }
            None => Err(SqlError::mock_miss(
                self.operation_label(),
                self.statement.lookup_text(),
            )),
        }
    }
}

async fn run_awaited(shared: Arc<QueryShared>) -> SqlResult<SqlRows> {
    shared.transition(QueryEvent::Await)?;
    let decision = shared
        .core
        .kernel
        .decide(shared.statement.lookup_text());

    let result = match decision {
        Decision::Skip | Decision::Execute => shared.take_eager_or_execute().await,
        Decision::Record => run_awaited_record(&shared).await,
        Decision::Replay => run_awaited_replay(&shared).await,
    };
    shared.settle(result.is_ok());
    result
}

async fn run_awaited_record(shared: &Arc<QueryShared>) -> SqlResult<SqlRows> {
    let already_reported = shared.recorded.swap(true, Ordering::SeqCst)
        || shared.for_each_called.load(Ordering::SeqCst);
    if already_reported {
        // Another surface owns the span; run the query plainly.
        return shared.take_eager_or_execute().await;
    }

    let _restored = shared.ctx.enter();
    let kernel = &shared.core.kernel;
    let op = shared.operation();
    let span = kernel.open_span(&op.meta, &shared.ctx);
    let result = {
        let _child = span.child_context().enter();
        shared.take_eager_or_execute().await
    };
    match &result {
        Ok(rows) => {
            kernel.finish_recorded(&span, &op, rows.clone().normalized().to_value());
        }
        Err(e) => kernel.finish_failed(&span, &op, &e.to_string()),
    }
    result
}

async fn run_awaited_replay(shared: &Arc<QueryShared>) -> SqlResult<SqlRows> {
    if shared.recorded.swap(true, Ordering::SeqCst)
        || shared.for_each_called.load(Ordering::SeqCst)
    {
        // Late second resolution: serve the mock without a second span.
        return shared.replay_entry(None).await.map(|(rows, _)| rows);
    }

    let _restored = shared.ctx.enter();
    let kernel = &shared.core.kernel;
    let op = shared.operation();
    let span = kernel.open_span(&op.meta, &shared.ctx);
    match shared.replay_entry(Some(&span)).await {
        Ok((rows, recorded_output)) => {
            kernel.finish_recorded(&span, &op, recorded_output);
            Ok(rows)
        }
        Err(e) => {
            kernel.finish_failed(&span, &op, &e.to_string());
            Err(e)
        }
    }
}

/// A lazily-executed query.
pub struct Query {
    pub(crate) shared: Arc<QueryShared>,
}

impl Query {
    pub(crate) fn new(core: Arc<ClientCore>, statement: Statement) -> Self {
        let ctx = core.creation_context();
        Self {
            shared: Arc::new(QueryShared {
                core,
                statement,
                ctx,
                state: Mutex::new(QueryState::Created),
                recorded: AtomicBool::new(false),
                for_each_called: AtomicBool::new(false),
                eager: Mutex::new(None),
            }),
        }
    }

    /// Current state, for callers that track query lifecycles.
    pub fn state(&self) -> QueryState {
        *self.shared.state.lock()
    }

    /// The assembled statement text.
    pub fn statement_text(&self) -> &str {
        &self.shared.statement.text
    }

    /// Kick off the underlying I/O eagerly. During replay this is a
    /// no-op returning the query itself; awaiting it still resolves
    /// through the mock store.
    pub fn execute(self) -> Query {
        if self.shared.transition(QueryEvent::Execute).is_err() {
            return self;
        }
        let decision = self
            .shared
            .core
            .kernel
            .decide(self.shared.statement.lookup_text());
        if decision != Decision::Replay {
            let shared = self.shared.clone();
            let handle = tokio::spawn(async move {
                let stmt = shared.loaded_statement().await?;
                shared.core.driver.query(&stmt).await
            });
            *self.shared.eager.lock() = Some(handle);
        }
        self
    }

    /// Stream the result in batches of `batch_size` rows (minimum 1).
    /// The span opens on the first `next` and ends when the batches run
    /// out or the cursor is stopped early.
    pub fn cursor(self, batch_size: usize) -> Cursor {
        let pending_error = self.shared.transition(QueryEvent::Cursor).err();
        Cursor::new(self.shared, batch_size.max(1), pending_error)
    }

    /// Run `cb` once per row batch, to completion.
    pub async fn cursor_each<F>(self, batch_size: usize, mut cb: F) -> SqlResult<()>
    where
        F: FnMut(&[Row]),
    {
        let mut cursor = self.cursor(batch_size);
        while let Some(batch) = cursor.next().await? {
            cb(&batch);
        }
        Ok(())
    }

    /// Invoke `cb` once per row. Terminal: this surface owns the span,
    /// and a later await will not open another.
    pub async fn for_each<F>(self, mut cb: F) -> SqlResult<()>
    where
        F: FnMut(&Row, &StreamMeta),
    {
        let shared = self.shared;
        shared.for_each_called.store(true, Ordering::SeqCst);
        shared.transition(QueryEvent::ForEach)?;

        let decision = shared.core.kernel.decide(shared.statement.lookup_text());
        let result = match decision {
            Decision::Skip | Decision::Execute => {
                let stmt = shared.loaded_statement().await?;
                let mut stream = shared.core.driver.query_stream(&stmt, 1).await?;
                let meta = stream.meta.clone();
                loop {
                    match stream.next_batch().await {
                        Some(Ok(batch)) => {
                            for row in &batch {
                                cb(row, &meta);
                            }
                        }
                        Some(Err(e)) => break Err(e),
                        None => break Ok(()),
                    }
                }
            }
            Decision::Record => for_each_record(&shared, &mut cb).await,
            Decision::Replay => for_each_replay(&shared, &mut cb).await,
        };
        shared.settle(result.is_ok());
        result
    }
}

async fn for_each_record<F>(shared: &Arc<QueryShared>, cb: &mut F) -> SqlResult<()>
where
    F: FnMut(&Row, &StreamMeta),
{
    shared.recorded.store(true, Ordering::SeqCst);
    let _restored = shared.ctx.enter();
    let kernel = &shared.core.kernel;
    let op = shared.operation();
    let span = kernel.open_span(&op.meta, &shared.ctx);

    let streamed: SqlResult<(Vec<Row>, StreamMeta)> = async {
        let stmt = shared.loaded_statement().await?;
        let mut stream = shared.core.driver.query_stream(&stmt, 1).await?;
        let meta = stream.meta.clone();
        let mut rows = Vec::new();
        while let Some(batch) = stream.next_batch().await {
            let batch = batch?;
            for row in batch {
                cb(&row, &meta);
                rows.push(row);
            }
        }
        Ok((rows, meta))
    }
    .await;

    match streamed {
        Ok((rows, meta)) => {
            let result = SqlRows::new(rows, meta.command.clone())
                .with_columns(meta.columns.clone())
                .normalized();
            kernel.finish_recorded(&span, &op, result.to_value());
            Ok(())
        }
        Err(e) => {
            kernel.finish_failed(&span, &op, &e.to_string());
            Err(e)
        }
    }
}

async fn for_each_replay<F>(shared: &Arc<QueryShared>, cb: &mut F) -> SqlResult<()>
where
    F: FnMut(&Row, &StreamMeta),
{
    shared.recorded.store(true, Ordering::SeqCst);
    let _restored = shared.ctx.enter();
    let kernel = &shared.core.kernel;
    let op = shared.operation();
    let span = kernel.open_span(&op.meta, &shared.ctx);

    match shared.replay_entry(Some(&span)).await {
        Ok((rows, recorded_output)) => {
            let meta = StreamMeta {
                command: rows.command().to_string(),
                columns: rows.columns().map(<[_]>::to_vec).unwrap_or_default(),
                state: rows.state().map(String::from),
                statement: rows.statement().map(String::from),
            };
            for row in rows.rows() {
                cb(row, &meta);
            }
            kernel.finish_recorded(&span, &op, recorded_output);
            Ok(())
        }
        Err(e) => {
            kernel.finish_failed(&span, &op, &e.to_string());
            Err(e)
        }
    }
}

impl IntoFuture for Query {
    type Output = SqlResult<SqlRows>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(run_awaited(self.shared))
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("statement", &self.shared.statement.text)
            .field("state", &*self.shared.state.lock())
            .finish_non_exhaustive()
    }
}
