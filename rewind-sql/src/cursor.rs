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

//! Batched cursors
//!
//! The iterator form of query streaming. The first `next` opens the
//! span (and, when recording, the underlying stream); each subsequent
//! `next` yields a batch; exhaustion ends the span OK. Stopping early
//! ends the span OK too, reporting only the rows actually consumed.
//! Replay serves batches out of a single recorded entry and raises on a
//! missing mock.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures::stream::Stream;
use serde_json::Value;

use rewind_core::{Decision, Operation, SpanHandle};

use crate::driver::{QueryStream, StreamMeta};
use crate::error::{SqlError, SqlResult};
use crate::query::QueryShared;
use crate::result::{Row, SqlRows};

enum CursorInner {
    Idle,
    Passthrough {
        stream: QueryStream,
    },
    Recording {
        stream: QueryStream,
        span: SpanHandle,
        op: Operation,
        meta: StreamMeta,
        rows: Vec<Row>,
    },
    Replaying {
        span: SpanHandle,
        op: Operation,
        recorded_output: Value,
        rows: Vec<Row>,
        pos: usize,
    },
    Ended,
}

/// Async row-batch iterator over a deferred query.
pub struct Cursor {
    shared: Arc<QueryShared>,
    batch_size: usize,
    pending_error: Option<SqlError>,
    inner: CursorInner,
}

impl Cursor {
    pub(crate) fn new(
        shared: Arc<QueryShared>,
        batch_size: usize,
        pending_error: Option<SqlError>,
    ) -> Self {
        Self {
            shared,
            batch_size,
            pending_error,
            inner: CursorInner::Idle,
        }
    }

    /// Fetch the next batch, or `None` when the stream is exhausted.
    pub async fn next(&mut self) -> SqlResult<Option<Vec<Row>>> {
        if let Some(e) = self.pending_error.take() {
            self.inner = CursorInner::Ended;
            self.shared.settle(false);
            return Err(e);
        }
        if matches!(self.inner, CursorInner::Idle) {
            if let Err(e) = self.start().await {
                self.inner = CursorInner::Ended;
                self.shared.settle(false);
                return Err(e);
            }
        }
        match &mut self.inner {
            CursorInner::Ended => Ok(None),
            CursorInner::Passthrough { stream } => {
                let item = stream.next_batch().await;
                self.on_passthrough_item(item)
            }
            CursorInner::Recording { stream, .. } => {
                let item = stream.next_batch().await;
                self.on_recording_item(item)
            }
            CursorInner::Replaying { .. } => self.on_replay_next(),
            CursorInner::Idle => unreachable!("cursor started above"),
        }
    }

    fn on_passthrough_item(
        &mut self,
        item: Option<SqlResult<Vec<Row>>>,
    ) -> SqlResult<Option<Vec<Row>>> {
        match item {
            Some(Ok(batch)) => Ok(Some(batch)),
            Some(Err(e)) => {
                self.inner = CursorInner::Ended;
                self.shared.settle(false);
                Err(e)
            }
            None => {
                self.inner = CursorInner::Ended;
                self.shared.settle(true);
                Ok(None)
            }
        }
    }

    fn on_recording_item(
        &mut self,
        item: Option<SqlResult<Vec<Row>>>,
    ) -> SqlResult<Option<Vec<Row>>> {
        match item {
            Some(Ok(batch)) => {
                if let CursorInner::Recording { rows, .. } = &mut self.inner {
                    rows.extend(batch.iter().cloned());
                }
                Ok(Some(batch))
            }
            Some(Err(e)) => {
                if let CursorInner::Recording { span, op, .. } =
                    std::mem::replace(&mut self.inner, CursorInner::Ended)
                {
                    self.shared
                        .core
                        .kernel
                        .finish_failed(&span, &op, &e.to_string());
                }
                self.shared.settle(false);
                Err(e)
            }
            None => {
                if let CursorInner::Recording {
                    span,
                    op,
                    meta,
                    rows,
                    ..
                } = std::mem::replace(&mut self.inner, CursorInner::Ended)
                {
                    let output = SqlRows::new(rows, meta.command.clone())
                        .with_columns(meta.columns)
                        .normalized();
                    self.shared
                        .core
                        .kernel
                        .finish_recorded(&span, &op, output.to_value());
                }
                self.shared.settle(true);
                Ok(None)
            }
        }
    }

    fn on_replay_next(&mut self) -> SqlResult<Option<Vec<Row>>> {
        let batch = if let CursorInner::Replaying { rows, pos, .. } = &mut self.inner {
            if *pos >= rows.len() {
                None
            } else {
                let end = (*pos + self.batch_size).min(rows.len());
                let slice = rows[*pos..end].to_vec();
                *pos = end;
                Some(slice)
            }
        } else {
            None
        };
        match batch {
            Some(slice) => Ok(Some(slice)),
            None => {
                if let CursorInner::Replaying {
                    span,
                    op,
                    recorded_output,
                    ..
                } = std::mem::replace(&mut self.inner, CursorInner::Ended)
                {
                    self.shared
                        .core
                        .kernel
                        .finish_recorded(&span, &op, recorded_output);
                }
                self.shared.settle(true);
                Ok(None)
            }
        }
    }

    async fn start(&mut self) -> SqlResult<()> {
        let decision = self
            .shared
            .core
            .kernel
            .decide(self.shared.statement.lookup_text());
        match decision {
            Decision::Skip | Decision::Execute => {
                let stmt = self.shared.loaded_statement().await?;
                let stream = self
                    .shared
                    .core
                    .driver
                    .query_stream(&stmt, self.batch_size)
                    .await?;
                self.inner = CursorInner::Passthrough { stream };
                Ok(())
            }
            Decision::Record => {
                self.shared.recorded.store(true, Ordering::SeqCst);
                let _restored = self.shared.ctx.enter();
                let kernel = &self.shared.core.kernel;
                let op = self.shared.operation();
                let span = kernel.open_span(&op.meta, &self.shared.ctx);
                let started: SqlResult<QueryStream> = async {
                    let stmt = self.shared.loaded_statement().await?;
                    self.shared
                        .core
                        .driver
                        .query_stream(&stmt, self.batch_size)
                        .await
                }
                .await;
                match started {
                    Ok(stream) => {
                        let meta = stream.meta.clone();
                        self.inner = CursorInner::Recording {
                            stream,
                            span,
                            op,
                            meta,
                            rows: Vec::new(),
                        };
                        Ok(())
                    }
                    Err(e) => {
                        kernel.finish_failed(&span, &op, &e.to_string());
                        Err(e)
                    }
                }
            }
            Decision::Replay => {
                self.shared.recorded.store(true, Ordering::SeqCst);
                let _restored = self.shared.ctx.enter();
                let kernel = &self.shared.core.kernel;
                let op = self.shared.operation();
                let span = kernel.open_span(&op.meta, &self.shared.ctx);
                match self.shared.replay_entry(Some(&span)).await {
                    Ok((result, recorded_output)) => {
                        self.inner = CursorInner::Replaying {
                            span,
                            op,
                            recorded_output,
                            rows: result.into_rows(),
                            pos: 0,
                        };
                        Ok(())
                    }
                    Err(e) => {
                        kernel.finish_failed(&span, &op, &e.to_string());
                        Err(e)
                    }
                }
            }
        }
    }

    /// Stop early. Ends the span OK, reporting the rows consumed so far;
    /// safe to call more than once.
    pub fn stop(&mut self) {
        match std::mem::replace(&mut self.inner, CursorInner::Ended) {
            CursorInner::Recording {
                span,
                op,
                meta,
                rows,
                ..
            } => {
                let output = SqlRows::new(rows, meta.command.clone())
                    .with_columns(meta.columns)
                    .normalized();
                self.shared
                    .core
                    .kernel
                    .finish_recorded(&span, &op, output.to_value());
                self.shared.settle(true);
            }
            CursorInner::Replaying {
                span,
                op,
                recorded_output,
                rows,
                pos,
            } => {
                let command = recorded_output
                    .get("command")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let consumed: Vec<Row> = rows.into_iter().take(pos).collect();
                let output = SqlRows::new(consumed, command);
                self.shared
                    .core
                    .kernel
                    .finish_recorded(&span, &op, output.to_value());
                self.shared.settle(true);
            }
            CursorInner::Idle | CursorInner::Passthrough { .. } => {
                self.shared.settle(true);
            }
            CursorInner::Ended => {}
        }
    }

    /// Adapt into a `futures::Stream` of batches.
    pub fn into_stream(self) -> impl Stream<Item = SqlResult<Vec<Row>>> {
        futures::stream::unfold(self, |mut cursor| async move {
            match cursor.next().await {
                Ok(Some(batch)) => Some((Ok(batch), cursor)),
                Ok(None) => None,
                Err(e) => Some((Err(e), cursor)),
            }
        })
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        // A dropped, still-open cursor counts as an early stop.
        if !matches!(self.inner, CursorInner::Ended) {
            self.stop();
        }
    }
}
