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

//! Driver seam
//!
//! The adapter never talks to the network itself: the host hands it a
//! [`SqlDriver`] wrapping whatever client actually speaks the wire
//! protocol, and the instrumented surface generalizes over it. Replay
//! constructs synthetic instances around [`NullDriver`], which owns no
//! connection and refuses real I/O.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::Stream;
use futures::StreamExt;

use crate::error::{SqlError, SqlResult};
use crate::result::{Column, Row, SqlRows};
use crate::statement::Statement;

/// Metadata known once a streaming query is prepared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamMeta {
    pub command: String,
    pub columns: Vec<Column>,
    pub state: Option<String>,
    pub statement: Option<String>,
}

/// Row batches produced by a streaming query.
pub struct QueryStream {
    pub meta: StreamMeta,
    batches: Pin<Box<dyn Stream<Item = SqlResult<Vec<Row>>> + Send>>,
}

impl QueryStream {
    pub fn new(
        meta: StreamMeta,
        batches: impl Stream<Item = SqlResult<Vec<Row>>> + Send + 'static,
    ) -> Self {
        Self {
            meta,
            batches: Box::pin(batches),
        }
    }

    pub async fn next_batch(&mut self) -> Option<SqlResult<Vec<Row>>> {
        self.batches.next().await
    }
}

impl std::fmt::Debug for QueryStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryStream")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// Server-side notifications for one channel subscription.
pub struct NotificationStream {
    /// Connection state reported by the driver, e.g. `listening`.
    pub state: String,
    payloads: Pin<Box<dyn Stream<Item = String> + Send>>,
}

impl NotificationStream {
    pub fn new(
        state: impl Into<String>,
        payloads: impl Stream<Item = String> + Send + 'static,
    ) -> Self {
        Self {
            state: state.into(),
            payloads: Box::pin(payloads),
        }
    }

    pub async fn next(&mut self) -> Option<String> {
        self.payloads.next().await
    }
}

impl std::fmt::Debug for NotificationStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationStream")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// The surface a real SQL client exposes to the adapter.
///
/// Transaction, savepoint, and reserved-connection handles are drivers
/// themselves: `begin` returns a driver scoped to the transaction,
/// `savepoint` one scoped to the savepoint, and `commit`/`rollback`
/// resolve that scope.
#[async_trait]
pub trait SqlDriver: Send + Sync + std::fmt::Debug {
    async fn query(&self, stmt: &Statement) -> SqlResult<SqlRows>;

    async fn query_stream(&self, stmt: &Statement, batch_size: usize) -> SqlResult<QueryStream>;

    async fn begin(&self) -> SqlResult<Arc<dyn SqlDriver>>;

    async fn commit(&self) -> SqlResult<()>;

    async fn rollback(&self) -> SqlResult<()>;

    async fn savepoint(&self, name: &str) -> SqlResult<Arc<dyn SqlDriver>>;

    async fn reserve(&self) -> SqlResult<Arc<dyn SqlDriver>>;

    async fn release(&self) -> SqlResult<()>;

    async fn listen(&self, channel: &str) -> SqlResult<NotificationStream>;

    async fn unlisten(&self, channel: &str) -> SqlResult<()>;
}

/// Driver behind replay-synthetic connections. Owns nothing; every
/// operation fails, because replay must never reach the network.
#[derive(Debug, Default)]
pub struct NullDriver;

#[async_trait]
impl SqlDriver for NullDriver {
    async fn query(&self, _stmt: &Statement) -> SqlResult<SqlRows> {
        Err(SqlError::SyntheticConnection)
    }

    async fn query_stream(&self, _stmt: &Statement, _batch_size: usize) -> SqlResult<QueryStream> {
        Err(SqlError::SyntheticConnection)
    }

    async fn begin(&self) -> SqlResult<Arc<dyn SqlDriver>> {
        Err(SqlError::SyntheticConnection)
    }

    async fn commit(&self) -> SqlResult<()> {
        Err(SqlError::SyntheticConnection)
    }

    async fn rollback(&self) -> SqlResult<()> {
        Err(SqlError::SyntheticConnection)
    }

    async fn savepoint(&self, _name: &str) -> SqlResult<Arc<dyn SqlDriver>> {
        Err(SqlError::SyntheticConnection)
    }

    async fn reserve(&self) -> SqlResult<Arc<dyn SqlDriver>> {
        Err(SqlError::SyntheticConnection)
    }

    async fn release(&self) -> SqlResult<()> {
        Ok(())
    }

    async fn listen(&self, _channel: &str) -> SqlResult<NotificationStream> {
        Err(SqlError::SyntheticConnection)
    }

    async fn unlisten(&self, _channel: &str) -> SqlResult<()> {
        Ok(())
    }
}
