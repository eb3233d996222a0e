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

//! SQL adapter error types

use thiserror::Error;

use crate::query::{QueryEvent, QueryState};

/// Result type for SQL adapter operations
pub type SqlResult<T> = Result<T, SqlError>;

/// Errors surfaced by the SQL adapter
#[derive(Debug, Error)]
pub enum SqlError {
    /// The underlying driver failed
    #[error("driver error: {0}")]
    Driver(String),

    /// Replay found no recording for the query
    #[error("no matching recording for {operation}: {query}")]
    NoMatchingMock { operation: String, query: String },

    /// A replayed or recorded transaction rolled back
    #[error("transaction rolled back: {0}")]
    RolledBack(String),

    /// Execution surface invoked in a state that cannot accept it
    #[error("invalid query transition: {state:?} -> {event:?}")]
    InvalidTransition {
        state: QueryState,
        event: QueryEvent,
    },

    /// A `file()` query could not load its SQL source
    #[error("failed to load SQL file {path}: {source}")]
    FileLoad {
        path: String,
        source: std::io::Error,
    },

    /// Savepoints only exist inside a transaction
    #[error("savepoint requires an open transaction")]
    SavepointOutsideTransaction,

    /// I/O attempted on a replay-synthetic connection
    #[error("connection is replay-synthetic, no I/O available")]
    SyntheticConnection,

    /// A recorded result could not be rehydrated
    #[error("malformed recorded result: {0}")]
    MalformedRecording(String),
}

impl SqlError {
    pub(crate) fn mock_miss(operation: &str, query: &str) -> Self {
        SqlError::NoMatchingMock {
            operation: operation.to_string(),
            query: query.to_string(),
        }
    }
}
