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

//! Rewind SQL adapter
//!
//! Record-and-replay interception for a fluent, lazily-executed SQL
//! client: template queries, raw and file-backed statements, cursors,
//! per-row callbacks, transactions with savepoints, reserved
//! connections, and LISTEN/NOTIFY.

pub mod client;
pub mod cursor;
pub mod driver;
pub mod error;
pub mod query;
pub mod result;
pub mod statement;

mod listen;
mod transaction;

pub use client::{ReservedSql, Sql, ADAPTER_NAME};
pub use cursor::Cursor;
pub use driver::{NotificationStream, NullDriver, QueryStream, SqlDriver, StreamMeta};
pub use error::{SqlError, SqlResult};
pub use listen::{ListenHandle, OnListen};
pub use query::{Query, QueryEvent, QueryState};
pub use result::{Column, Row, SqlRows};
pub use statement::{Statement, StatementSource};
