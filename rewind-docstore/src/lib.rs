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

//! Rewind document-store adapter
//!
//! Record-and-replay interception for get/create/set/update/delete/add
//! and queries over document-addressed entities, with snapshot facades
//! materialized for replay.

pub mod adapter;
pub mod driver;
pub mod error;
pub mod types;

pub use adapter::{DocStore, DocStoreSettings, ADAPTER_NAME};
pub use driver::{DocStoreDriver, NullDocStoreDriver};
pub use error::{DocError, DocResult};
pub use types::{DocChange, DocRef, DocumentSnapshot, QuerySnapshot, Timestamp, WriteResult};
