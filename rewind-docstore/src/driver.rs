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

//! Driver seam for document-addressed stores
//!
//! Address resolution (`doc`) is synchronous in the client libraries
//! this adapter models, so it is synchronous here too; everything else
//! suspends.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{DocError, DocResult};
use crate::types::{DocRef, DocumentSnapshot, QuerySnapshot, WriteResult};

/// The surface a real document-store client exposes to the adapter.
#[async_trait]
pub trait DocStoreDriver: Send + Sync + std::fmt::Debug {
    async fn get(&self, path: &str) -> DocResult<DocumentSnapshot>;

    async fn create(&self, path: &str, data: Value) -> DocResult<WriteResult>;

    async fn set(&self, path: &str, data: Value, merge: bool) -> DocResult<WriteResult>;

    async fn update(&self, path: &str, data: Value) -> DocResult<WriteResult>;

    async fn delete(&self, path: &str) -> DocResult<WriteResult>;

    /// Append a document with a generated id; returns its address.
    async fn add(&self, collection: &str, data: Value) -> DocResult<DocRef>;

    /// Resolve a document address. Synchronous in the source library.
    fn doc(&self, path: &str) -> DocResult<DocRef>;

    async fn query(&self, collection: &str, query: Value) -> DocResult<QuerySnapshot>;
}

/// Driver behind replay-synthetic clients; refuses all I/O.
#[derive(Debug, Default)]
pub struct NullDocStoreDriver;

#[async_trait]
impl DocStoreDriver for NullDocStoreDriver {
    async fn get(&self, _path: &str) -> DocResult<DocumentSnapshot> {
        Err(DocError::SyntheticClient)
    }

    async fn create(&self, _path: &str, _data: Value) -> DocResult<WriteResult> {
        Err(DocError::SyntheticClient)
    }

    async fn set(&self, _path: &str, _data: Value, _merge: bool) -> DocResult<WriteResult> {
        Err(DocError::SyntheticClient)
    }

    async fn update(&self, _path: &str, _data: Value) -> DocResult<WriteResult> {
        Err(DocError::SyntheticClient)
    }

    async fn delete(&self, _path: &str) -> DocResult<WriteResult> {
        Err(DocError::SyntheticClient)
    }

    async fn add(&self, _collection: &str, _data: Value) -> DocResult<DocRef> {
        Err(DocError::SyntheticClient)
    }

    fn doc(&self, _path: &str) -> DocResult<DocRef> {
        Err(DocError::SyntheticClient)
    }

    async fn query(&self, _collection: &str, _query: Value) -> DocResult<QuerySnapshot> {
        Err(DocError::SyntheticClient)
    }
}
