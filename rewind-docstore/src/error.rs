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

//! Document-store adapter error types

use thiserror::Error;

/// Result type for document-store operations
pub type DocResult<T> = Result<T, DocError>;

/// Errors surfaced by the document-store adapter
#[derive(Debug, Error)]
pub enum DocError {
    /// The underlying store client failed
    #[error("store error: {0}")]
    Driver(String),

    /// A recorded snapshot could not be rehydrated
    #[error("malformed recorded snapshot: {0}")]
    MalformedRecording(String),

    /// I/O attempted on a replay-synthetic client
    #[error("client is replay-synthetic, no I/O available")]
    SyntheticClient,
}
