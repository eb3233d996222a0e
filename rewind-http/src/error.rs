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

//! HTTP adapter error types

use thiserror::Error;

/// Result type for HTTP adapter operations
pub type HttpResult<T> = Result<T, HttpError>;

/// Errors surfaced by the HTTP adapter
#[derive(Debug, Error)]
pub enum HttpError {
    /// The underlying request primitive failed
    #[error("request failed: {0}")]
    Executor(String),

    /// The request could not be constructed
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A recorded response could not be rehydrated
    #[error("malformed recorded response: {0}")]
    MalformedRecording(String),
}
