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

//! Core error types

use thiserror::Error;

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in the interception core
#[derive(Debug, Error)]
pub enum CoreError {
    /// No recording matched a replay lookup
    #[error("no matching recording for {operation}: {lookup}")]
    MockMiss {
        /// Operation label, e.g. `postgres.query`
        operation: String,
        /// The offending query, URL, or path
        lookup: String,
    },

    /// Mode string could not be parsed
    #[error("invalid mode: {0} (expected RECORD, REPLAY, or DISABLED)")]
    InvalidMode(String),

    /// A transform rule failed to compile
    #[error("invalid transform rule: {0}")]
    InvalidTransformRule(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Mock store error
    #[error("mock store error: {0}")]
    Store(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Span export error
    #[error("export error: {0}")]
    Export(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}
