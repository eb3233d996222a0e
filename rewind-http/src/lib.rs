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

//! Rewind HTTP adapter
//!
//! Record-and-replay interception for request/response pairs from
//! HTTP-shaped APIs.

pub mod adapter;
pub mod error;
pub mod reqwest_executor;
pub mod types;

pub use adapter::{HttpClient, HttpExecutor, ADAPTER_NAME};
pub use error::{HttpError, HttpResult};
pub use reqwest_executor::ReqwestExecutor;
pub use types::{HttpRequest, HttpResponse};
