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

//! HTTP interception
//!
//! Wraps a request primitive with the adapter kernel. Recording captures
//! URL, method, canonical headers, and base64 body on both sides, runs
//! the transform rules, and hands the application an untouched response.
//! Replay materializes a bit-equivalent response surface from the
//! recorded output; a miss returns the documented neutral empty 200.
//! Sink self-traffic and skip-header calls bypass instrumentation
//! entirely.

use std::sync::Arc;

use async_trait::async_trait;

use rewind_core::{MergeMap, Operation, Rewind, SpanKind, SpanMeta};

use crate::error::HttpResult;
use crate::types::{request_to_value, response_from_value, response_to_value};
use crate::{HttpRequest, HttpResponse};

/// Gate and transform-config key for this adapter.
pub const ADAPTER_NAME: &str = "http";

/// Headers whose values never decide replay matching.
const IGNORED_MATCH_HEADERS: &[&str] = &["cookie", "user-agent", "x-request-id", "traceparent"];

/// The request primitive the adapter wraps.
#[async_trait]
pub trait HttpExecutor: Send + Sync {
    async fn execute(&self, req: &HttpRequest) -> HttpResult<HttpResponse>;
}

/// Instrumented HTTP client.
pub struct HttpClient {
    kernel: rewind_core::AdapterKernel,
    executor: Arc<dyn HttpExecutor>,
}

impl HttpClient {
    pub fn new(rewind: &Rewind, executor: Arc<dyn HttpExecutor>) -> Self {
        Self {
            kernel: rewind.adapter(ADAPTER_NAME),
            executor,
        }
    }

    fn span_meta(url: &str) -> SpanMeta {
        SpanMeta {
            name: url.to_string(),
            package_name: ADAPTER_NAME.to_string(),
            instrumentation_name: "HttpAdapter".to_string(),
            submodule: "request".to_string(),
            package_type: "http".to_string(),
            kind: SpanKind::Client,
        }
    }

    fn merge_map() -> MergeMap {
        IGNORED_MATCH_HEADERS
            .iter()
            .fold(MergeMap::new(), |m, h| m.ignore(format!("headers.{h}")))
    }

    /// Issue a request through the interception layer.
    pub async fn request(&self, req: HttpRequest) -> HttpResult<HttpResponse> {
        // SDK self-traffic is never instrumented, whatever the mode.
        let headers = req
            .headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()));
        if self.kernel.gate().is_self_traffic(&req.url, headers) {
            return self.executor.execute(&req).await;
        }

        let op = Operation::new(Self::span_meta(&req.url), request_to_value(&req))
            .with_merge_map(Self::merge_map());
        let executor = self.executor.clone();
        let request = req.clone();
        self.kernel
            .run(
                op,
                move || async move { executor.execute(&request).await },
                response_to_value,
                |entry| match entry {
                    Some(entry) => response_from_value(&entry.result),
                    None => {
                        tracing::warn!(url = %req.url, "no recording for request, serving neutral response");
                        Ok(HttpResponse::neutral())
                    }
                },
            )
            .await
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient").finish_non_exhaustive()
    }
}
