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

//! Span lifecycle
//!
//! Spans move through `Open -> (attributes added)* -> Ended(ok|error)`.
//! An ended span is immutable; late attribute writes and double ends are
//! absorbed and logged. Nothing in this module returns an error to the
//! caller: the application must complete its work regardless of tracing
//! health.

use std::collections::HashMap;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::context::{SpanContext, SpanId, TraceContext, TraceId};
use crate::export::SpanSink;

/// Fixed attribute-key namespace, used verbatim in serialized spans.
pub mod attr {
    pub const NAME: &str = "name";
    pub const PACKAGE_NAME: &str = "packageName";
    pub const SUBMODULE: &str = "submodule";
    pub const INSTRUMENTATION_NAME: &str = "instrumentationName";
    pub const PACKAGE_TYPE: &str = "packageType";
    pub const KIND: &str = "kind";
    pub const INPUT_VALUE: &str = "inputValue";
    pub const OUTPUT_VALUE: &str = "outputValue";
    pub const INPUT_SCHEMA_MERGES: &str = "inputSchemaMerges";
    pub const OUTPUT_SCHEMA_MERGES: &str = "outputSchemaMerges";
    pub const TRANSFORM_METADATA: &str = "transformMetadata";
    pub const IS_PRE_APP_START: &str = "isPreAppStart";
    pub const STACK_TRACE: &str = "stackTrace";
}

/// Span kind, serialized into the `kind` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpanKind {
    #[default]
    Client,
    Server,
    Internal,
}

impl SpanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanKind::Client => "CLIENT",
            SpanKind::Server => "SERVER",
            SpanKind::Internal => "INTERNAL",
        }
    }
}

/// Terminal status of a span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "code", content = "message", rename_all = "lowercase")]
pub enum SpanStatus {
    #[default]
    Unset,
    Ok,
    Error(String),
}

/// Identity of the library call a span describes. Doubles as the lookup
/// scope for the mock store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanMeta {
    /// Span name (a URL, a query label, a document path).
    pub name: String,
    /// Intercepted package, e.g. `postgres`.
    pub package_name: String,
    /// Instrumentation module that produced the span.
    pub instrumentation_name: String,
    /// Sub-surface within the package, e.g. `query`, `transaction`.
    pub submodule: String,
    /// Package family, e.g. `pg`, `http`.
    pub package_type: String,
    pub kind: SpanKind,
}

/// A finished or in-flight span as exported to the sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanData {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub name: String,
    pub start_time_us: u64,
    pub end_time_us: Option<u64>,
    pub attributes: HashMap<String, Value>,
    pub status: SpanStatus,
}

/// Handle to an open span. Cheap to copy; all mutation goes through the
/// [`SpanRecorder`] that created it.
#[derive(Debug, Clone, Copy)]
pub struct SpanHandle {
    context: SpanContext,
}

impl SpanHandle {
    pub fn context(&self) -> SpanContext {
        self.context
    }

    /// Trace context for children of this span.
    pub fn child_context(&self) -> TraceContext {
        TraceContext::of(self.context)
    }

    pub fn trace_id(&self) -> TraceId {
        self.context.trace_id
    }

    pub fn span_id(&self) -> SpanId {
        self.context.span_id
    }
}

fn now_us() -> u64 {
    chrono::Utc::now().timestamp_micros().max(0) as u64
}

/// Creates spans, attaches attributes, and ends spans.
///
/// All operations are infallible from the caller's perspective; internal
/// faults are logged through `tracing` and swallowed.
#[derive(Debug)]
pub struct SpanRecorder {
    sink: Arc<dyn SpanSink>,
    live: DashMap<SpanId, SpanData>,
    /// Trace id assigned to the inbound operation currently being
    /// replayed, used when a span opens with no active parent.
    replay_trace_id: Mutex<Option<TraceId>>,
}

impl SpanRecorder {
    pub fn new(sink: Arc<dyn SpanSink>) -> Self {
        Self {
            sink,
            live: DashMap::new(),
            replay_trace_id: Mutex::new(None),
        }
    }

    /// Open a span under `ctx`. With no active parent the span starts a
    /// new trace (or joins the current replay trace).
    pub fn start_span(&self, meta: &SpanMeta, ctx: &TraceContext) -> SpanHandle {
        let parent = ctx.span();
        let trace_id = parent
            .map(|p| p.trace_id)
            .or_else(|| *self.replay_trace_id.lock())
            .unwrap_or_else(TraceId::generate);
        let context = SpanContext {
            trace_id,
            span_id: SpanId::generate(),
        };

        let mut attributes = HashMap::new();
        attributes.insert(attr::NAME.to_string(), Value::String(meta.name.clone()));
        attributes.insert(
            attr::PACKAGE_NAME.to_string(),
            Value::String(meta.package_name.clone()),
        );
        attributes.insert(
            attr::INSTRUMENTATION_NAME.to_string(),
            Value::String(meta.instrumentation_name.clone()),
        );
        attributes.insert(
            attr::SUBMODULE.to_string(),
            Value::String(meta.submodule.clone()),
        );
        attributes.insert(
            attr::PACKAGE_TYPE.to_string(),
            Value::String(meta.package_type.clone()),
        );
        attributes.insert(
            attr::KIND.to_string(),
            Value::String(meta.kind.as_str().to_string()),
        );

        let data = SpanData {
            trace_id: context.trace_id.to_hex(),
            span_id: context.span_id.to_hex(),
            parent_span_id: parent.map(|p| p.span_id.to_hex()),
            name: meta.name.clone(),
            start_time_us: now_us(),
            end_time_us: None,
            attributes,
            status: SpanStatus::Unset,
        };
        self.live.insert(context.span_id, data);
        SpanHandle { context }
    }

    /// Attach attributes to an open span. A write to an ended or unknown
    /// span is a logged no-op.
    pub fn add_attributes<I>(&self, span: &SpanHandle, attrs: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        match self.live.get_mut(&span.context.span_id) {
            Some(mut data) => {
                data.attributes.extend(attrs);
            }
            None => {
                tracing::debug!(
                    span_id = %span.context.span_id.to_hex(),
                    "attribute write to ended span ignored"
                );
            }
        }
    }

    /// End a span and hand it to the sink. Ending twice is a logged no-op.
    pub fn end(&self, span: &SpanHandle, status: SpanStatus) {
        match self.live.remove(&span.context.span_id) {
            Some((_, mut data)) => {
                data.end_time_us = Some(now_us());
                data.status = status;
                self.sink.on_end(data);
            }
            None => {
                tracing::debug!(
                    span_id = %span.context.span_id.to_hex(),
                    "double span end ignored"
                );
            }
        }
    }

    /// The active span identity, if any.
    pub fn current_span_info(&self) -> Option<SpanContext> {
        TraceContext::active()
    }

    /// Assign the trace id for the inbound operation being replayed.
    pub fn set_current_replay_trace_id(&self, id: Option<TraceId>) {
        *self.replay_trace_id.lock() = id;
    }

    /// Number of spans currently open. Used by shutdown diagnostics.
    pub fn open_spans(&self) -> usize {
        self.live.len()
    }
}
