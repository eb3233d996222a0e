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

//! Adapter kernel
//!
//! The shared template every adapter runs an intercepted operation
//! through: consult the mode gate, open a span under the creation-time
//! context, then execute for real (recording the projected result) or
//! synthesize the result from the mock store. Failures inside the
//! span/transform machinery are logged and swallowed; the application
//! observes exactly the outcome the real operation produced.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use crate::context::TraceContext;
use crate::fingerprint::{canonicalize, MergeMap};
use crate::mock::{MockQuery, MockSource, RecordedEntry, Scope};
use crate::mode::{Decision, ModeGate};
use crate::span::{attr, SpanHandle, SpanMeta, SpanRecorder, SpanStatus};
use crate::transform::{apply, CompiledRule, SpanPayload};

/// Everything an adapter knows about one intercepted call before it runs.
#[derive(Debug, Clone)]
pub struct Operation {
    pub meta: SpanMeta,
    pub input_value: Value,
    /// Field weights applied during replay matching, recorded alongside
    /// the input.
    pub merge_map: Option<MergeMap>,
    /// Caller-supplied stack descriptor, carried verbatim.
    pub stack_trace: Option<Value>,
}

impl Operation {
    pub fn new(meta: SpanMeta, input_value: Value) -> Self {
        Self {
            meta,
            input_value,
            merge_map: None,
            stack_trace: None,
        }
    }

    pub fn with_merge_map(mut self, weights: MergeMap) -> Self {
        self.merge_map = Some(weights);
        self
    }

    pub fn with_stack_trace(mut self, stack: Value) -> Self {
        self.stack_trace = Some(stack);
        self
    }
}

/// Per-adapter bundle of the core services.
#[derive(Clone)]
pub struct AdapterKernel {
    adapter: String,
    gate: Arc<ModeGate>,
    recorder: Arc<SpanRecorder>,
    store: Arc<dyn MockSource>,
    transforms: Arc<Vec<CompiledRule>>,
}

impl AdapterKernel {
    pub fn new(
        adapter: impl Into<String>,
        gate: Arc<ModeGate>,
        recorder: Arc<SpanRecorder>,
        store: Arc<dyn MockSource>,
        transforms: Arc<Vec<CompiledRule>>,
    ) -> Self {
        Self {
            adapter: adapter.into(),
            gate,
            recorder,
            store,
            transforms,
        }
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter
    }

    pub fn gate(&self) -> &ModeGate {
        &self.gate
    }

    pub fn recorder(&self) -> &SpanRecorder {
        &self.recorder
    }

    pub fn store(&self) -> &Arc<dyn MockSource> {
        &self.store
    }

    /// Gate decision for a call with this span name.
    pub fn decide(&self, call_name: &str) -> Decision {
        self.gate.decide(&self.adapter, call_name)
    }

    /// Open a span for `meta` under `ctx`, tagging pre-app-start traffic.
    pub fn open_span(&self, meta: &SpanMeta, ctx: &TraceContext) -> SpanHandle {
        let span = self.recorder.start_span(meta, ctx);
        if !self.gate.is_app_ready() {
            self.recorder
                .add_attributes(&span, [(attr::IS_PRE_APP_START.to_string(), Value::Bool(true))]);
        }
        span
    }

    /// Attach the captured values to a recorded span and end it OK. Runs
    /// the transform rules first; transform faults leave raw data behind
    /// so the recording stays valid.
    pub fn finish_recorded(&self, span: &SpanHandle, op: &Operation, output_value: Value) {
        let mut payload = SpanPayload {
            input_value: canonicalize(&op.input_value),
            output_value,
        };
        let outcome = apply(&self.transforms, &mut payload);

        let mut attrs = vec![
            (attr::INPUT_VALUE.to_string(), payload.input_value),
            (attr::OUTPUT_VALUE.to_string(), payload.output_value),
        ];
        if !outcome.metadata.is_empty() {
            attrs.push((
                attr::TRANSFORM_METADATA.to_string(),
                Value::Array(outcome.metadata),
            ));
        }
        // Scrubbed input fields no longer equal their live form, so they
        // are recorded as zero-weight for replay matching.
        let mut weights = op.merge_map.clone().unwrap_or_default();
        for path in outcome.input_paths {
            weights = weights.ignore(path);
        }
        if !weights.0.is_empty() {
            match serde_json::to_value(&weights) {
                Ok(v) => attrs.push((attr::INPUT_SCHEMA_MERGES.to_string(), v)),
                Err(e) => tracing::warn!(error = %e, "merge map serialization failed"),
            }
        }
        if let Some(stack) = &op.stack_trace {
            attrs.push((attr::STACK_TRACE.to_string(), stack.clone()));
        }
        self.recorder.add_attributes(span, attrs);
        self.recorder.end(span, SpanStatus::Ok);
    }

    /// End a span as failed, keeping the canonical input for diagnosis.
    pub fn finish_failed(&self, span: &SpanHandle, op: &Operation, message: &str) {
        self.recorder.add_attributes(
            span,
            [(
                attr::INPUT_VALUE.to_string(),
                canonicalize(&op.input_value),
            )],
        );
        self.recorder.end(span, SpanStatus::Error(message.to_string()));
    }

    /// Replay-side lookup for `op`.
    pub async fn find_mock(&self, span: &SpanHandle, op: &Operation) -> Option<RecordedEntry> {
        self.store.find(&self.mock_query(span, op)).await
    }

    /// Synchronous replay lookup, for surfaces that cannot suspend.
    pub fn find_mock_sync(&self, span: &SpanHandle, op: &Operation) -> Option<RecordedEntry> {
        self.store.find_sync(&self.mock_query(span, op))
    }

    fn mock_query(&self, span: &SpanHandle, op: &Operation) -> MockQuery {
        MockQuery {
            trace_id: Some(span.trace_id().to_hex()),
            span_id: Some(span.span_id().to_hex()),
            scope: Scope::from(&op.meta),
            name: op.meta.name.clone(),
            fingerprint: canonicalize(&op.input_value),
            stack_trace: op.stack_trace.clone(),
            merge_map: op.merge_map.clone(),
            pre_app_start: !self.gate.is_app_ready(),
        }
    }

    /// The full template for a one-shot async operation.
    ///
    /// `execute` performs the real call; `project` turns its success value
    /// into the recorded OutputValue; `synthesize` builds the
    /// application-visible result from a replay hit (or decides the miss
    /// behavior when handed `None`).
    pub async fn run<T, E, Fut>(
        &self,
        op: Operation,
        execute: impl FnOnce() -> Fut,
        project: impl FnOnce(&T) -> Value,
        synthesize: impl FnOnce(Option<RecordedEntry>) -> Result<T, E>,
    ) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        match self.decide(&op.meta.name) {
            Decision::Skip | Decision::Execute => execute().await,
            Decision::Record => {
                let ctx = TraceContext::capture();
                let span = self.open_span(&op.meta, &ctx);
                let result = {
                    let _guard = span.child_context().enter();
                    execute().await
                };
                match &result {
                    Ok(value) => {
                        let output = project(value);
                        self.finish_recorded(&span, &op, output);
                    }
                    Err(e) => {
                        self.finish_failed(&span, &op, &e.to_string());
                    }
                }
                result
            }
            Decision::Replay => {
                let ctx = TraceContext::capture();
                let span = self.open_span(&op.meta, &ctx);
                let entry = self.find_mock(&span, &op).await;
                let hit_output = entry.as_ref().map(|e| e.result.clone());
                let result = synthesize(entry);
                match &result {
                    Ok(_) => {
                        let output = hit_output.unwrap_or(Value::Null);
                        self.finish_recorded(&span, &op, output);
                    }
                    Err(e) => {
                        self.finish_failed(&span, &op, &e.to_string());
                    }
                }
                result
            }
        }
    }
}

impl std::fmt::Debug for AdapterKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterKernel")
            .field("adapter", &self.adapter)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::InMemorySink;
    use crate::mock::{EntryMetadata, InMemoryMockStore};
    use crate::mode::{AdapterGate, Mode};
    use crate::span::SpanKind;
    use serde_json::json;

    fn meta(name: &str) -> SpanMeta {
        SpanMeta {
            name: name.to_string(),
            package_name: "http".to_string(),
            instrumentation_name: "HttpAdapter".to_string(),
            submodule: "request".to_string(),
            package_type: "http".to_string(),
            kind: SpanKind::Client,
        }
    }

    fn kernel(mode: Mode) -> (AdapterKernel, Arc<InMemorySink>, Arc<InMemoryMockStore>) {
        let sink = Arc::new(InMemorySink::default());
        let store = Arc::new(InMemoryMockStore::new());
        let gate = Arc::new(ModeGate::new(mode).with_adapter(
            "http",
            AdapterGate {
                enabled: true,
                exclusions: Vec::new(),
            },
        ));
        let kernel = AdapterKernel::new(
            "http",
            gate,
            Arc::new(SpanRecorder::new(sink.clone())),
            store.clone(),
            Arc::new(Vec::new()),
        );
        (kernel, sink, store)
    }

    #[tokio::test]
    async fn test_skip_passes_through_without_span() {
        let (kernel, sink, _) = kernel(Mode::Disabled);
        let op = Operation::new(meta("https://x"), json!({"url": "https://x"}));
        let out: Result<i32, String> = kernel
            .run(op, || async { Ok(7) }, |_| json!({}), |_| unreachable!())
            .await;
        assert_eq!(out.unwrap(), 7);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_record_captures_span_and_surfaces_result() {
        let (kernel, sink, _) = kernel(Mode::Record);
        let op = Operation::new(meta("https://x"), json!({"url": "https://x"}));
        let out: Result<i32, String> = kernel
            .run(
                op,
                || async { Ok(41) },
                |v| json!({"value": v}),
                |_| unreachable!(),
            )
            .await;
        assert_eq!(out.unwrap(), 41);
        let spans = sink.take();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].status, SpanStatus::Ok);
        assert_eq!(spans[0].attributes["outputValue"], json!({"value": 41}));
        assert_eq!(spans[0].attributes["isPreAppStart"], json!(true));
    }

    #[tokio::test]
    async fn test_record_surfaces_original_error() {
        let (kernel, sink, _) = kernel(Mode::Record);
        let op = Operation::new(meta("https://x"), json!({"url": "https://x"}));
        let out: Result<i32, String> = kernel
            .run(
                op,
                || async { Err("boom".to_string()) },
                |_| json!({}),
                |_| unreachable!(),
            )
            .await;
        assert_eq!(out.unwrap_err(), "boom");
        let spans = sink.take();
        assert_eq!(spans[0].status, SpanStatus::Error("boom".to_string()));
    }

    #[tokio::test]
    async fn test_replay_synthesizes_from_mock() {
        let (kernel, sink, store) = kernel(Mode::Replay);
        let op = Operation::new(meta("https://x"), json!({"url": "https://x"}));
        store.insert(
            Scope::from(&op.meta),
            RecordedEntry {
                input_value: json!({"url": "https://x"}),
                result: json!({"value": 9}),
                metadata: EntryMetadata {
                    name: "https://x".into(),
                    pre_app_start: true,
                    ..Default::default()
                },
            },
        );
        let out: Result<i32, String> = kernel
            .run(
                op,
                || async { panic!("no real I/O in replay") },
                |_| json!({}),
                |entry| {
                    let entry = entry.ok_or_else(|| "miss".to_string())?;
                    Ok(entry.result["value"].as_i64().unwrap_or(0) as i32)
                },
            )
            .await;
        assert_eq!(out.unwrap(), 9);
        let spans = sink.take();
        assert_eq!(spans[0].status, SpanStatus::Ok);
    }

    #[tokio::test]
    async fn test_replay_miss_ends_span_error() {
        let (kernel, sink, _) = kernel(Mode::Replay);
        let op = Operation::new(meta("https://x"), json!({"url": "https://x"}));
        let out: Result<i32, String> = kernel
            .run(
                op,
                || async { unreachable!() },
                |_| json!({}),
                |entry| entry.map(|_| 0).ok_or_else(|| "miss".to_string()),
            )
            .await;
        assert!(out.is_err());
        let spans = sink.take();
        assert!(matches!(spans[0].status, SpanStatus::Error(_)));
    }
}
