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

//! Rewind Core
//!
//! The interception kernel shared by every adapter: mode gating, trace
//! context propagation, span lifecycle, fingerprint canonicalization,
//! mock lookup with consumption, and the declarative transform engine.

pub mod config;
pub mod context;
pub mod error;
pub mod export;
pub mod fingerprint;
pub mod kernel;
pub mod mock;
pub mod mode;
pub mod span;
pub mod transform;

pub use config::{AdapterSettings, Rewind, RewindConfig};
pub use context::{ContextGuard, SpanContext, SpanId, TraceContext, TraceId};
pub use error::{CoreError, CoreResult};
pub use export::{
    BatchConfig, BatchExporter, InMemorySink, NullSink, SpanExporter, SpanSink,
};
pub use fingerprint::{
    binary_to_value, canonical_string, canonicalize, eq_with_weights, fingerprint_hex, project,
    value_to_binary, MergeMap, CIRCULAR_SENTINEL, MAX_DEPTH,
};
pub use kernel::{AdapterKernel, Operation};
pub use mock::{
    EntryMetadata, InMemoryMockStore, MockQuery, MockSource, RecordedEntry, Scope,
};
pub use mode::{
    AdapterGate, Decision, Mode, ModeGate, MODE_ENV_VAR, SKIP_HEADER, SKIP_HEADER_VALUE,
};
pub use span::{
    attr, SpanData, SpanHandle, SpanKind, SpanMeta, SpanRecorder, SpanStatus,
};
pub use transform::{
    apply as apply_transforms, compile as compile_transforms, CompiledRule, Direction,
    RuleAction, RuleMatcher, SpanPayload, TransformOutcome, TransformRule, DEFAULT_MASK_FILL,
    DEFAULT_REDACT_PREFIX,
};
