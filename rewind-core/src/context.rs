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

//! Trace context propagation
//!
//! Carries the active span identity across asynchronous boundaries. The
//! design is explicit rather than ambient: every deferred object (a query
//! that has not executed yet, an iterator, a pending callback) captures a
//! [`TraceContext`] at construction and restores it at resumption, so child
//! spans parent to their *creation-time* context regardless of when the
//! deferred work actually runs.
//!
//! A small per-thread stack backs the synchronous sections in between; it
//! is entered and left through an RAII guard.

use std::cell::RefCell;
use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// 16-byte trace identifier, one per inbound operation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceId(pub [u8; 16]);

/// 8-byte span identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpanId(pub [u8; 8]);

impl TraceId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        TraceId(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 16] = bytes.try_into().ok()?;
        Some(TraceId(arr))
    }
}

impl SpanId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut bytes);
        SpanId(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 8] = bytes.try_into().ok()?;
        Some(SpanId(arr))
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraceId({})", self.to_hex())
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpanId({})", self.to_hex())
    }
}

/// The identity of one span: its trace and its own id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanContext {
    pub trace_id: TraceId,
    pub span_id: SpanId,
}

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<SpanContext>> = const { RefCell::new(Vec::new()) };
}

/// A captured trace context.
///
/// `TraceContext::capture()` snapshots the active context at a suspension
/// point; storing the value in a deferred object and calling `enter()` at
/// resumption re-establishes it. An empty context means the resumed work
/// starts a new trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TraceContext {
    active: Option<SpanContext>,
}

impl TraceContext {
    /// The empty context: entering it starts a fresh trace.
    pub fn empty() -> Self {
        Self { active: None }
    }

    /// A context rooted at an explicit span.
    pub fn of(ctx: SpanContext) -> Self {
        Self { active: Some(ctx) }
    }

    /// Snapshot the context active on this thread.
    pub fn capture() -> Self {
        Self {
            active: Self::active(),
        }
    }

    /// The span identity active on this thread, if any.
    pub fn active() -> Option<SpanContext> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().copied())
    }

    /// The span identity carried by this captured context.
    pub fn span(&self) -> Option<SpanContext> {
        self.active
    }

    /// Re-enter this context. The returned guard restores the previous
    /// context when dropped.
    pub fn enter(&self) -> ContextGuard {
        if let Some(ctx) = self.active {
            CONTEXT_STACK.with(|stack| stack.borrow_mut().push(ctx));
            ContextGuard { pushed: true }
        } else {
            ContextGuard { pushed: false }
        }
    }

    /// Run `f` with this context active.
    pub fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.enter();
        f()
    }
}

/// RAII guard returned by [`TraceContext::enter`].
#[must_use = "dropping the guard immediately restores the previous context"]
pub struct ContextGuard {
    pushed: bool,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if self.pushed {
            CONTEXT_STACK.with(|stack| {
                stack.borrow_mut().pop();
            });
        }
    }
}
