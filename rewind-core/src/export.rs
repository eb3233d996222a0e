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

//! Span export
//!
//! Ended spans are handed to a [`SpanSink`]. The sink is opaque to the
//! core: the only observable contracts are the self-traffic skip header
//! and the ingestion-URL markers honored by the mode gate.
//!
//! [`BatchExporter`] buffers spans and flushes them in batches to keep
//! latency overhead out of hot paths, dropping the oldest spans under
//! sustained backlog rather than growing without bound.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::span::SpanData;

/// Receives ended spans.
pub trait SpanSink: Send + Sync + std::fmt::Debug {
    fn on_end(&self, span: SpanData);

    /// Push any buffered spans onward. Default is a no-op for unbuffered
    /// sinks.
    fn flush(&self) {}
}

/// Ships batches of spans to wherever recordings live.
pub trait SpanExporter: Send + Sync + std::fmt::Debug {
    fn export(&self, batch: Vec<SpanData>) -> Result<(), String>;
}

/// Sink that discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl SpanSink for NullSink {
    fn on_end(&self, _span: SpanData) {}
}

/// Sink that keeps spans in memory. Used by tests and by the in-process
/// record-then-replay round trip.
#[derive(Debug, Default)]
pub struct InMemorySink {
    spans: Mutex<Vec<SpanData>>,
}

impl InMemorySink {
    /// Take all collected spans, leaving the sink empty.
    pub fn take(&self) -> Vec<SpanData> {
        std::mem::take(&mut self.spans.lock())
    }

    /// Copy of the collected spans.
    pub fn snapshot(&self) -> Vec<SpanData> {
        self.spans.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.spans.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.lock().is_empty()
    }
}

impl SpanSink for InMemorySink {
    fn on_end(&self, span: SpanData) {
        self.spans.lock().push(span);
    }
}

/// Batching configuration.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Spans per exported batch.
    pub batch_size: usize,
    /// Upper bound on buffered spans; beyond it the oldest are dropped.
    pub max_buffer_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 512,
            max_buffer_size: 2048,
        }
    }
}

#[derive(Debug, Default)]
struct BatchState {
    buffer: Vec<SpanData>,
    dropped: u64,
}

/// Size-triggered batching sink in front of a [`SpanExporter`].
#[derive(Debug)]
pub struct BatchExporter {
    config: BatchConfig,
    state: Mutex<BatchState>,
    exporter: Arc<dyn SpanExporter>,
}

impl BatchExporter {
    pub fn new(exporter: Arc<dyn SpanExporter>, config: BatchConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BatchState::default()),
            exporter,
        }
    }

    /// Spans dropped under buffer pressure since startup.
    pub fn dropped(&self) -> u64 {
        self.state.lock().dropped
    }

    fn drain_locked(&self, state: &mut BatchState) -> Vec<SpanData> {
        std::mem::take(&mut state.buffer)
    }

    fn export_batch(&self, batch: Vec<SpanData>) {
        if batch.is_empty() {
            return;
        }
        let count = batch.len();
        if let Err(e) = self.exporter.export(batch) {
            tracing::warn!(count, error = %e, "span batch export failed");
        } else {
            tracing::debug!(count, "span batch exported");
        }
    }
}

impl SpanSink for BatchExporter {
    fn on_end(&self, span: SpanData) {
        let to_export = {
            let mut state = self.state.lock();
            if state.buffer.len() >= self.config.max_buffer_size {
                state.buffer.remove(0);
                state.dropped += 1;
                if state.dropped % 100 == 1 {
                    tracing::warn!(dropped = state.dropped, "span buffer full, dropping oldest");
                }
            }
            state.buffer.push(span);
            if state.buffer.len() >= self.config.batch_size {
                Some(self.drain_locked(&mut state))
            } else {
                None
            }
        };
        if let Some(batch) = to_export {
            self.export_batch(batch);
        }
    }

    fn flush(&self) {
        let batch = {
            let mut state = self.state.lock();
            self.drain_locked(&mut state)
        };
        self.export_batch(batch);
    }
}
