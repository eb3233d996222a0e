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

//! LISTEN subscriptions
//!
//! Recording wraps the user callback to append every received payload to
//! the span, which stays open until `unlisten`. Replay opens no
//! connection at all: the recorded entry supplies the state and the
//! payload list, and the callback runs once per payload in recorded
//! order before a no-op handle is returned.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use rewind_core::{Decision, Operation, SpanHandle};

use crate::client::{ClientCore, Sql};
use crate::error::{SqlError, SqlResult};

const LISTEN_LABEL: &str = "postgres.listen";

/// Optional callback invoked once the subscription is established.
pub type OnListen = Box<dyn FnOnce() + Send>;

enum ListenInner {
    Passthrough {
        core: Arc<ClientCore>,
        channel: String,
        pump: JoinHandle<()>,
    },
    Recording {
        core: Arc<ClientCore>,
        channel: String,
        span: SpanHandle,
        op: Operation,
        state: String,
        payloads: Arc<Mutex<Vec<String>>>,
        pump: JoinHandle<()>,
    },
    /// Replay and already-unlistened handles: nothing left to release.
    Inert,
}

/// Live subscription handle: exposes the connection state and the
/// `unlisten` that tears the subscription down.
pub struct ListenHandle {
    state: String,
    inner: ListenInner,
}

impl ListenHandle {
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Tear down the subscription. For a recorded subscription this
    /// finalizes the span with `{channel, state, payloads}`. A replayed
    /// handle is a no-op.
    pub async fn unlisten(mut self) -> SqlResult<()> {
        match std::mem::replace(&mut self.inner, ListenInner::Inert) {
            ListenInner::Passthrough {
                core,
                channel,
                pump,
            } => {
                pump.abort();
                core.driver.unlisten(&channel).await
            }
            ListenInner::Recording {
                core,
                channel,
                span,
                op,
                state,
                payloads,
                pump,
            } => {
                pump.abort();
                if let Err(e) = core.driver.unlisten(&channel).await {
                    tracing::warn!(channel = %channel, error = %e, "unlisten failed");
                }
                let output = json!({
                    "channel": channel,
                    "state": state,
                    "payloads": payloads.lock().clone(),
                });
                core.kernel.finish_recorded(&span, &op, output);
                Ok(())
            }
            ListenInner::Inert => Ok(()),
        }
    }
}

impl Drop for ListenHandle {
    fn drop(&mut self) {
        // A dropped live handle still finalizes its span; the driver-side
        // unlisten is skipped because drop cannot suspend.
        match std::mem::replace(&mut self.inner, ListenInner::Inert) {
            ListenInner::Passthrough { pump, .. } => pump.abort(),
            ListenInner::Recording {
                core,
                channel,
                span,
                op,
                state,
                payloads,
                pump,
            } => {
                pump.abort();
                let output = json!({
                    "channel": channel,
                    "state": state,
                    "payloads": payloads.lock().clone(),
                });
                core.kernel.finish_recorded(&span, &op, output);
            }
            ListenInner::Inert => {}
        }
    }
}

impl std::fmt::Debug for ListenHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenHandle")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Sql {
    /// Subscribe to a server-side channel. `cb` runs once per received
    /// payload; `on_listen` fires when the subscription is established.
    pub async fn listen<F>(
        &self,
        channel: &str,
        cb: F,
        on_listen: Option<OnListen>,
    ) -> SqlResult<ListenHandle>
    where
        F: FnMut(String) + Send + 'static,
    {
        match self.core.kernel.decide(LISTEN_LABEL) {
            Decision::Skip | Decision::Execute => self.listen_passthrough(channel, cb, on_listen).await,
            Decision::Record => self.listen_record(channel, cb, on_listen).await,
            Decision::Replay => self.listen_replay(channel, cb, on_listen),
        }
    }

    async fn listen_passthrough<F>(
        &self,
        channel: &str,
        mut cb: F,
        on_listen: Option<OnListen>,
    ) -> SqlResult<ListenHandle>
    where
        F: FnMut(String) + Send + 'static,
    {
        let mut stream = self.core.driver.listen(channel).await?;
        let state = stream.state.clone();
        if let Some(hook) = on_listen {
            hook();
        }
        let pump = tokio::spawn(async move {
            while let Some(payload) = stream.next().await {
                cb(payload);
            }
        });
        Ok(ListenHandle {
            state,
            inner: ListenInner::Passthrough {
                core: self.core.clone(),
                channel: channel.to_string(),
                pump,
            },
        })
    }

    async fn listen_record<F>(
        &self,
        channel: &str,
        mut cb: F,
        on_listen: Option<OnListen>,
    ) -> SqlResult<ListenHandle>
    where
        F: FnMut(String) + Send + 'static,
    {
        let ctx = self.core.creation_context();
        let _restored = ctx.enter();
        let kernel = &self.core.kernel;
        let op = Operation::new(
            self.core.span_meta(LISTEN_LABEL, "listen"),
            json!({"channel": channel}),
        );
        let span = kernel.open_span(&op.meta, &ctx);

        let mut stream = match self.core.driver.listen(channel).await {
            Ok(stream) => stream,
            Err(e) => {
                kernel.finish_failed(&span, &op, &e.to_string());
                return Err(e);
            }
        };
        let state = stream.state.clone();
        if let Some(hook) = on_listen {
            hook();
        }

        let payloads = Arc::new(Mutex::new(Vec::new()));
        let collected = payloads.clone();
        let pump = tokio::spawn(async move {
            while let Some(payload) = stream.next().await {
                collected.lock().push(payload.clone());
                cb(payload);
            }
        });

        Ok(ListenHandle {
            state: state.clone(),
            inner: ListenInner::Recording {
                core: self.core.clone(),
                channel: channel.to_string(),
                span,
                op,
                state,
                payloads,
                pump,
            },
        })
    }

    fn listen_replay<F>(
        &self,
        channel: &str,
        mut cb: F,
        on_listen: Option<OnListen>,
    ) -> SqlResult<ListenHandle>
    where
        F: FnMut(String) + Send + 'static,
    {
        let ctx = self.core.creation_context();
        let _restored = ctx.enter();
        let kernel = &self.core.kernel;
        let op = Operation::new(
            self.core.span_meta(LISTEN_LABEL, "listen"),
            json!({"channel": channel}),
        );
        let span = kernel.open_span(&op.meta, &ctx);

        let Some(entry) = kernel.find_mock_sync(&span, &op) else {
            let miss = SqlError::mock_miss(LISTEN_LABEL, channel);
            kernel.finish_failed(&span, &op, &miss.to_string());
            return Err(miss);
        };

        let state = entry
            .result
            .get("state")
            .and_then(Value::as_str)
            .unwrap_or("listening")
            .to_string();
        if let Some(hook) = on_listen {
            hook();
        }
        if let Some(payloads) = entry.result.get("payloads").and_then(Value::as_array) {
            for payload in payloads {
                if let Some(text) = payload.as_str() {
                    cb(text.to_string());
                }
            }
        }
        kernel.finish_recorded(&span, &op, entry.result.clone());

        Ok(ListenHandle {
            state,
            inner: ListenInner::Inert,
        })
    }
}
