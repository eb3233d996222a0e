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

//! Mode gate
//!
//! Holds the process-wide operating mode, the app-ready flag, and
//! per-adapter enable bits, and answers the per-call question "what should
//! this interception do?". The gate is initialized once at startup and is
//! read-mostly afterwards.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Environment variable selecting the operating mode.
pub const MODE_ENV_VAR: &str = "REWIND_MODE";

/// Header key carried by the ingestion sink's own outbound calls.
pub const SKIP_HEADER: &str = "x-td-skip";

/// Header value that marks a call as sink self-traffic.
pub const SKIP_HEADER_VALUE: &str = "true";

/// Process-wide operating mode, set once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Pass everything through untouched.
    #[default]
    Disabled,
    /// Observe outbound calls and capture spans.
    Record,
    /// Serve outbound calls from previously captured recordings.
    Replay,
}

impl FromStr for Mode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RECORD" => Ok(Mode::Record),
            "REPLAY" => Ok(Mode::Replay),
            "DISABLED" | "" => Ok(Mode::Disabled),
            other => Err(CoreError::InvalidMode(other.to_string())),
        }
    }
}

impl Mode {
    /// Read the mode from `REWIND_MODE`. Unset is `Disabled`; an
    /// unparseable value is reported and treated as `Disabled`.
    pub fn from_env() -> Mode {
        match std::env::var(MODE_ENV_VAR) {
            Ok(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "ignoring unparseable {}", MODE_ENV_VAR);
                Mode::Disabled
            }),
            Err(_) => Mode::Disabled,
        }
    }
}

/// Per-call dispatch decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Instrumentation is off for this call; pass through untouched.
    Skip,
    /// Instrumentation is on but this call is excluded; run it for real
    /// and emit no span.
    Execute,
    /// Run the call for real and capture a span.
    Record,
    /// Serve the call from the mock store.
    Replay,
}

/// Gate settings for a single adapter.
#[derive(Debug, Clone, Default)]
pub struct AdapterGate {
    /// Whether the adapter is installed at all.
    pub enabled: bool,
    /// Call names matching any of these patterns take `Decision::Execute`.
    pub exclusions: Vec<Regex>,
}

/// Process-wide mode gate.
///
/// `decide` never blocks: the mode is immutable after construction and the
/// app-ready flag is a single atomic read.
#[derive(Debug)]
pub struct ModeGate {
    mode: Mode,
    app_ready: AtomicBool,
    adapters: HashMap<String, AdapterGate>,
    /// URL fragments identifying the ingestion sink.
    sink_url_markers: Vec<String>,
}

impl ModeGate {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            app_ready: AtomicBool::new(false),
            adapters: HashMap::new(),
            sink_url_markers: Vec::new(),
        }
    }

    /// Register an adapter's gate settings. Unregistered adapters are
    /// treated as disabled.
    pub fn with_adapter(mut self, name: impl Into<String>, gate: AdapterGate) -> Self {
        self.adapters.insert(name.into(), gate);
        self
    }

    /// Register a URL fragment identifying the ingestion sink.
    pub fn with_sink_url_marker(mut self, marker: impl Into<String>) -> Self {
        self.sink_url_markers.push(marker.into());
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Flip the app-ready flag. Idempotent.
    pub fn mark_app_ready(&self) {
        self.app_ready.store(true, Ordering::Release);
    }

    /// Whether the host application has signalled readiness. Calls made
    /// before this are tagged pre-app-start but are still recorded and
    /// replayed.
    pub fn is_app_ready(&self) -> bool {
        self.app_ready.load(Ordering::Acquire)
    }

    /// Decide what an intercepted call should do.
    ///
    /// `call_name` is the adapter's span name for the call (a URL, a query
    /// text, a document path); it is matched against the adapter's
    /// exclusion patterns.
    pub fn decide(&self, adapter: &str, call_name: &str) -> Decision {
        if self.mode == Mode::Disabled {
            return Decision::Skip;
        }
        let gate = match self.adapters.get(adapter) {
            Some(g) if g.enabled => g,
            _ => return Decision::Skip,
        };
        if gate.exclusions.iter().any(|re| re.is_match(call_name)) {
            return Decision::Execute;
        }
        match self.mode {
            Mode::Record => Decision::Record,
            Mode::Replay => Decision::Replay,
            Mode::Disabled => Decision::Skip,
        }
    }

    /// Whether a call is the SDK's own traffic and must always be skipped.
    ///
    /// Recognizes the well-known skip header and the ingestion-URL
    /// markers, preventing recursion when the export sink itself performs
    /// I/O.
    pub fn is_self_traffic<'a, I>(&self, url: &str, headers: I) -> bool
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        if self.sink_url_markers.iter().any(|m| url.contains(m.as_str())) {
            return true;
        }
        headers.into_iter().any(|(k, v)| {
            k.eq_ignore_ascii_case(SKIP_HEADER) && v.eq_ignore_ascii_case(SKIP_HEADER_VALUE)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(mode: Mode) -> ModeGate {
        ModeGate::new(mode).with_adapter(
            "http",
            AdapterGate {
                enabled: true,
                exclusions: vec![Regex::new("^https://internal\\.").unwrap()],
            },
        )
    }

    #[test]
    fn test_disabled_mode_skips() {
        let g = gate(Mode::Disabled);
        assert_eq!(g.decide("http", "https://api.example.com"), Decision::Skip);
    }

    #[test]
    fn test_unregistered_adapter_skips() {
        let g = gate(Mode::Record);
        assert_eq!(g.decide("postgres", "SELECT 1"), Decision::Skip);
    }

    #[test]
    fn test_record_and_replay_decisions() {
        assert_eq!(
            gate(Mode::Record).decide("http", "https://api.example.com"),
            Decision::Record
        );
        assert_eq!(
            gate(Mode::Replay).decide("http", "https://api.example.com"),
            Decision::Replay
        );
    }

    #[test]
    fn test_exclusion_pattern_executes() {
        let g = gate(Mode::Record);
        assert_eq!(
            g.decide("http", "https://internal.example.com/health"),
            Decision::Execute
        );
    }

    #[test]
    fn test_record_before_app_ready() {
        let g = gate(Mode::Record);
        assert!(!g.is_app_ready());
        assert_eq!(g.decide("http", "https://api.example.com"), Decision::Record);
        g.mark_app_ready();
        g.mark_app_ready();
        assert!(g.is_app_ready());
    }

    #[test]
    fn test_self_traffic_by_header() {
        let g = gate(Mode::Record);
        let headers = [("X-Td-Skip", "true")];
        assert!(g.is_self_traffic("https://api.example.com", headers.iter().copied()));
        let benign = [("accept", "application/json")];
        assert!(!g.is_self_traffic("https://api.example.com", benign.iter().copied()));
    }

    #[test]
    fn test_self_traffic_by_sink_url() {
        let g = gate(Mode::Record).with_sink_url_marker("ingest.rewind.dev");
        assert!(g.is_self_traffic("https://ingest.rewind.dev/v1/spans", std::iter::empty()));
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("record".parse::<Mode>().unwrap(), Mode::Record);
        assert_eq!("REPLAY".parse::<Mode>().unwrap(), Mode::Replay);
        assert_eq!("Disabled".parse::<Mode>().unwrap(), Mode::Disabled);
        assert!("observe".parse::<Mode>().is_err());
    }
}
