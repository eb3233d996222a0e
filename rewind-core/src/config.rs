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

//! Initialization surface
//!
//! A single call builds the runtime from configuration: the mode gate,
//! the span recorder, the mock store, and per-adapter transform tables.
//! Adapters are constructed explicitly from the resulting handle instead
//! of being patched into the host's libraries.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Deserialize;

use crate::error::{CoreError, CoreResult};
use crate::export::SpanSink;
use crate::kernel::AdapterKernel;
use crate::mock::MockSource;
use crate::mode::{AdapterGate, Mode, ModeGate};
use crate::span::SpanRecorder;
use crate::transform::{compile, CompiledRule, TransformRule};

fn default_enabled() -> bool {
    true
}

/// Configuration for one adapter.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Declarative transform rules applied on record.
    #[serde(default)]
    pub transforms: Vec<TransformRule>,
    /// Call names matching any of these regexes run uninstrumented.
    #[serde(default)]
    pub exclusions: Vec<String>,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            transforms: Vec::new(),
            exclusions: Vec::new(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewindConfig {
    /// Operating mode. Absent means read `REWIND_MODE`.
    #[serde(default)]
    pub mode: Option<Mode>,
    /// Adapter settings keyed by adapter name (`http`, `fetch`,
    /// `postgres`, `docstore`, ...).
    #[serde(default)]
    pub adapters: HashMap<String, AdapterSettings>,
    /// URL fragments identifying the ingestion sink, for self-traffic
    /// suppression.
    #[serde(default)]
    pub sink_url_markers: Vec<String>,
}

impl RewindConfig {
    pub fn from_toml(text: &str) -> CoreResult<Self> {
        toml::from_str(text).map_err(|e| CoreError::Config(e.to_string()))
    }

    pub fn from_json(text: &str) -> CoreResult<Self> {
        serde_json::from_str(text).map_err(|e| CoreError::Config(e.to_string()))
    }

    /// Enable an adapter with default settings.
    pub fn enable_adapter(mut self, name: impl Into<String>) -> Self {
        self.adapters.entry(name.into()).or_default();
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }
}

/// The initialized runtime handle.
///
/// Cheap to clone through `Arc`; the host passes it to each adapter it
/// constructs.
#[derive(Debug)]
pub struct Rewind {
    gate: Arc<ModeGate>,
    recorder: Arc<SpanRecorder>,
    store: Arc<dyn MockSource>,
    transforms: HashMap<String, Arc<Vec<CompiledRule>>>,
}

static GLOBAL: OnceCell<Arc<Rewind>> = OnceCell::new();

impl Rewind {
    /// Build the runtime. Invalid exclusion regexes are reported and
    /// dropped; invalid transform rules are reported and dropped at
    /// compile time. Neither aborts initialization.
    pub fn init(
        config: RewindConfig,
        sink: Arc<dyn SpanSink>,
        store: Arc<dyn MockSource>,
    ) -> Arc<Self> {
        let mode = config.mode.unwrap_or_else(Mode::from_env);
        let mut gate = ModeGate::new(mode);
        let mut transforms = HashMap::new();

        for (name, settings) in &config.adapters {
            let mut exclusions = Vec::new();
            for pattern in &settings.exclusions {
                match Regex::new(pattern) {
                    Ok(re) => exclusions.push(re),
                    Err(e) => {
                        tracing::warn!(adapter = %name, pattern = %pattern, error = %e,
                            "exclusion pattern discarded");
                    }
                }
            }
            gate = gate.with_adapter(
                name.clone(),
                AdapterGate {
                    enabled: settings.enabled,
                    exclusions,
                },
            );
            transforms.insert(name.clone(), Arc::new(compile(&settings.transforms)));
        }
        for marker in &config.sink_url_markers {
            gate = gate.with_sink_url_marker(marker.clone());
        }

        Arc::new(Self {
            gate: Arc::new(gate),
            recorder: Arc::new(SpanRecorder::new(sink)),
            store,
            transforms,
        })
    }

    /// Install a runtime as the process-wide default. First call wins.
    pub fn install_global(runtime: Arc<Self>) -> bool {
        GLOBAL.set(runtime).is_ok()
    }

    /// The process-wide default runtime, if one was installed.
    pub fn global() -> Option<Arc<Self>> {
        GLOBAL.get().cloned()
    }

    /// Signal that the host application finished starting. Idempotent.
    pub fn mark_app_ready(&self) {
        self.gate.mark_app_ready();
    }

    pub fn mode(&self) -> Mode {
        self.gate.mode()
    }

    pub fn gate(&self) -> &Arc<ModeGate> {
        &self.gate
    }

    pub fn recorder(&self) -> &Arc<SpanRecorder> {
        &self.recorder
    }

    pub fn store(&self) -> &Arc<dyn MockSource> {
        &self.store
    }

    /// Build the kernel an adapter drives its interceptions through.
    pub fn adapter(&self, name: &str) -> AdapterKernel {
        let transforms = self
            .transforms
            .get(name)
            .cloned()
            .unwrap_or_else(|| Arc::new(Vec::new()));
        AdapterKernel::new(
            name.to_string(),
            self.gate.clone(),
            self.recorder.clone(),
            self.store.clone(),
            transforms,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::InMemorySink;
    use crate::mock::InMemoryMockStore;
    use crate::mode::Decision;

    #[test]
    fn test_config_from_toml() {
        let config = RewindConfig::from_toml(
            r#"
            mode = "record"
            sinkUrlMarkers = ["ingest.rewind.dev"]

            [adapters.http]
            exclusions = ["^https://internal\\."]

            [[adapters.http.transforms]]
            matcher = { headerName = "authorization" }
            action = { type = "redact" }
            "#,
        )
        .unwrap();
        assert_eq!(config.mode, Some(Mode::Record));
        assert_eq!(config.adapters["http"].transforms.len(), 1);

        let rt = Rewind::init(
            config,
            Arc::new(InMemorySink::default()),
            Arc::new(InMemoryMockStore::new()),
        );
        assert_eq!(rt.mode(), Mode::Record);
        assert_eq!(rt.gate().decide("http", "https://api.x"), Decision::Record);
        assert_eq!(
            rt.gate().decide("http", "https://internal.x"),
            Decision::Execute
        );
    }

    #[test]
    fn test_config_from_json_unknown_fields_ignored() {
        let config = RewindConfig::from_json(
            r#"{"mode": "replay", "adapters": {"postgres": {"futureKnob": 1}}}"#,
        )
        .unwrap();
        assert_eq!(config.mode, Some(Mode::Replay));
        assert!(config.adapters["postgres"].enabled);
    }

    #[test]
    fn test_invalid_exclusion_dropped() {
        let mut config = RewindConfig::default().with_mode(Mode::Record);
        config.adapters.insert(
            "http".into(),
            AdapterSettings {
                exclusions: vec!["(".into()],
                ..Default::default()
            },
        );
        let rt = Rewind::init(
            config,
            Arc::new(InMemorySink::default()),
            Arc::new(InMemoryMockStore::new()),
        );
        // The bad pattern is gone, the adapter still records.
        assert_eq!(rt.gate().decide("http", "anything"), Decision::Record);
    }

    #[test]
    fn test_unknown_adapter_kernel_has_no_transforms() {
        let rt = Rewind::init(
            RewindConfig::default().with_mode(Mode::Record),
            Arc::new(InMemorySink::default()),
            Arc::new(InMemoryMockStore::new()),
        );
        let kernel = rt.adapter("fetch");
        assert_eq!(kernel.adapter_name(), "fetch");
        assert_eq!(kernel.decide("x"), Decision::Skip);
    }
}
