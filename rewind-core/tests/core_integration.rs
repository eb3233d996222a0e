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

//! End-to-end tests for the interception core: record through the
//! kernel, rebuild a mock store from the captured spans, replay.

use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use serde_json::{json, Value};

use rewind_core::{
    AdapterSettings, BatchConfig, BatchExporter, InMemoryMockStore, InMemorySink, Mode, Rewind,
    RewindConfig, SpanData, SpanExporter, SpanKind, SpanMeta, SpanStatus, Operation,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_test_writer()
        .try_init();
}

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

/// Record two calls, persist the entries as JSON Lines, reload them in
/// a fresh store, and replay both in order.
#[tokio::test]
async fn test_record_persist_reload_replay() -> Result<()> {
    init_logging();
    let sink = Arc::new(InMemorySink::default());
    let rt = Rewind::init(
        RewindConfig::default()
            .with_mode(Mode::Record)
            .enable_adapter("http"),
        sink.clone(),
        Arc::new(InMemoryMockStore::new()),
    );
    rt.mark_app_ready();
    let kernel = rt.adapter("http");

    for n in 1..=2i64 {
        let op = Operation::new(meta("https://api.x/seq"), json!({"url": "https://api.x/seq"}));
        let out: Result<i64, String> = kernel
            .run(
                op,
                move || async move { Ok(n) },
                |v| json!({"n": v}),
                |_| unreachable!(),
            )
            .await;
        assert_eq!(out.unwrap(), n);
    }

    // Spans -> store -> JSONL -> fresh store.
    let store = InMemoryMockStore::new();
    store.ingest_spans(&sink.take());
    let text = store.export_jsonl()?;
    assert_eq!(text.lines().count(), 2);
    let reloaded = Arc::new(InMemoryMockStore::import_jsonl(&text)?);

    let rt = Rewind::init(
        RewindConfig::default()
            .with_mode(Mode::Replay)
            .enable_adapter("http"),
        Arc::new(InMemorySink::default()),
        reloaded,
    );
    rt.mark_app_ready();
    let kernel = rt.adapter("http");

    for expected in 1..=2i64 {
        let op = Operation::new(meta("https://api.x/seq"), json!({"url": "https://api.x/seq"}));
        let out: Result<i64, String> = kernel
            .run(
                op,
                || async { unreachable!() },
                |_| json!({}),
                |entry| {
                    entry
                        .and_then(|e| e.result["n"].as_i64())
                        .ok_or_else(|| "miss".to_string())
                },
            )
            .await;
        assert_eq!(out.unwrap(), expected);
    }
    Ok(())
}

/// A sink whose exporter always fails must never alter what the
/// application observes.
#[tokio::test]
async fn test_export_failures_are_invisible_to_the_app() -> Result<()> {
    init_logging();

    #[derive(Debug)]
    struct FailingExporter {
        attempts: Mutex<u64>,
    }

    impl SpanExporter for FailingExporter {
        fn export(&self, _batch: Vec<SpanData>) -> Result<(), String> {
            *self.attempts.lock() += 1;
            Err("sink unreachable".to_string())
        }
    }

    let exporter = Arc::new(FailingExporter {
        attempts: Mutex::new(0),
    });
    let sink = Arc::new(BatchExporter::new(
        exporter.clone(),
        BatchConfig {
            batch_size: 1,
            max_buffer_size: 8,
        },
    ));
    let rt = Rewind::init(
        RewindConfig::default()
            .with_mode(Mode::Record)
            .enable_adapter("http"),
        sink,
        Arc::new(InMemoryMockStore::new()),
    );
    let kernel = rt.adapter("http");

    let op = Operation::new(meta("https://api.x"), json!({"url": "https://api.x"}));
    let out: Result<&str, String> = kernel
        .run(
            op,
            || async { Ok("payload") },
            |v| json!({"v": v}),
            |_| unreachable!(),
        )
        .await;
    assert_eq!(out.unwrap(), "payload");
    assert!(*exporter.attempts.lock() >= 1, "export was attempted");
    Ok(())
}

/// Transform rules configured per adapter apply during record and the
/// scrubbed value is what lands in the mock store.
#[tokio::test]
async fn test_transforms_feed_scrubbed_entries_into_replay() -> Result<()> {
    init_logging();
    let transforms = serde_json::from_value(json!([
        {"matcher": {"headerName": "authorization"}, "action": {"type": "replace", "value": "scrubbed"}}
    ]))?;
    let mut config = RewindConfig::default().with_mode(Mode::Record);
    config.adapters.insert(
        "http".into(),
        AdapterSettings {
            transforms,
            ..Default::default()
        },
    );
    let sink = Arc::new(InMemorySink::default());
    let rt = Rewind::init(config, sink.clone(), Arc::new(InMemoryMockStore::new()));
    let kernel = rt.adapter("http");

    let op = Operation::new(
        meta("https://api.x"),
        json!({"url": "https://api.x", "method": "GET",
               "headers": {"authorization": "Bearer secret"}}),
    );
    let out: Result<i32, String> = kernel
        .run(op, || async { Ok(1) }, |_| json!({}), |_| unreachable!())
        .await;
    out.unwrap();

    let spans = sink.take();
    assert_eq!(spans[0].status, SpanStatus::Ok);
    let recorded_header: &Value =
        &spans[0].attributes["inputValue"]["headers"]["authorization"];
    assert_eq!(recorded_header, &json!("scrubbed"));

    // The scrubbed field is zero-weight in the recorded merge map, so a
    // live request with the real header still matches.
    let store = Arc::new(InMemoryMockStore::new());
    store.ingest_spans(&spans);
    assert_eq!(store.len(), 1);

    let rt = Rewind::init(
        RewindConfig::default()
            .with_mode(Mode::Replay)
            .enable_adapter("http"),
        Arc::new(InMemorySink::default()),
        store,
    );
    let kernel = rt.adapter("http");
    let op = Operation::new(
        meta("https://api.x"),
        json!({"url": "https://api.x", "method": "GET",
               "headers": {"authorization": "Bearer secret"}}),
    );
    let out: Result<i32, String> = kernel
        .run(
            op,
            || async { unreachable!() },
            |_| json!({}),
            |entry| entry.map(|_| 1).ok_or_else(|| "miss".to_string()),
        )
        .await;
    assert_eq!(out.unwrap(), 1);
    Ok(())
}
