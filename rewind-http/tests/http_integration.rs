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

//! Integration tests for the HTTP adapter

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parking_lot::Mutex;
use serde_json::{json, Value};

use rewind_core::{
    AdapterSettings, InMemoryMockStore, InMemorySink, Mode, Rewind, RewindConfig, SpanData,
    SpanStatus,
};
use rewind_http::{HttpClient, HttpExecutor, HttpRequest, HttpResponse, HttpResult};

/// Executor serving canned responses keyed by URL, counting calls.
#[derive(Default)]
struct FakeExecutor {
    responses: Mutex<HashMap<String, HttpResponse>>,
    calls: Mutex<Vec<String>>,
}

impl FakeExecutor {
    fn respond(&self, url: &str, response: HttpResponse) {
        self.responses.lock().insert(url.to_string(), response);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl HttpExecutor for FakeExecutor {
    async fn execute(&self, req: &HttpRequest) -> HttpResult<HttpResponse> {
        self.calls.lock().push(req.url.clone());
        Ok(self
            .responses
            .lock()
            .get(&req.url)
            .cloned()
            .unwrap_or_else(|| HttpResponse {
                status: 404,
                status_text: "Not Found".into(),
                headers: HashMap::new(),
                body: Vec::new(),
            }))
    }
}

fn json_response(body: &str) -> HttpResponse {
    HttpResponse {
        status: 200,
        status_text: "OK".into(),
        headers: [("content-type".to_string(), "application/json".to_string())]
            .into_iter()
            .collect(),
        body: body.as_bytes().to_vec(),
    }
}

fn runtime(
    config: RewindConfig,
    store: Arc<InMemoryMockStore>,
) -> (Arc<Rewind>, Arc<InMemorySink>) {
    let sink = Arc::new(InMemorySink::default());
    let rt = Rewind::init(config.enable_adapter("http"), sink.clone(), store);
    (rt, sink)
}

fn replay_store_from(spans: &[SpanData]) -> Arc<InMemoryMockStore> {
    let store = Arc::new(InMemoryMockStore::new());
    store.ingest_spans(spans);
    store
}

/// A GET is recorded with canonical headers and base64 body, and replay
/// materializes a bit-equivalent response without touching the network.
#[tokio::test]
async fn test_get_record_then_replay() {
    let executor = Arc::new(FakeExecutor::default());
    executor.respond("https://api.example.com/users/42", json_response(r#"{"id":42}"#));
    let (rt, sink) = runtime(
        RewindConfig::default().with_mode(Mode::Record),
        Arc::new(InMemoryMockStore::new()),
    );
    let client = HttpClient::new(&rt, executor.clone());

    let req = HttpRequest::new("GET", "https://api.example.com/users/42")
        .header("Accept", "application/json");
    let response = client.request(req.clone()).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body_text(), r#"{"id":42}"#);

    let spans = sink.take();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].name, "https://api.example.com/users/42");
    assert_eq!(spans[0].attributes["inputValue"]["method"], "GET");
    assert_eq!(
        spans[0].attributes["inputValue"]["headers"]["accept"],
        "application/json"
    );
    assert_eq!(spans[0].attributes["outputValue"]["status"], json!(200));
    assert_eq!(
        spans[0].attributes["outputValue"]["body"],
        Value::String(BASE64.encode(br#"{"id":42}"#))
    );

    let replay_exec = Arc::new(FakeExecutor::default());
    let (rt, _sink) = runtime(
        RewindConfig::default().with_mode(Mode::Replay),
        replay_store_from(&spans),
    );
    let client = HttpClient::new(&rt, replay_exec.clone());
    let replayed = client.request(req).await.unwrap();
    assert_eq!(replayed.status, 200);
    assert_eq!(replayed.status_text, "OK");
    assert_eq!(
        replayed.header_value("content-type"),
        Some("application/json")
    );
    assert_eq!(replayed.body_text(), r#"{"id":42}"#);
    assert!(replay_exec.calls().is_empty(), "replay reaches no network");
}

/// Volatile headers never decide replay matching.
#[tokio::test]
async fn test_cookie_change_still_matches() {
    let executor = Arc::new(FakeExecutor::default());
    executor.respond("https://api.example.com/me", json_response(r#"{"ok":true}"#));
    let (rt, sink) = runtime(
        RewindConfig::default().with_mode(Mode::Record),
        Arc::new(InMemoryMockStore::new()),
    );
    let client = HttpClient::new(&rt, executor);

    client
        .request(
            HttpRequest::new("GET", "https://api.example.com/me").header("Cookie", "sid=abc"),
        )
        .await
        .unwrap();
    let spans = sink.take();

    let (rt, _sink) = runtime(
        RewindConfig::default().with_mode(Mode::Replay),
        replay_store_from(&spans),
    );
    let client = HttpClient::new(&rt, Arc::new(FakeExecutor::default()));
    let replayed = client
        .request(
            HttpRequest::new("GET", "https://api.example.com/me").header("Cookie", "sid=other"),
        )
        .await
        .unwrap();
    assert_eq!(replayed.body_text(), r#"{"ok":true}"#);
}

/// Redact and mask rules fire on record: the captured header carries the
/// digest form and the captured body is masked, while the application
/// still sees the raw response.
#[tokio::test]
async fn test_transforms_scrub_recorded_data() {
    let transforms = serde_json::from_value(json!([
        {"matcher": {"headerName": "authorization"}, "action": {"type": "redact"}},
        {"matcher": {"jsonPath": "$.ssn"}, "action": {"type": "mask"}}
    ]))
    .unwrap();
    let mut config = RewindConfig::default().with_mode(Mode::Record);
    config.adapters.insert(
        "http".into(),
        AdapterSettings {
            transforms,
            ..Default::default()
        },
    );

    let executor = Arc::new(FakeExecutor::default());
    executor.respond("https://api.example.com/user", json_response(r#"{"ok":true}"#));
    let (rt, sink) = runtime(config, Arc::new(InMemoryMockStore::new()));
    let client = HttpClient::new(&rt, executor);

    let response = client
        .request(
            HttpRequest::new("POST", "https://api.example.com/user")
                .header("Authorization", "Bearer eyJabc")
                .header("Content-Type", "application/json")
                .body(r#"{"ssn":"123-45-6789"}"#.as_bytes().to_vec()),
        )
        .await
        .unwrap();
    assert_eq!(response.body_text(), r#"{"ok":true}"#);

    let spans = sink.take();
    let input = &spans[0].attributes["inputValue"];
    let auth = input["headers"]["authorization"].as_str().unwrap();
    assert!(auth.starts_with("REDACTED_"));
    assert!(auth.ends_with("..."));

    let body: Value =
        serde_json::from_slice(&BASE64.decode(input["body"].as_str().unwrap()).unwrap()).unwrap();
    assert_eq!(body["ssn"], "***********");
    assert!(spans[0].attributes.contains_key("transformMetadata"));
}

/// Sink self-traffic and skip-header calls bypass instrumentation.
#[tokio::test]
async fn test_self_traffic_is_skipped() {
    let executor = Arc::new(FakeExecutor::default());
    executor.respond("https://ingest.rewind.dev/v1/spans", json_response("{}"));
    executor.respond("https://api.example.com/x", json_response("{}"));
    let mut config = RewindConfig::default().with_mode(Mode::Record);
    config.sink_url_markers.push("ingest.rewind.dev".into());
    let (rt, sink) = runtime(config, Arc::new(InMemoryMockStore::new()));
    let client = HttpClient::new(&rt, executor.clone());

    client
        .request(HttpRequest::new("POST", "https://ingest.rewind.dev/v1/spans"))
        .await
        .unwrap();
    client
        .request(HttpRequest::new("GET", "https://api.example.com/x").header("x-td-skip", "true"))
        .await
        .unwrap();
    assert!(sink.is_empty(), "self-traffic must not produce spans");
    assert_eq!(executor.calls().len(), 2, "self-traffic still executes");
}

/// A replay miss serves the neutral empty 200 instead of raising.
#[tokio::test]
async fn test_replay_miss_serves_neutral_response() {
    let (rt, sink) = runtime(
        RewindConfig::default().with_mode(Mode::Replay),
        Arc::new(InMemoryMockStore::new()),
    );
    let client = HttpClient::new(&rt, Arc::new(FakeExecutor::default()));

    let response = client
        .request(HttpRequest::new("GET", "https://api.example.com/unknown"))
        .await
        .unwrap();
    assert_eq!(response.status, 200);
    assert!(response.body.is_empty());
    assert!(response.headers.is_empty());

    let spans = sink.take();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].status, SpanStatus::Ok);
}

/// Two identical recorded calls replay in order and the third misses
/// into the neutral default.
#[tokio::test]
async fn test_consumption_in_order() {
    let executor = Arc::new(FakeExecutor::default());
    let (rt, sink) = runtime(
        RewindConfig::default().with_mode(Mode::Record),
        Arc::new(InMemoryMockStore::new()),
    );
    let client = HttpClient::new(&rt, executor.clone());

    let req = HttpRequest::new("GET", "https://api.example.com/seq");
    executor.respond("https://api.example.com/seq", json_response(r#"{"n":1}"#));
    client.request(req.clone()).await.unwrap();
    executor.respond("https://api.example.com/seq", json_response(r#"{"n":2}"#));
    client.request(req.clone()).await.unwrap();
    let spans = sink.take();

    let (rt, _sink) = runtime(
        RewindConfig::default().with_mode(Mode::Replay),
        replay_store_from(&spans),
    );
    let client = HttpClient::new(&rt, Arc::new(FakeExecutor::default()));
    let first = client.request(req.clone()).await.unwrap();
    let second = client.request(req.clone()).await.unwrap();
    let third = client.request(req).await.unwrap();
    assert_eq!(first.body_text(), r#"{"n":1}"#);
    assert_eq!(second.body_text(), r#"{"n":2}"#);
    assert!(third.body.is_empty());
}
