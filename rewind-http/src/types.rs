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

//! Request/response shapes
//!
//! Owned request and response values with byte bodies. Captured values
//! carry the body base64-encoded with a decoded-type hint derived from
//! the content-type header, and all header keys lowercased so record and
//! replay fingerprints agree.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Map, Value};

use crate::error::{HttpError, HttpResult};

/// An outbound request as the application issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Header lookup, case-insensitive.
    pub fn header_value(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// A response as the application observes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// The neutral response served on a documented replay miss.
    pub fn neutral() -> Self {
        Self {
            status: 200,
            status_text: "OK".to_string(),
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn header_value(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Lowercase header keys into a canonical JSON map.
pub(crate) fn canonical_headers(headers: &HashMap<String, String>) -> Value {
    let mut out = Map::new();
    for (k, v) in headers {
        out.insert(k.to_ascii_lowercase(), Value::String(v.clone()));
    }
    Value::Object(out)
}

/// Decoded-type hint derived from the content-type header.
pub(crate) fn body_type_hint(headers: &HashMap<String, String>) -> &'static str {
    let content_type = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
        .map(|(_, v)| v.to_ascii_lowercase())
        .unwrap_or_default();
    if content_type.contains("json") {
        "json"
    } else if content_type.starts_with("text/")
        || content_type.contains("xml")
        || content_type.contains("urlencoded")
    {
        "text"
    } else {
        "binary"
    }
}

/// Capture a request as the recorded input value.
pub(crate) fn request_to_value(req: &HttpRequest) -> Value {
    json!({
        "url": req.url,
        "method": req.method.to_ascii_uppercase(),
        "headers": canonical_headers(&req.headers),
        "body": BASE64.encode(&req.body),
        "bodyEncoding": "base64",
        "bodyType": body_type_hint(&req.headers),
    })
}

/// Capture a response as the recorded output value.
pub(crate) fn response_to_value(res: &HttpResponse) -> Value {
    json!({
        "status": res.status,
        "statusText": res.status_text,
        "headers": canonical_headers(&res.headers),
        "body": BASE64.encode(&res.body),
        "bodyEncoding": "base64",
        "bodyType": body_type_hint(&res.headers),
    })
}

/// Rebuild the response surface from a recorded output value,
/// bit-equivalent to what was captured.
pub(crate) fn response_from_value(value: &Value) -> HttpResult<HttpResponse> {
    let obj = value
        .as_object()
        .ok_or_else(|| HttpError::MalformedRecording("output is not an object".into()))?;
    let status = obj
        .get("status")
        .and_then(Value::as_u64)
        .ok_or_else(|| HttpError::MalformedRecording("missing status".into()))? as u16;
    let status_text = obj
        .get("statusText")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let headers = obj
        .get("headers")
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string()))
                .collect()
        })
        .unwrap_or_default();
    let body = match obj.get("body").and_then(Value::as_str) {
        Some(encoded) if !encoded.is_empty() => BASE64
            .decode(encoded)
            .map_err(|e| HttpError::MalformedRecording(format!("body base64: {e}")))?,
        _ => Vec::new(),
    };
    Ok(HttpResponse {
        status,
        status_text,
        headers,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_lowercased_in_capture() {
        let req = HttpRequest::new("get", "https://x")
            .header("Accept", "application/json")
            .header("X-Trace", "1");
        let v = request_to_value(&req);
        assert_eq!(v["headers"]["accept"], "application/json");
        assert_eq!(v["headers"]["x-trace"], "1");
        assert_eq!(v["method"], "GET");
    }

    #[test]
    fn test_body_type_hint() {
        let json_req =
            HttpRequest::new("POST", "https://x").header("Content-Type", "application/json");
        assert_eq!(body_type_hint(&json_req.headers), "json");
        let text = HttpRequest::new("POST", "https://x").header("content-type", "text/plain");
        assert_eq!(body_type_hint(&text.headers), "text");
        let bin = HttpRequest::new("POST", "https://x");
        assert_eq!(body_type_hint(&bin.headers), "binary");
    }

    #[test]
    fn test_response_round_trip_is_bit_equivalent() {
        let res = HttpResponse {
            status: 201,
            status_text: "Created".into(),
            headers: [("content-type".to_string(), "application/json".to_string())]
                .into_iter()
                .collect(),
            body: br#"{"id":42}"#.to_vec(),
        };
        let back = response_from_value(&response_to_value(&res)).unwrap();
        assert_eq!(back, res);
    }

    #[test]
    fn test_malformed_recording_rejected() {
        assert!(response_from_value(&json!(null)).is_err());
        assert!(response_from_value(&json!({"statusText": "OK"})).is_err());
        assert!(response_from_value(&json!({"status": 200, "body": "!!"})).is_err());
    }
}
