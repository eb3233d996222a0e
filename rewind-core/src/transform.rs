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

//! Transform engine
//!
//! Compiles declarative `{matcher, action}` rules into span-mutation
//! appliers and runs them over captured input/output values before
//! attributes are attached. A rule that fails to compile is reported and
//! discarded; the remaining rules still run. A rule that fails while
//! applying leaves its target untouched so the recording stays valid.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

/// Default prefix for redacted values.
pub const DEFAULT_REDACT_PREFIX: &str = "REDACTED_";

/// Default fill character for masked values.
pub const DEFAULT_MASK_FILL: char = '*';

/// Which side of the interaction a rule applies to. Absent means both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Request,
    Response,
}

/// Declarative matcher. Exactly one target field must be set; common
/// fields narrow when the rule fires. Unknown config fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleMatcher {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_param: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_path: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_body: Option<bool>,
}

/// What to do with a matched field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RuleAction {
    /// Replace with `{prefix}{sha256(value)[0..12]}...`.
    Redact {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prefix: Option<String>,
    },
    /// Replace each character with a fill character.
    Mask {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fill: Option<char>,
    },
    /// Substitute a literal.
    Replace { value: Value },
    /// Scrub the entire input and output to empty records.
    Drop,
}

impl RuleAction {
    fn label(&self) -> &'static str {
        match self {
            RuleAction::Redact { .. } => "redact",
            RuleAction::Mask { .. } => "mask",
            RuleAction::Replace { .. } => "replace",
            RuleAction::Drop => "drop",
        }
    }
}

/// One declarative transform rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformRule {
    pub matcher: RuleMatcher,
    pub action: RuleAction,
}

#[derive(Debug, Clone, PartialEq)]
enum PathStep {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone)]
enum Target {
    JsonPath(Vec<PathStep>),
    QueryParam(String),
    HeaderName(String),
    UrlPath,
    FullBody,
}

impl Target {
    fn label(&self) -> String {
        match self {
            Target::JsonPath(_) => "jsonPath".to_string(),
            Target::QueryParam(p) => format!("queryParam:{p}"),
            Target::HeaderName(h) => format!("headerName:{h}"),
            Target::UrlPath => "urlPath".to_string(),
            Target::FullBody => "fullBody".to_string(),
        }
    }
}

/// A compiled rule: regexes built once, target parsed.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    direction: Option<Direction>,
    method: Option<String>,
    path_pattern: Option<Regex>,
    host: Option<Regex>,
    target: Target,
    action: RuleAction,
}

/// Parse a restricted JSONPath: `$.a.b[0].c`.
fn parse_json_path(path: &str) -> Result<Vec<PathStep>, String> {
    let rest = path
        .strip_prefix('$')
        .ok_or_else(|| format!("jsonPath must start with '$': {path}"))?;
    let mut steps = Vec::new();
    let mut chars = rest.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '.' => {
                let mut key = String::new();
                while let Some(&n) = chars.peek() {
                    if n == '.' || n == '[' {
                        break;
                    }
                    key.push(n);
                    chars.next();
                }
                if key.is_empty() {
                    return Err(format!("empty key segment in jsonPath: {path}"));
                }
                steps.push(PathStep::Key(key));
            }
            '[' => {
                let mut digits = String::new();
                for n in chars.by_ref() {
                    if n == ']' {
                        break;
                    }
                    digits.push(n);
                }
                let idx: usize = digits
                    .parse()
                    .map_err(|_| format!("bad index segment in jsonPath: {path}"))?;
                steps.push(PathStep::Index(idx));
            }
            other => return Err(format!("unexpected '{other}' in jsonPath: {path}")),
        }
    }
    if steps.is_empty() {
        return Err(format!("jsonPath selects nothing: {path}"));
    }
    Ok(steps)
}

fn compile_one(rule: &TransformRule) -> Result<CompiledRule, String> {
    let m = &rule.matcher;
    let mut targets = Vec::new();
    if let Some(p) = &m.json_path {
        targets.push(Target::JsonPath(parse_json_path(p)?));
    }
    if let Some(p) = &m.query_param {
        targets.push(Target::QueryParam(p.clone()));
    }
    if let Some(h) = &m.header_name {
        targets.push(Target::HeaderName(h.to_ascii_lowercase()));
    }
    if m.url_path == Some(true) {
        targets.push(Target::UrlPath);
    }
    if m.full_body == Some(true) {
        targets.push(Target::FullBody);
    }
    if targets.len() != 1 {
        return Err(format!(
            "matcher must name exactly one target, found {}",
            targets.len()
        ));
    }

    let compile_regex = |src: &Option<String>, what: &str| -> Result<Option<Regex>, String> {
        match src {
            Some(s) => Regex::new(s)
                .map(Some)
                .map_err(|e| format!("invalid {what} regex '{s}': {e}")),
            None => Ok(None),
        }
    };

    Ok(CompiledRule {
        direction: m.direction,
        method: m.method.as_ref().map(|s| s.to_ascii_uppercase()),
        path_pattern: compile_regex(&m.path_pattern, "pathPattern")?,
        host: compile_regex(&m.host, "host")?,
        target: targets.into_iter().next().unwrap_or(Target::FullBody),
        action: rule.action.clone(),
    })
}

/// Compile a rule list. Invalid rules are reported through `tracing` and
/// discarded; the rest compile.
pub fn compile(rules: &[TransformRule]) -> Vec<CompiledRule> {
    let mut compiled = Vec::with_capacity(rules.len());
    for (idx, rule) in rules.iter().enumerate() {
        match compile_one(rule) {
            Ok(c) => compiled.push(c),
            Err(e) => {
                tracing::warn!(rule = idx, error = %e, "transform rule discarded");
            }
        }
    }
    compiled
}

/// The captured values a transform mutates in place.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanPayload {
    pub input_value: Value,
    pub output_value: Value,
}

/// What a transform pass did.
#[derive(Debug, Clone, Default)]
pub struct TransformOutcome {
    /// Entries for the `transformMetadata` span attribute.
    pub metadata: Vec<Value>,
    /// Input field paths whose captured form no longer equals the live
    /// form. Replay matching must treat these as zero-weight, so they
    /// are folded into the recorded merge map.
    pub input_paths: Vec<String>,
}

impl TransformOutcome {
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }
}

fn touched_input_path(target: &Target) -> String {
    match target {
        Target::HeaderName(name) => format!("headers.{name}"),
        Target::QueryParam(_) | Target::UrlPath => "url".to_string(),
        Target::JsonPath(_) | Target::FullBody => "body".to_string(),
    }
}

/// Apply compiled rules to a payload.
pub fn apply(rules: &[CompiledRule], payload: &mut SpanPayload) -> TransformOutcome {
    let mut outcome = TransformOutcome::default();
    for rule in rules {
        if !rule_matches(rule, &payload.input_value) {
            continue;
        }
        if matches!(rule.action, RuleAction::Drop) {
            if let Some(keys) = payload.input_value.as_object().map(|m| {
                m.keys().cloned().collect::<Vec<_>>()
            }) {
                outcome.input_paths.extend(keys);
            }
            scrub_record(&mut payload.input_value);
            scrub_record(&mut payload.output_value);
            outcome
                .metadata
                .push(json!({"target": rule.target.label(), "action": "drop"}));
            continue;
        }
        let mut fired = false;
        for side in sides(rule.direction) {
            let value = match side {
                Direction::Request => &mut payload.input_value,
                Direction::Response => &mut payload.output_value,
            };
            let side_fired = apply_target(&rule.target, &rule.action, value);
            if side_fired && side == Direction::Request {
                outcome.input_paths.push(touched_input_path(&rule.target));
            }
            fired |= side_fired;
        }
        if fired {
            outcome.metadata.push(json!({
                "target": rule.target.label(),
                "action": rule.action.label(),
            }));
        }
    }
    outcome
}

fn sides(direction: Option<Direction>) -> Vec<Direction> {
    match direction {
        Some(d) => vec![d],
        None => vec![Direction::Request, Direction::Response],
    }
}

fn rule_matches(rule: &CompiledRule, input: &Value) -> bool {
    if let Some(method) = &rule.method {
        let actual = input
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if !actual.eq_ignore_ascii_case(method) {
            return false;
        }
    }
    if rule.path_pattern.is_some() || rule.host.is_some() {
        let url = input.get("url").and_then(Value::as_str).unwrap_or_default();
        let (host, path) = split_url(url);
        if let Some(re) = &rule.host {
            if !re.is_match(host) {
                return false;
            }
        }
        if let Some(re) = &rule.path_pattern {
            if !re.is_match(path) {
                return false;
            }
        }
    }
    true
}

/// Split a URL into host and path, ignoring scheme and query.
fn split_url(url: &str) -> (&str, &str) {
    let rest = match url.find("://") {
        Some(pos) => &url[pos + 3..],
        None => url,
    };
    let rest = rest.split('?').next().unwrap_or(rest);
    match rest.find('/') {
        Some(pos) => (&rest[..pos], &rest[pos..]),
        None => (rest, "/"),
    }
}

fn apply_target(target: &Target, action: &RuleAction, value: &mut Value) -> bool {
    match target {
        Target::HeaderName(name) => transform_header(value, name, action),
        Target::QueryParam(param) => transform_query_param(value, param, action),
        Target::UrlPath => transform_url_path(value, action),
        Target::FullBody => transform_body(value, |body| Some(transform_string(body, action))),
        Target::JsonPath(steps) => transform_json_body(value, steps, action),
    }
}

fn transform_header(value: &mut Value, name: &str, action: &RuleAction) -> bool {
    let Some(headers) = value.get_mut("headers").and_then(Value::as_object_mut) else {
        return false;
    };
    let mut fired = false;
    for (key, val) in headers.iter_mut() {
        if key.eq_ignore_ascii_case(name) {
            *val = transform_value(val, action);
            fired = true;
        }
    }
    fired
}

fn transform_query_param(value: &mut Value, param: &str, action: &RuleAction) -> bool {
    let Some(url) = value.get("url").and_then(Value::as_str) else {
        return false;
    };
    let Some((base, query)) = url.split_once('?') else {
        return false;
    };
    let mut fired = false;
    let rebuilt: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) if k == param => {
                fired = true;
                format!("{k}={}", transform_string(v, action))
            }
            _ => pair.to_string(),
        })
        .collect();
    if fired {
        value["url"] = Value::String(format!("{base}?{}", rebuilt.join("&")));
    }
    fired
}

fn transform_url_path(value: &mut Value, action: &RuleAction) -> bool {
    let Some(url) = value.get("url").and_then(Value::as_str) else {
        return false;
    };
    let (prefix_len, path_end) = {
        let after_scheme = url.find("://").map(|p| p + 3).unwrap_or(0);
        let path_start = url[after_scheme..]
            .find('/')
            .map(|p| after_scheme + p)
            .unwrap_or(url.len());
        let path_end = url.find('?').unwrap_or(url.len());
        (path_start, path_end.max(path_start))
    };
    let path = &url[prefix_len..path_end];
    if path.is_empty() {
        return false;
    }
    let transformed = transform_string(path, action);
    let rebuilt = format!("{}{}{}", &url[..prefix_len], transformed, &url[path_end..]);
    value["url"] = Value::String(rebuilt);
    true
}

/// Run `f` over the body string, honoring base64 encoding. The mutated
/// body is re-encoded the way it arrived.
fn transform_body(value: &mut Value, f: impl FnOnce(&str) -> Option<String>) -> bool {
    let encoded = body_is_base64(value);
    let Some(body) = value.get("body").and_then(Value::as_str) else {
        return false;
    };
    if body.is_empty() {
        return false;
    }
    let decoded = if encoded {
        match BASE64.decode(body) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(error = %e, "body is not UTF-8, transform skipped");
                    return false;
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "body base64 decode failed, transform skipped");
                return false;
            }
        }
    } else {
        body.to_string()
    };
    let Some(mutated) = f(&decoded) else {
        return false;
    };
    let stored = if encoded {
        BASE64.encode(mutated.as_bytes())
    } else {
        mutated
    };
    value["body"] = Value::String(stored);
    true
}

fn body_is_base64(value: &Value) -> bool {
    value
        .get("bodyEncoding")
        .and_then(Value::as_str)
        .map(|e| e.eq_ignore_ascii_case("base64"))
        .unwrap_or(false)
}

fn transform_json_body(value: &mut Value, steps: &[PathStep], action: &RuleAction) -> bool {
    transform_body(value, |body| {
        let mut parsed: Value = match serde_json::from_str(body) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "body is not JSON, jsonPath transform skipped");
                return None;
            }
        };
        if !transform_at_path(&mut parsed, steps, action) {
            return None;
        }
        match serde_json::to_string(&parsed) {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!(error = %e, "body re-serialization failed");
                None
            }
        }
    })
}

fn transform_at_path(value: &mut Value, steps: &[PathStep], action: &RuleAction) -> bool {
    let Some((step, rest)) = steps.split_first() else {
        *value = transform_value(value, action);
        return true;
    };
    let next = match step {
        PathStep::Key(k) => value.get_mut(k.as_str()),
        PathStep::Index(i) => value.get_mut(*i),
    };
    match next {
        Some(inner) => transform_at_path(inner, rest, action),
        None => false,
    }
}

fn transform_value(value: &Value, action: &RuleAction) -> Value {
    match action {
        RuleAction::Replace { value: literal } => literal.clone(),
        _ => {
            let text = match value.as_str() {
                Some(s) => s.to_string(),
                None => value.to_string(),
            };
            Value::String(transform_string(&text, action))
        }
    }
}

fn transform_string(text: &str, action: &RuleAction) -> String {
    match action {
        RuleAction::Redact { prefix } => {
            let prefix = prefix.as_deref().unwrap_or(DEFAULT_REDACT_PREFIX);
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            let digest = hex::encode(hasher.finalize());
            format!("{prefix}{}...", &digest[..12])
        }
        RuleAction::Mask { fill } => {
            let fill = fill.unwrap_or(DEFAULT_MASK_FILL);
            std::iter::repeat(fill).take(text.chars().count()).collect()
        }
        RuleAction::Replace { value } => match value.as_str() {
            Some(s) => s.to_string(),
            None => value.to_string(),
        },
        RuleAction::Drop => String::new(),
    }
}

/// Empty out a record in place: strings to `""`, numbers to `0`, bools to
/// `false`, arrays to `[]`, nested objects to `{}`. Top-level keys stay so
/// the scrubbed record keeps its shape (status 0, empty headers, empty
/// body).
fn scrub_record(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                *v = match v {
                    Value::String(_) => Value::String(String::new()),
                    Value::Number(_) => json!(0),
                    Value::Bool(_) => Value::Bool(false),
                    Value::Array(_) => Value::Array(Vec::new()),
                    Value::Object(_) => Value::Object(Map::new()),
                    Value::Null => Value::Null,
                };
            }
        }
        other => *other = Value::Object(Map::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule_json(raw: Value) -> TransformRule {
        serde_json::from_value(raw).unwrap()
    }

    fn payload(input: Value, output: Value) -> SpanPayload {
        SpanPayload {
            input_value: input,
            output_value: output,
        }
    }

    #[test]
    fn test_redact_header_case_insensitive() {
        let rules = compile(&[rule_json(json!({
            "matcher": {"headerName": "Authorization"},
            "action": {"type": "redact"}
        }))]);
        let mut p = payload(
            json!({"url": "https://x/user", "method": "POST",
                   "headers": {"authorization": "Bearer eyJhbGciOi"}}),
            json!({"status": 200, "headers": {}}),
        );
        let outcome = apply(&rules, &mut p);
        let redacted = p.input_value["headers"]["authorization"].as_str().unwrap();
        assert!(redacted.starts_with("REDACTED_"));
        assert!(redacted.ends_with("..."));
        // prefix + 12 hex chars + "..."
        assert_eq!(redacted.len(), "REDACTED_".len() + 12 + 3);
        assert_eq!(outcome.metadata.len(), 1);
        // The scrubbed field is flagged so replay matching ignores it.
        assert_eq!(outcome.input_paths, vec!["headers.authorization"]);
    }

    #[test]
    fn test_mask_json_path_in_base64_body() {
        let rules = compile(&[rule_json(json!({
            "matcher": {"jsonPath": "$.ssn"},
            "action": {"type": "mask"}
        }))]);
        let body = BASE64.encode(br#"{"ssn":"123-45-6789","name":"jo"}"#);
        let mut p = payload(
            json!({"url": "https://x/user", "method": "POST",
                   "body": body, "bodyEncoding": "base64", "headers": {}}),
            json!({"status": 200, "headers": {}, "body": ""}),
        );
        apply(&rules, &mut p);
        let stored = p.input_value["body"].as_str().unwrap();
        let decoded: Value =
            serde_json::from_slice(&BASE64.decode(stored).unwrap()).unwrap();
        assert_eq!(decoded["ssn"], "***********");
        assert_eq!(decoded["name"], "jo");
    }

    #[test]
    fn test_drop_scrubs_both_sides() {
        let rules = compile(&[rule_json(json!({
            "matcher": {"fullBody": true, "pathPattern": "/secret"},
            "action": {"type": "drop"}
        }))]);
        let mut p = payload(
            json!({"url": "https://x/secret", "method": "POST",
                   "headers": {"a": "b"}, "body": "cGF5bG9hZA=="}),
            json!({"status": 200, "statusText": "OK",
                   "headers": {"c": "d"}, "body": "cmVzcG9uc2U="}),
        );
        apply(&rules, &mut p);
        assert_eq!(p.input_value["body"], "");
        assert_eq!(p.input_value["headers"], json!({}));
        assert_eq!(p.output_value["status"], json!(0));
        assert_eq!(p.output_value["statusText"], "");
        assert_eq!(p.output_value["headers"], json!({}));
        assert_eq!(p.output_value["body"], "");
    }

    #[test]
    fn test_invalid_regex_discards_only_that_rule() {
        let rules = compile(&[
            rule_json(json!({
                "matcher": {"headerName": "cookie", "host": "("},
                "action": {"type": "mask"}
            })),
            rule_json(json!({
                "matcher": {"headerName": "cookie"},
                "action": {"type": "mask"}
            })),
        ]);
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn test_exactly_one_target_enforced() {
        let none = rule_json(json!({"matcher": {}, "action": {"type": "mask"}}));
        let two = rule_json(json!({
            "matcher": {"headerName": "a", "queryParam": "b"},
            "action": {"type": "mask"}
        }));
        assert!(compile(&[none, two]).is_empty());
    }

    #[test]
    fn test_query_param_and_url_path() {
        let rules = compile(&[
            rule_json(json!({
                "matcher": {"queryParam": "token"},
                "action": {"type": "replace", "value": "xxx"}
            })),
            rule_json(json!({
                "matcher": {"urlPath": true, "host": "secrets\\."},
                "action": {"type": "mask"}
            })),
        ]);
        let mut p = payload(
            json!({"url": "https://secrets.example.com/v1/keys?token=abc&x=1",
                   "method": "GET", "headers": {}}),
            json!({"status": 200, "headers": {}}),
        );
        apply(&rules, &mut p);
        let url = p.input_value["url"].as_str().unwrap();
        assert!(url.contains("token=xxx"));
        // The whole path component, leading slash included, is masked.
        assert!(url.contains("********"));
        assert!(url.starts_with("https://secrets.example.com"));
    }

    #[test]
    fn test_direction_restricts_side() {
        let rules = compile(&[rule_json(json!({
            "matcher": {"headerName": "set-cookie", "direction": "response"},
            "action": {"type": "redact"}
        }))]);
        let mut p = payload(
            json!({"url": "https://x", "method": "GET",
                   "headers": {"set-cookie": "req-side"}}),
            json!({"status": 200, "headers": {"set-cookie": "res-side"}}),
        );
        apply(&rules, &mut p);
        assert_eq!(p.input_value["headers"]["set-cookie"], "req-side");
        assert!(p.output_value["headers"]["set-cookie"]
            .as_str()
            .unwrap()
            .starts_with("REDACTED_"));
    }

    #[test]
    fn test_method_condition() {
        let rules = compile(&[rule_json(json!({
            "matcher": {"fullBody": true, "method": "post"},
            "action": {"type": "mask"}
        }))]);
        let mut get = payload(
            json!({"url": "https://x", "method": "GET", "body": "abc", "headers": {}}),
            json!({}),
        );
        apply(&rules, &mut get);
        assert_eq!(get.input_value["body"], "abc");

        let mut post = payload(
            json!({"url": "https://x", "method": "POST", "body": "abc", "headers": {}}),
            json!({}),
        );
        apply(&rules, &mut post);
        assert_eq!(post.input_value["body"], "***");
    }

    #[test]
    fn test_unparseable_body_leaves_data_raw() {
        let rules = compile(&[rule_json(json!({
            "matcher": {"jsonPath": "$.a"},
            "action": {"type": "mask"}
        }))]);
        let mut p = payload(
            json!({"url": "https://x", "method": "POST",
                   "body": "not json at all", "headers": {}}),
            json!({}),
        );
        let outcome = apply(&rules, &mut p);
        assert_eq!(p.input_value["body"], "not json at all");
        assert!(outcome.is_empty());
    }

    #[test]
    fn test_json_path_parsing() {
        assert!(parse_json_path("$.a.b[0].c").is_ok());
        assert_eq!(
            parse_json_path("$.a[2]").unwrap(),
            vec![
                PathStep::Key("a".into()),
                PathStep::Index(2),
            ]
        );
        assert!(parse_json_path("a.b").is_err());
        assert!(parse_json_path("$").is_err());
        assert!(parse_json_path("$.a[x]").is_err());
    }
}
