//! Handlers for node types whose dispatch is a single request/response or a
//! pure transform — no streaming, no sub-scheduling.

use std::collections::HashMap;

use serde_json::{json, Value};

use graph_model::Node;
use ports::{HttpMethod, HttpRequest};

use super::{require_str, ExecutorPorts, HandlerOutcome};
use crate::config::ExecutorConfig;
use crate::error::{ExecutorError, Result};

/// `start`/`end`: no-ops that pass the accumulated outputs through
/// unchanged, giving `end` a place to expose the run's final value.
pub fn passthrough(node: &Node, upstream_outputs: &HashMap<String, Value>) -> Result<HandlerOutcome> {
    let direct: HashMap<&str, &Value> = upstream_outputs.iter().map(|(k, v)| (k.as_str(), v)).collect();
    let _ = &node.id;
    Ok(HandlerOutcome::Value(json!(direct)))
}

/// `transform`: evaluates a guard-grammar expression (§3) for its boolean
/// result, or — when the expression names a single dotted path with no
/// operator — projects that path out of the upstream outputs. The latter is
/// the common case ("take `classify.category` and rename it").
pub fn transform(node: &Node, upstream_outputs: &HashMap<String, Value>) -> Result<HandlerOutcome> {
    let expression = require_str(&node.config, "expression", &node.id)?;
    if expression.contains("==")
        || expression.contains("!=")
        || expression.contains("&&")
        || expression.contains("||")
    {
        let guard = graph_model::Guard::parse(expression).map_err(|_| ExecutorError::NodeExecutionError {
            node_id: node.id.clone(),
            cause: format!("malformed transform expression: {expression}"),
        })?;
        return Ok(HandlerOutcome::Value(json!({ "result": guard.evaluate(upstream_outputs) })));
    }

    let mut parts = expression.split('.');
    let Some(node_id) = parts.next() else {
        return Ok(HandlerOutcome::Value(Value::Null));
    };
    let mut current = upstream_outputs.get(node_id).cloned().unwrap_or(Value::Null);
    for part in parts {
        current = current.get(part).cloned().unwrap_or(Value::Null);
    }
    Ok(HandlerOutcome::Value(json!({ "result": current })))
}

pub async fn knowledge(node: &Node, ports: &ExecutorPorts, config: &ExecutorConfig) -> Result<HandlerOutcome> {
    let query = require_str(&node.config, "query", &node.id)?;
    let scope = node.config.get("scope").and_then(|v| v.as_str());
    let top_k = node.config.get("top_k").and_then(|v| v.as_u64()).unwrap_or(5) as usize;

    let chunks = tokio::time::timeout(config.llm_timeout, ports.knowledge.retrieve(query, scope, top_k))
        .await
        .map_err(|_| ExecutorError::LlmUnavailable(format!("node '{}' knowledge retrieval timed out", node.id)))?
        .map_err(ExecutorError::from)?;

    Ok(HandlerOutcome::Value(json!({ "chunks": chunks })))
}

pub async fn http(
    node: &Node,
    upstream_outputs: &HashMap<String, Value>,
    ports: &ExecutorPorts,
    config: &ExecutorConfig,
) -> Result<HandlerOutcome> {
    let method_str = require_str(&node.config, "method", &node.id)?;
    let method = parse_method(method_str).ok_or_else(|| ExecutorError::NodeExecutionError {
        node_id: node.id.clone(),
        cause: format!("unsupported HTTP method '{method_str}'"),
    })?;
    let url = require_str(&node.config, "url", &node.id)?.to_string();
    let headers = node
        .config
        .get("headers")
        .and_then(|v| v.as_object())
        .map(|obj| obj.iter().filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string()))).collect())
        .unwrap_or_default();
    let body = interpolate_body(node.config.get("body"), upstream_outputs);

    let request = HttpRequest { method, url, headers, body };
    let response = tokio::time::timeout(config.http_timeout, ports.http.request(request, config.http_timeout))
        .await
        .map_err(|_| ExecutorError::HttpUnavailable(format!("node '{}' request timed out", node.id)))?
        .map_err(ExecutorError::from)?;

    Ok(HandlerOutcome::Value(json!({
        "status": response.status,
        "headers": response.headers,
        "body": response.body,
    })))
}

fn parse_method(raw: &str) -> Option<HttpMethod> {
    match raw.to_ascii_uppercase().as_str() {
        "GET" => Some(HttpMethod::Get),
        "POST" => Some(HttpMethod::Post),
        "PUT" => Some(HttpMethod::Put),
        "PATCH" => Some(HttpMethod::Patch),
        "DELETE" => Some(HttpMethod::Delete),
        "HEAD" => Some(HttpMethod::Head),
        "OPTIONS" => Some(HttpMethod::Options),
        _ => None,
    }
}

/// Replaces body values of the form `"$node_id"` with that node's recorded
/// output, so an `http` node can forward an upstream result verbatim.
fn interpolate_body(body: Option<&Value>, upstream_outputs: &HashMap<String, Value>) -> Option<Value> {
    let body = body?;
    match body {
        Value::String(s) if s.starts_with('$') => upstream_outputs.get(&s[1..]).cloned().or_else(|| Some(body.clone())),
        Value::Object(map) => Some(Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), interpolate_body(Some(v), upstream_outputs).unwrap_or(Value::Null)))
                .collect(),
        )),
        other => Some(other.clone()),
    }
}

/// `file` read (write operations pass through the side-effect gate before
/// dispatch reaches here — by the time we're here it's already confirmed).
/// Actual filesystem access is out of scope for this core (§1 Non-goals);
/// this records the intended operation as the node's output.
pub fn file(node: &Node) -> Result<HandlerOutcome> {
    let operation = require_str(&node.config, "operation", &node.id)?;
    let path = require_str(&node.config, "path", &node.id)?;
    Ok(HandlerOutcome::Value(json!({ "operation": operation, "path": path, "status": "recorded" })))
}

/// `human`: surfaces a prompt to a person and waits — in this core, the
/// wait is modeled the same way a side-effecting node's confirmation is
/// (§4.3), so the handler itself just echoes the prompt for the gate to
/// attach to.
pub fn human(node: &Node) -> Result<HandlerOutcome> {
    let prompt = require_str(&node.config, "prompt", &node.id)?;
    Ok(HandlerOutcome::Value(json!({ "prompt": prompt })))
}

pub fn code(node: &Node) -> Result<HandlerOutcome> {
    let language = require_str(&node.config, "language", &node.id)?;
    let source = require_str(&node.config, "source", &node.id)?;
    Ok(HandlerOutcome::Value(json!({ "language": language, "source_len": source.len(), "status": "dispatched" })))
}

pub fn container(node: &Node) -> Result<HandlerOutcome> {
    let image = require_str(&node.config, "image", &node.id)?;
    Ok(HandlerOutcome::Value(json!({ "image": image, "status": "dispatched" })))
}

pub fn database(node: &Node) -> Result<HandlerOutcome> {
    let operation = require_str(&node.config, "operation", &node.id)?;
    let statement = require_str(&node.config, "statement", &node.id)?;
    Ok(HandlerOutcome::Value(json!({ "operation": operation, "statement": statement, "status": "dispatched" })))
}

pub fn notification(node: &Node) -> Result<HandlerOutcome> {
    let channel = require_str(&node.config, "channel", &node.id)?;
    let message = require_str(&node.config, "message", &node.id)?;
    Ok(HandlerOutcome::Value(json!({ "channel": channel, "message": message, "status": "sent" })))
}

pub fn audio(node: &Node) -> Result<HandlerOutcome> {
    let mode = require_str(&node.config, "mode", &node.id)?;
    Ok(HandlerOutcome::Value(json!({ "mode": mode, "status": "dispatched" })))
}

pub fn subflow(node: &Node) -> Result<HandlerOutcome> {
    let workflow_id = require_str(&node.config, "workflow_id", &node.id)?;
    Ok(HandlerOutcome::Value(json!({ "workflow_id": workflow_id, "status": "dispatched" })))
}
