//! Handlers for the branching and fan-out node types: `conditional`,
//! `parallel`, and `loop` (§4.3).
//!
//! `parallel` and `loop` both describe their subtrees as node descriptors
//! embedded directly in the node's own config (`{id, type, config}`) rather
//! than as separately scheduled graph nodes — there is no repository handle
//! available at dispatch time to resolve an external reference, so the
//! descriptor is self-contained. See `DESIGN.md` for the Open Question this
//! resolves.

use std::collections::HashMap;

use futures::future::join_all;
use serde_json::{json, Value};

use graph_model::{Guard, Node};
use tokio::sync::mpsc::UnboundedSender;

use super::{dispatch, require_str, ExecutorPorts, HandlerOutcome};
use crate::config::ExecutorConfig;
use crate::context::WorkflowExecutionContext;
use crate::error::{ExecutorError, Result};
use crate::events::ExecutionEvent;

pub fn conditional(node: &Node, upstream_outputs: &HashMap<String, Value>) -> Result<HandlerOutcome> {
    let source = require_str(&node.config, "guard", &node.id)?;
    let guard = Guard::parse(source).map_err(|_| ExecutorError::NodeExecutionError {
        node_id: node.id.clone(),
        cause: format!("malformed guard expression: {source}"),
    })?;
    let matched = guard.evaluate(upstream_outputs);
    Ok(HandlerOutcome::Value(json!({ "matched": matched })))
}

#[derive(serde::Deserialize)]
struct ChildDescriptor {
    id: String,
    #[serde(rename = "type")]
    node_type: String,
    #[serde(default)]
    config: Value,
}

fn build_child(descriptor: &ChildDescriptor, node_id: &str) -> Result<Node> {
    Node::new(descriptor.id.clone(), &descriptor.node_type, descriptor.config.clone()).map_err(|e| {
        ExecutorError::NodeExecutionError { node_id: node_id.to_string(), cause: format!("invalid child descriptor: {e}") }
    })
}

/// `parallel` (§4.3): fans out into N concurrent subtrees, waits for all,
/// joins their outputs keyed by child id. Failure of any child is returned
/// as-is and left to the parent's failure policy.
pub async fn parallel(
    node: &Node,
    upstream_outputs: &HashMap<String, Value>,
    ctx: &WorkflowExecutionContext,
    ports: &ExecutorPorts,
    config: &ExecutorConfig,
    events: &UnboundedSender<ExecutionEvent>,
) -> Result<HandlerOutcome> {
    let raw_children = node.config.get("children").and_then(|v| v.as_array()).ok_or_else(|| {
        ExecutorError::NodeExecutionError { node_id: node.id.clone(), cause: "missing required field 'children'".into() }
    })?;
    let descriptors: Vec<ChildDescriptor> = raw_children
        .iter()
        .map(|v| serde_json::from_value(v.clone()))
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| ExecutorError::NodeExecutionError { node_id: node.id.clone(), cause: format!("malformed child descriptor: {e}") })?;

    let children: Vec<Node> = descriptors.iter().map(|d| build_child(d, &node.id)).collect::<Result<_>>()?;

    let futures = children.iter().map(|child| dispatch(child, upstream_outputs, ctx, ports, config, events));
    let results = join_all(futures).await;

    let mut joined = serde_json::Map::new();
    for (child, result) in children.iter().zip(results) {
        let HandlerOutcome::Value(value) = result?;
        joined.insert(child.id.clone(), value);
    }
    Ok(HandlerOutcome::Value(Value::Object(joined)))
}

/// `loop` (§4.3): repeatedly executes its body node up to `max_iterations`
/// or until `until` (a guard expression evaluated against `{"_iter": <last
/// output>}`) returns true. Each iteration's output is appended to the
/// result; a `node-progress` event reports the iteration index.
pub async fn loop_node(
    node: &Node,
    upstream_outputs: &HashMap<String, Value>,
    ctx: &WorkflowExecutionContext,
    ports: &ExecutorPorts,
    config: &ExecutorConfig,
    events: &UnboundedSender<ExecutionEvent>,
) -> Result<HandlerOutcome> {
    let body_value = node.config.get("body").ok_or_else(|| ExecutorError::NodeExecutionError {
        node_id: node.id.clone(),
        cause: "missing required field 'body'".into(),
    })?;
    let descriptor: ChildDescriptor = serde_json::from_value(body_value.clone()).map_err(|e| {
        ExecutorError::NodeExecutionError { node_id: node.id.clone(), cause: format!("malformed loop body: {e}") }
    })?;
    let body = build_child(&descriptor, &node.id)?;

    let max_iterations = node.config.get("max_iterations").and_then(|v| v.as_u64()).unwrap_or(10) as usize;
    let until = node.config.get("until").and_then(|v| v.as_str()).map(Guard::parse).transpose().map_err(|_| {
        ExecutorError::NodeExecutionError { node_id: node.id.clone(), cause: "malformed 'until' expression".into() }
    })?;

    let mut iterations = Vec::new();
    let mut scoped_outputs = upstream_outputs.clone();
    for iteration in 0..max_iterations {
        if ctx.cancellation.is_cancelled() {
            return Err(ExecutorError::Cancelled);
        }
        let _ = events.send(ExecutionEvent::NodeProgress { node_id: node.id.clone(), delta: iteration.to_string() });

        let HandlerOutcome::Value(output) = dispatch(&body, &scoped_outputs, ctx, ports, config, events).await?;
        iterations.push(output.clone());
        scoped_outputs.insert("_iter".to_string(), output.clone());

        if let Some(guard) = &until {
            if guard.evaluate(&scoped_outputs) {
                break;
            }
        }
    }

    let count = iterations.len();
    Ok(HandlerOutcome::Value(json!({ "iterations": iterations, "count": count })))
}
