//! The `llm` node handler (§4.3 "Streaming LLM nodes"): obtains a streaming
//! token iterator from the LLM port, emits one `node-progress` per token,
//! and finishes with the concatenated text as the node's output.

use std::collections::HashMap;

use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;

use graph_model::Node;
use ports::ChatMessage;

use super::{require_str, ExecutorPorts, HandlerOutcome};
use crate::config::ExecutorConfig;
use crate::error::{ExecutorError, Result};
use crate::events::ExecutionEvent;

pub async fn run(
    node: &Node,
    _upstream_outputs: &HashMap<String, Value>,
    ports: &ExecutorPorts,
    config: &ExecutorConfig,
    events: &UnboundedSender<ExecutionEvent>,
) -> Result<HandlerOutcome> {
    let prompt = require_str(&node.config, "prompt", &node.id)?;
    let messages = vec![ChatMessage::user(prompt)];

    let streaming = tokio::time::timeout(config.llm_timeout, ports.llm.invoke_streaming(&messages))
        .await
        .map_err(|_| ExecutorError::LlmUnavailable(format!("node '{}' timed out waiting for a stream", node.id)))?
        .map_err(ExecutorError::from)?;

    let mut stream = streaming;
    let mut text = String::new();
    loop {
        let next = tokio::time::timeout(config.llm_timeout, stream.next())
            .await
            .map_err(|_| ExecutorError::LlmUnavailable(format!("node '{}' timed out waiting for a token", node.id)))?;
        match next {
            Some(token) => {
                text.push_str(&token.delta);
                if !token.delta.is_empty() {
                    let _ = events.send(ExecutionEvent::NodeProgress { node_id: node.id.clone(), delta: token.delta });
                }
                if token.is_final {
                    break;
                }
            }
            None => break,
        }
    }

    Ok(HandlerOutcome::Value(json!({ "text": text })))
}
