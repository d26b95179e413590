//! Per-node-type dispatch (§4.3 "Node dispatch"): each handler receives the
//! node's config, the accumulated upstream outputs, and the execution
//! context, and returns a structured output or a typed [`ExecutorError`].
//!
//! The registry is a closed match over [`graph_model::NodeType`], mirroring
//! the closed-registry discipline `graph_model::node_type` already applies
//! to the type catalog itself — adding a node type is a code change here,
//! never data-driven.

mod control;
mod llm;
mod simple;

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use graph_model::{Node, NodeType};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use ports::{ConfirmationPort, HttpPort, KnowledgePort, LlmPort};

use crate::config::ExecutorConfig;
use crate::context::WorkflowExecutionContext;
use crate::error::{ExecutorError, Result};
use crate::events::ExecutionEvent;

/// The bundle of abstract ports a handler may call through; never a
/// concrete client (§4.6 "the Planner and Executor never import concrete
/// adapters").
#[derive(Clone)]
pub struct ExecutorPorts {
    pub llm: Arc<dyn LlmPort>,
    pub http: Arc<dyn HttpPort>,
    pub knowledge: Arc<dyn KnowledgePort>,
    pub confirmation: Arc<dyn ConfirmationPort>,
}

/// What a handler produced, beyond its plain JSON output.
pub enum HandlerOutcome {
    /// A value recorded against this node's id in the context.
    Value(Value),
}

/// Dispatch one node. `upstream_outputs` is the full accumulated map, not
/// just this node's direct predecessors — guard evaluation and `transform`
/// expressions may reach further back in the graph (§4.3). `_ctx` is
/// threaded through for handlers that need run-scoped state (none do yet,
/// but every handler signature accepts it so adding one never churns the
/// dispatch table).
///
/// Returns a boxed future rather than an `async fn` because `loop`/`parallel`
/// dispatch their embedded child node descriptors back through this same
/// function (§4.3 "fans out into N concurrent subtrees") — a directly
/// recursive `async fn` has no statically known size.
pub fn dispatch<'a>(
    node: &'a Node,
    upstream_outputs: &'a HashMap<String, Value>,
    ctx: &'a WorkflowExecutionContext,
    ports: &'a ExecutorPorts,
    config: &'a ExecutorConfig,
    events: &'a UnboundedSender<ExecutionEvent>,
) -> BoxFuture<'a, Result<HandlerOutcome>> {
    Box::pin(async move {
        match node.node_type {
            NodeType::Start | NodeType::End => simple::passthrough(node, upstream_outputs),
            NodeType::Transform => simple::transform(node, upstream_outputs),
            NodeType::Llm => llm::run(node, upstream_outputs, ports, config, events).await,
            NodeType::Knowledge => simple::knowledge(node, ports, config).await,
            NodeType::Http => simple::http(node, upstream_outputs, ports, config).await,
            NodeType::File => simple::file(node),
            NodeType::Human => simple::human(node),
            NodeType::Conditional => control::conditional(node, upstream_outputs),
            NodeType::Code => simple::code(node),
            NodeType::Container => simple::container(node),
            NodeType::Database => simple::database(node),
            NodeType::Notification => simple::notification(node),
            NodeType::Audio => simple::audio(node),
            NodeType::Subflow => simple::subflow(node),
            NodeType::Parallel => control::parallel(node, upstream_outputs, ctx, ports, config, events).await,
            NodeType::Loop => control::loop_node(node, upstream_outputs, ctx, ports, config, events).await,
        }
    })
}

pub(crate) fn require_str<'a>(config: &'a Value, field: &str, node_id: &str) -> Result<&'a str> {
    config.get(field).and_then(|v| v.as_str()).ok_or_else(|| ExecutorError::NodeExecutionError {
        node_id: node_id.to_string(),
        cause: format!("missing required field '{field}'"),
    })
}
