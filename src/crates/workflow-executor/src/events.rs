//! The Executor's domain event vocabulary (§6 execution event types, §4.3).
//! Plain domain events — `event-mapper` stamps sequence/timestamp/channel.

use serde_json::Value;
use uuid::Uuid;

use crate::error::ExecutorError;

#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    WorkflowStart { run_id: Uuid },
    NodeStart { node_id: String },
    /// Streaming LLM nodes emit one of these per token (§4.3); other node
    /// types may use it for any incremental progress they choose to report.
    NodeProgress { node_id: String, delta: String },
    NodeComplete { node_id: String, output: Value },
    NodeError { node_id: String, error: ExecutorError },
    /// A `conditional`'s untaken branch, or any node whose guarded incoming
    /// edge decided false against a completed upstream — normal routing, not
    /// a failure, and deliberately distinct from [`Self::NodeError`] (§4.3:
    /// a `conditional` simply selects an edge).
    NodeSkipped { node_id: String, reason: String },
    SideEffectRequest { node_id: String, confirm_id: Uuid, summary: String, redacted_payload: Value },
    WorkflowComplete { run_id: Uuid, summary: Option<String> },
    WorkflowError { run_id: Uuid, error: ExecutorError },
}
