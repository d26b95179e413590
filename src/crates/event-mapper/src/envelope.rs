//! The SSE envelope shape (§6): `{type, channel, sequence, timestamp,
//! content?, metadata?, is_final?}`. One `data:` line per event; the stream
//! terminates with a `final`/`error`-typed event, no sentinel `[DONE]`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which SSE stream an envelope belongs to (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Planning,
    Execution,
}

/// Every event type the Planner or Executor can emit over SSE (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // Planning channel.
    Thinking,
    ToolCall,
    Patch,
    // Execution channel.
    WorkflowStart,
    NodeStart,
    NodeProgress,
    NodeComplete,
    NodeError,
    NodeSkipped,
    SideEffectRequest,
    WorkflowComplete,
    WorkflowError,
    // Shared terminal types.
    Final,
    Error,
}

impl EventType {
    /// The channel a given event type is native to. `Final`/`Error` are
    /// shared terminal types whose channel is set explicitly by the caller
    /// rather than inferred here.
    pub fn native_channel(&self) -> Option<Channel> {
        match self {
            EventType::Thinking | EventType::ToolCall | EventType::Patch => Some(Channel::Planning),
            EventType::WorkflowStart
            | EventType::NodeStart
            | EventType::NodeProgress
            | EventType::NodeComplete
            | EventType::NodeError
            | EventType::NodeSkipped
            | EventType::SideEffectRequest
            | EventType::WorkflowComplete
            | EventType::WorkflowError => Some(Channel::Execution),
            EventType::Final | EventType::Error => None,
        }
    }
}

/// The wire-level SSE envelope. `sequence` is allocated by the
/// [`crate::mapper::EventMapper`] that produced this envelope, independent
/// of the Event Log's own per-run storage sequence (§4.4) — this is a
/// per-SSE-stream counter, not a persistence guarantee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub channel: Channel,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_final: bool,
}

impl Envelope {
    pub fn now(
        event_type: EventType,
        channel: Channel,
        sequence: u64,
        content: Option<String>,
        metadata: Option<serde_json::Value>,
        is_final: bool,
    ) -> Self {
        Self {
            event_type,
            channel,
            sequence,
            timestamp: Utc::now(),
            content,
            metadata,
            is_final,
        }
    }
}
