//! The Event Mapper (C5, §4.5): translates Planner/Executor domain events
//! into `PlanningEvent`/`ExecutionEvent` SSE envelopes. One [`EventMapper`]
//! is constructed per SSE stream (one chat-stream, one execute-stream) and
//! owns that stream's monotonic sequence counter — sequence allocation is
//! deliberately not exposed as a standalone public method, only through the
//! four constructors below, so every envelope this mapper ever produces is
//! correctly numbered.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::envelope::{Channel, Envelope, EventType};
use crate::redact::redact;

/// Allocates `sequence` for one logical SSE stream and stamps every
/// envelope with `channel` + wall-clock `timestamp`, redacting metadata per
/// the static deny-list (§4.5).
pub struct EventMapper {
    channel: Channel,
    next_sequence: AtomicU64,
}

impl EventMapper {
    /// `channel` is fixed for the lifetime of this mapper: one mapper per
    /// planning session, one per execution run (§8 "the Event Mapper
    /// preserves the order of events within a single logical stream").
    pub fn new(channel: Channel) -> Self {
        Self { channel, next_sequence: AtomicU64::new(1) }
    }

    fn allocate_sequence(&self) -> u64 {
        self.next_sequence.fetch_add(1, Ordering::SeqCst)
    }

    fn redact_metadata(metadata: Option<serde_json::Value>) -> Option<serde_json::Value> {
        metadata.map(|m| redact(&m))
    }

    /// The first event of a stream (`WorkflowPlanningStarted`,
    /// `workflow_start`). Always sequence 1 for a freshly constructed mapper.
    pub fn create_initial(&self, event_type: EventType, content: Option<String>, metadata: Option<serde_json::Value>) -> Envelope {
        Envelope::now(event_type, self.channel, self.allocate_sequence(), content, Self::redact_metadata(metadata), false)
    }

    /// A non-terminal intermediate event (`ReActStepCompleted`,
    /// `node_progress`, `side_effect_request`, ...).
    pub fn create_step(&self, event_type: EventType, content: Option<String>, metadata: Option<serde_json::Value>) -> Envelope {
        Envelope::now(event_type, self.channel, self.allocate_sequence(), content, Self::redact_metadata(metadata), false)
    }

    /// The stream's terminal error event. `code` (a flat taxonomy string,
    /// §7) is carried in `metadata` so clients can branch on it.
    pub fn create_error(&self, content: Option<String>, code: &str, details: Option<serde_json::Value>) -> Envelope {
        let metadata = serde_json::json!({ "code": code, "details": details });
        Envelope::now(EventType::Error, self.channel, self.allocate_sequence(), content, Self::redact_metadata(Some(metadata)), true)
    }

    /// The stream's successful terminal event (`WorkflowPlanningCompleted`,
    /// `workflow_complete`).
    pub fn create_final(&self, content: Option<String>, metadata: Option<serde_json::Value>) -> Envelope {
        Envelope::now(EventType::Final, self.channel, self.allocate_sequence(), content, Self::redact_metadata(metadata), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_increases_monotonically_within_one_stream() {
        let mapper = EventMapper::new(Channel::Execution);
        let first = mapper.create_initial(EventType::WorkflowStart, None, None);
        let second = mapper.create_step(EventType::NodeStart, None, None);
        let third = mapper.create_final(None, None);
        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert_eq!(third.sequence, 3);
    }

    #[test]
    fn error_and_final_events_are_marked_terminal() {
        let mapper = EventMapper::new(Channel::Planning);
        let err = mapper.create_error(Some("boom".into()), "UnknownNodeType", None);
        assert!(err.is_final);
        assert_eq!(err.event_type, EventType::Error);
    }

    #[test]
    fn metadata_is_redacted_before_leaving_the_mapper() {
        let mapper = EventMapper::new(Channel::Execution);
        let envelope = mapper.create_step(
            EventType::SideEffectRequest,
            None,
            Some(serde_json::json!({ "headers": { "Authorization": "Bearer xyz" } })),
        );
        let metadata = envelope.metadata.unwrap();
        assert_eq!(metadata["headers"]["Authorization"], "***redacted***");
    }

    #[test]
    fn independent_mappers_have_independent_sequences() {
        let planning = EventMapper::new(Channel::Planning);
        let execution = EventMapper::new(Channel::Execution);
        planning.create_initial(EventType::Thinking, None, None);
        let first_execution = execution.create_initial(EventType::WorkflowStart, None, None);
        assert_eq!(first_execution.sequence, 1);
    }
}
