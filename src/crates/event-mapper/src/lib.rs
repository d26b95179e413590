//! The Event Mapper (C5): translates domain events produced by the Planner
//! (`workflow-planner`) and Executor (`workflow-executor`) into the
//! `PlanningEvent`/`ExecutionEvent` SSE envelopes clients consume (§4.5, §6).
//!
//! This crate depends on neither `workflow-planner` nor `workflow-executor`
//! — it only defines the envelope shape and the mapper that stamps
//! sequence/timestamp/channel onto whatever content/metadata those crates
//! hand it, keeping C5's dependency arrow pointing the direction §2
//! describes (C5 depends on C2 and C3's event *vocabularies*, not their code).

pub mod envelope;
pub mod mapper;
pub mod redact;

pub use envelope::{Channel, Envelope, EventType};
pub use mapper::EventMapper;
