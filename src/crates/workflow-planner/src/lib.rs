//! The Planner (C2, §4.2): a ReAct-style loop that converts a user message
//! and the current workflow snapshot into a validated patch, streaming
//! `thinking`/`patch`/terminal events along the way. Depends on
//! `graph-model` (C1, dry-run patch validation) and `ports` (C6, LLM +
//! knowledge); never imports a concrete LLM/knowledge adapter.

pub mod action;
pub mod config;
pub mod error;
pub mod events;
pub mod isolation;
pub mod planner;

pub use action::{extract_action, Action};
pub use config::PlannerConfig;
pub use error::{PlannerError, Result};
pub use events::{PatchDiffSummary, PlanningEvent, PlanningFailureReason, ReActStep};
pub use planner::Planner;
