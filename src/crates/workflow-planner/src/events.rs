//! The Planner's domain event vocabulary (§4.2): emitted in order, exactly
//! one `WorkflowPlanningStarted`, zero or more `ReActStepCompleted`, zero or
//! more `WorkflowPatchGenerated`, and exactly one terminal
//! `WorkflowPlanningCompleted` or `WorkflowPlanningFailed` (§8 invariant 5).
//!
//! These are plain domain events, not SSE envelopes — `event-mapper`
//! consumes them and stamps sequence/timestamp/channel.

use graph_model::{Patch, Workflow};
use serde::{Deserialize, Serialize};

use crate::error::PlannerError;

/// One Reason–Act–Observation step of the ReAct loop (§4.2 step 1-4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReActStep {
    pub thought: String,
    pub action: String,
    pub observation: String,
}

/// A human-readable summary of what a patch changed, carried alongside the
/// raw [`Patch`] so clients don't have to diff documents themselves (§4.2
/// step 5, §8 scenario 1 "exactly one patch whose diff shows...").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchDiffSummary {
    pub nodes_added: Vec<String>,
    pub nodes_removed: Vec<String>,
    pub nodes_updated: Vec<String>,
    pub edges_added: usize,
    pub edges_removed: usize,
}

impl PatchDiffSummary {
    pub fn from_patch(patch: &Patch) -> Self {
        use graph_model::PatchOp;
        let mut summary = PatchDiffSummary {
            nodes_added: Vec::new(),
            nodes_removed: Vec::new(),
            nodes_updated: Vec::new(),
            edges_added: 0,
            edges_removed: 0,
        };
        for op in &patch.ops {
            match op {
                PatchOp::AddNode { node } => summary.nodes_added.push(node.id.clone()),
                PatchOp::RemoveNode { id } => summary.nodes_removed.push(id.clone()),
                PatchOp::UpdateNode { id, .. } => summary.nodes_updated.push(id.clone()),
                PatchOp::AddEdge { .. } => summary.edges_added += 1,
                PatchOp::RemoveEdge { .. } => summary.edges_removed += 1,
            }
        }
        summary
    }
}

/// Domain events a planning session emits, in the fixed order §4.2 and §8
/// invariant 5 prescribe.
#[derive(Debug, Clone)]
pub enum PlanningEvent {
    WorkflowPlanningStarted { workflow_id: uuid::Uuid },
    ReActStepCompleted(ReActStep),
    WorkflowPatchGenerated { patch: Patch, diff: PatchDiffSummary },
    WorkflowPlanningCompleted { workflow: Box<Workflow> },
    WorkflowPlanningFailed { reason: PlanningFailureReason, error: PlannerError },
}

/// Structured reason codes for a failed planning session, mapping 1:1 onto
/// the Planner failure taxonomy and distinct from [`PlannerError::code`] in
/// that this is the *session-level* outcome while `PlannerError` may
/// describe one retry attempt within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanningFailureReason {
    ParseFailure,
    SchemaViolation,
    UnknownNodeType,
    AcyclicityViolation,
    IsolationViolation,
    StepLimit,
    LlmUnavailable,
    PlannerRejected,
}

impl PlanningFailureReason {
    pub fn from_error(error: &PlannerError) -> Self {
        match error {
            PlannerError::ParseFailure(_) => PlanningFailureReason::ParseFailure,
            PlannerError::Graph(graph_model::GraphError::UnknownNodeType(_)) => PlanningFailureReason::UnknownNodeType,
            PlannerError::Graph(graph_model::GraphError::AcyclicityViolation(_)) => PlanningFailureReason::AcyclicityViolation,
            PlannerError::Graph(graph_model::GraphError::IsolationViolation(_)) => PlanningFailureReason::IsolationViolation,
            PlannerError::Graph(_) => PlanningFailureReason::SchemaViolation,
            PlannerError::StepLimitExceeded(_) => PlanningFailureReason::StepLimit,
            PlannerError::LlmUnavailable(_) => PlanningFailureReason::LlmUnavailable,
            PlannerError::KnowledgeUnavailable(_) => PlanningFailureReason::LlmUnavailable,
            PlannerError::PlannerRejected(_) => PlanningFailureReason::PlannerRejected,
        }
    }
}
