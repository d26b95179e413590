//! The persistence ports (§4.6, §6): Workflow/Run/RunEvent repositories.
//! Concrete implementations live in `run-log` (sqlx/SQLite, grounded in
//! `orchestrator::db::repositories::workflow_repo`); the Planner and
//! Executor depend only on the traits here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use graph_model::Workflow;

use crate::error::Result;

#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn create(&self, workflow: Workflow) -> Result<Workflow>;

    /// Must never return a record whose `project_id` does not match
    /// `caller_project_id` (§4.6 invariant) — return `UnknownWorkflow` rather
    /// than leak cross-project existence.
    async fn find_by_id(&self, id: Uuid, caller_project_id: Option<Uuid>) -> Result<Workflow>;

    async fn update(&self, workflow: Workflow) -> Result<Workflow>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Created,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub project_id: Option<Uuid>,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
}

impl Run {
    pub fn new(workflow_id: Uuid, project_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            project_id,
            status: RunStatus::Created,
            started_at: Utc::now(),
            finished_at: None,
            summary: None,
        }
    }
}

#[async_trait]
pub trait RunRepository: Send + Sync {
    async fn create(&self, run: Run) -> Result<Run>;

    async fn find_by_id(&self, id: Uuid) -> Result<Run>;

    /// Transitions `id`'s status from `expected` to `new` only if the stored
    /// status still equals `expected`. Returns whether the swap occurred
    /// (§4.4 CAS status).
    async fn update_status_if_current(&self, id: Uuid, expected: RunStatus, new: RunStatus) -> Result<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventChannel {
    Planning,
    Execution,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEventRecord {
    pub run_id: Uuid,
    pub sequence: i64,
    pub timestamp: DateTime<Utc>,
    pub channel: EventChannel,
    pub kind: String,
    pub payload: serde_json::Value,
}

#[async_trait]
pub trait RunEventRepository: Send + Sync {
    /// Serialized per run: the implementation is responsible for assigning
    /// a strictly increasing `sequence` under a per-run lock or DB
    /// constraint, never trusting a caller-supplied sequence (§4.4).
    async fn append(&self, run_id: Uuid, channel: EventChannel, kind: &str, payload: serde_json::Value) -> Result<RunEventRecord>;

    async fn list_after(&self, run_id: Uuid, sequence: i64) -> Result<Vec<RunEventRecord>>;
}
