//! The infrastructure-error slice of the error taxonomy (§7): failures
//! originating below the Port Layer's abstraction line, never raised by the
//! Planner or Executor themselves.

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum PortError {
    #[error("LLM provider unavailable: {0}")]
    LlmUnavailable(String),

    #[error("HTTP request failed: {0}")]
    HttpUnavailable(String),

    #[error("storage backend unavailable: {0}")]
    StorageUnavailable(String),

    #[error("event queue saturated, event dropped")]
    QueueSaturated,

    #[error("workflow '{0}' not found")]
    UnknownWorkflow(String),

    #[error("project '{0}' not found")]
    UnknownProject(String),

    #[error("workflow '{workflow_id}' does not belong to project '{project_id}'")]
    UnauthorizedProjectScope { workflow_id: String, project_id: String },

    #[error("run '{0}' not found")]
    UnknownRun(String),

    #[error("confirmation '{0}' not found or already resolved")]
    UnknownConfirmation(String),
}

pub type Result<T> = std::result::Result<T, PortError>;
