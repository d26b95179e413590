//! The Executor's error taxonomy (§7): `NodeExecutionError` (with cause),
//! `UpstreamFailed`, `ConfirmationDenied`, `ConfirmationTimeout`,
//! `Cancelled`, plus the infrastructure slice the Executor can surface
//! in-band as `node_error` events.

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ExecutorError {
    #[error("node '{node_id}' execution failed: {cause}")]
    NodeExecutionError { node_id: String, cause: String },

    #[error("node '{0}' skipped: upstream dependency failed")]
    UpstreamFailed(String),

    #[error("node '{0}' side effect was denied by the confirming user")]
    ConfirmationDenied(String),

    #[error("node '{0}' side effect confirmation timed out")]
    ConfirmationTimeout(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("run exceeded its step bound of {0}")]
    StepLimitExceeded(usize),

    #[error("LLM provider unavailable: {0}")]
    LlmUnavailable(String),

    #[error("HTTP request failed: {0}")]
    HttpUnavailable(String),

    #[error("storage backend unavailable: {0}")]
    StorageUnavailable(String),

    #[error(transparent)]
    Graph(#[from] graph_model::GraphError),
}

impl ExecutorError {
    /// The typed `code` carried in `node_error`/`workflow_error` events (§7).
    pub fn code(&self) -> &'static str {
        match self {
            ExecutorError::NodeExecutionError { .. } => "NodeExecutionError",
            ExecutorError::UpstreamFailed(_) => "UpstreamFailed",
            ExecutorError::ConfirmationDenied(_) => "ConfirmationDenied",
            ExecutorError::ConfirmationTimeout(_) => "ConfirmationTimeout",
            ExecutorError::Cancelled => "Cancelled",
            ExecutorError::StepLimitExceeded(_) => "StepLimitExceeded",
            ExecutorError::LlmUnavailable(_) => "LLMUnavailable",
            ExecutorError::HttpUnavailable(_) => "HTTPUnavailable",
            ExecutorError::StorageUnavailable(_) => "StorageUnavailable",
            ExecutorError::Graph(_) => "SchemaViolation",
        }
    }
}

impl From<ports::PortError> for ExecutorError {
    fn from(err: ports::PortError) -> Self {
        match err {
            ports::PortError::LlmUnavailable(msg) => ExecutorError::LlmUnavailable(msg),
            ports::PortError::HttpUnavailable(msg) => ExecutorError::HttpUnavailable(msg),
            other => ExecutorError::StorageUnavailable(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExecutorError>;
