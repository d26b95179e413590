//! The Planner's error taxonomy (§4.2, §7): `ParseFailure`,
//! `SchemaViolation`, `UnknownNodeType`, `AcyclicityViolation`,
//! `IsolationViolation`, `StepLimitExceeded`, `LLMUnavailable`.
//! `PlannerRejected` rounds out §7's flat planning-error slice for a
//! human-named rejection the LLM itself signals (e.g. the user asked for
//! something the catalog cannot express).

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum PlannerError {
    #[error("failed to parse action from LLM output: {0}")]
    ParseFailure(String),

    #[error(transparent)]
    Graph(#[from] graph_model::GraphError),

    #[error("planner exceeded the step limit ({0} iterations)")]
    StepLimitExceeded(usize),

    #[error("planner rejected the request: {0}")]
    PlannerRejected(String),

    #[error("LLM provider unavailable: {0}")]
    LlmUnavailable(String),

    #[error("knowledge retrieval unavailable: {0}")]
    KnowledgeUnavailable(String),
}

impl PlannerError {
    /// The typed `code` carried in the terminal SSE `error`/`final` event
    /// (§6, §7 "errors arrive as typed SSE events with an enum code").
    pub fn code(&self) -> &'static str {
        match self {
            PlannerError::ParseFailure(_) => "ParseFailure",
            PlannerError::Graph(graph_model::GraphError::UnknownNodeType(_)) => "UnknownNodeType",
            PlannerError::Graph(graph_model::GraphError::AcyclicityViolation(_)) => "AcyclicityViolation",
            PlannerError::Graph(graph_model::GraphError::IsolationViolation(_)) => "IsolationViolation",
            PlannerError::Graph(_) => "SchemaViolation",
            PlannerError::StepLimitExceeded(_) => "StepLimitExceeded",
            PlannerError::PlannerRejected(_) => "PlannerRejected",
            PlannerError::LlmUnavailable(_) => "LLMUnavailable",
            PlannerError::KnowledgeUnavailable(_) => "LLMUnavailable",
        }
    }
}

impl From<ports::PortError> for PlannerError {
    fn from(err: ports::PortError) -> Self {
        match err {
            ports::PortError::LlmUnavailable(msg) => PlannerError::LlmUnavailable(msg),
            other => PlannerError::KnowledgeUnavailable(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, PlannerError>;
