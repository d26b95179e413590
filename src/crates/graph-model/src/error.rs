//! Graph error taxonomy (§7): flat, classified, and amenable to listing every
//! violation of a failed patch rather than just the first one encountered.

use crate::node_type::NodeType;
use thiserror::Error;

/// Errors raised while constructing, validating, or patching a [`crate::graph::Workflow`].
#[derive(Debug, Error, Clone)]
pub enum GraphError {
    #[error("unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("node '{node_type}' config failed schema validation: {violations:?}")]
    SchemaViolation {
        node_type: NodeType,
        violations: Vec<String>,
    },

    #[error("graph is not acyclic, cycle: {0:?}")]
    AcyclicityViolation(Vec<String>),

    #[error("edge references non-existent node: {0}")]
    EdgeDangling(String),

    #[error("duplicate node id: {0}")]
    DuplicateNodeId(String),

    #[error("guard expression on edge {source}->{target} is invalid: {reason}")]
    InvalidGuard {
        source: String,
        target: String,
        reason: String,
    },

    #[error("patch failed with {} violation(s): {violations:?}", violations.len())]
    PatchRejected { violations: Vec<GraphError> },

    #[error("patch references unknown node id: {0}")]
    UnknownNodeId(String),

    #[error("planner attempted to mutate node(s) outside the reachable set from start: {0:?}")]
    IsolationViolation(Vec<String>),
}

pub type Result<T> = std::result::Result<T, GraphError>;
