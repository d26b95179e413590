//! The canonical [`Workflow`] document: nodes, edges, and the invariants
//! from §3.1 (unique node ids, edges reference existing nodes, the node set
//! is an acyclic graph, every node type is canonical).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::error::GraphError;
use crate::guard::Guard;
use crate::node_type::{schema_for, NodeType};

pub type NodeId = String;

/// A single node in a [`Workflow`]. Mutated only through a [`crate::patch::Patch`]
/// applied atomically at workflow-update time; never mutated mid-run (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub node_type: NodeType,
    /// Opaque to execution; carried only for the canvas editor (out of scope here).
    pub position: Option<Position>,
    /// Type-specific configuration record, validated against the type's input schema.
    pub config: serde_json::Value,
    pub display_name: Option<String>,
    /// Set when this node's raw type tag resolved through the alias table
    /// rather than being a canonical tag already (§4.1).
    #[serde(default)]
    pub was_deprecated: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Node {
    pub fn new(id: impl Into<String>, raw_type: &str, mut config: serde_json::Value) -> Result<Self, GraphError> {
        let (node_type, was_deprecated) = NodeType::canonicalize(raw_type)?;
        schema_for(node_type).apply_defaults(&mut config);
        Ok(Self {
            id: id.into(),
            node_type,
            position: None,
            config,
            display_name: None,
            was_deprecated,
        })
    }

    /// Validate this node's config against its type's input schema (§4.1).
    pub fn validate(&self) -> Result<(), GraphError> {
        schema_for(self.node_type).validate_config(&self.config)
    }

    /// Whether this node performs an externally visible action that must
    /// pass the Executor's side-effect gate (§4.3). `http`/`database`/`file`
    /// are side-effecting only when their config names a write-shaped
    /// operation; `code` is side-effecting unless explicitly sandboxed.
    pub fn is_side_effecting(&self) -> bool {
        match self.node_type {
            NodeType::Http => self
                .config
                .get("method")
                .and_then(|v| v.as_str())
                .map(|m| !matches!(m.to_ascii_uppercase().as_str(), "GET" | "HEAD" | "OPTIONS"))
                .unwrap_or(true),
            NodeType::Database => self
                .config
                .get("operation")
                .and_then(|v| v.as_str())
                .map(|op| !matches!(op.to_ascii_lowercase().as_str(), "select" | "read" | "query"))
                .unwrap_or(true),
            NodeType::File => self
                .config
                .get("operation")
                .and_then(|v| v.as_str())
                .map(|op| !matches!(op.to_ascii_lowercase().as_str(), "read"))
                .unwrap_or(true),
            NodeType::Notification => true,
            NodeType::Code => !self
                .config
                .get("sandboxed")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            _ => false,
        }
    }
}

/// A directed source→target edge (§3.1). `guard` is only meaningful when the
/// source node is a `conditional` node; it references only upstream node
/// outputs (enforced at validation time, see [`crate::guard`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub guard: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Draft,
    Active,
    Archived,
}

/// The canonical, versioned workflow document (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    pub project_id: Option<Uuid>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    pub fn new(name: impl Into<String>, project_id: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            project_id,
            nodes: Vec::new(),
            edges: Vec::new(),
            status: WorkflowStatus::Draft,
            created_at: now,
            updated_at: now,
        }
    }

    /// Deserialize a workflow from a plain JSON document (`{nodes, edges, ...}`),
    /// canonicalizing every node's type tag as it enters the model (§4.1).
    pub fn from_document(doc: serde_json::Value) -> Result<Self, GraphError> {
        let mut workflow: Workflow = serde_json::from_value(doc).map_err(|e| {
            GraphError::SchemaViolation {
                node_type: NodeType::Start,
                violations: vec![format!("malformed workflow document: {e}")],
            }
        })?;
        for node in &mut workflow.nodes {
            let (canonical, was_deprecated) = NodeType::canonicalize(node.node_type.tag())?;
            node.node_type = canonical;
            node.was_deprecated = was_deprecated;
        }
        Ok(workflow)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    fn node_ids(&self) -> HashSet<&str> {
        self.nodes.iter().map(|n| n.id.as_str()).collect()
    }

    /// Validate the whole document: unique node ids, every edge references
    /// an existing node, the edge set is acyclic, every node type is
    /// canonical and schema-valid (§3.1 invariants a–d, §8 invariant 1).
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(GraphError::DuplicateNodeId(node.id.clone()));
            }
            node.validate()?;
        }

        let ids = self.node_ids();
        for edge in &self.edges {
            if !ids.contains(edge.source.as_str()) {
                return Err(GraphError::EdgeDangling(edge.source.clone()));
            }
            if !ids.contains(edge.target.as_str()) {
                return Err(GraphError::EdgeDangling(edge.target.clone()));
            }
        }

        self.check_acyclic()?;
        self.check_guards()?;
        Ok(())
    }

    /// Every edge whose `guard` is set must parse under the restricted
    /// expression grammar (§3) and may only reference node ids that precede
    /// it in the graph (an upstream output, never a downstream or sibling one).
    fn check_guards(&self) -> Result<(), GraphError> {
        let ids = self.node_ids();
        for edge in &self.edges {
            let Some(source) = edge.guard.as_deref() else { continue };
            let guard = Guard::parse(source).map_err(|_| GraphError::InvalidGuard {
                source: edge.source.clone(),
                target: edge.target.clone(),
                reason: format!("malformed guard expression: {source}"),
            })?;
            for referenced in guard.referenced_node_ids() {
                if !ids.contains(referenced.as_str()) {
                    return Err(GraphError::InvalidGuard {
                        source: edge.source.clone(),
                        target: edge.target.clone(),
                        reason: format!("guard references unknown node '{referenced}'"),
                    });
                }
            }
        }
        Ok(())
    }

    /// DFS-based cycle detection (§4.1). On failure, reports one cycle as
    /// evidence: the sequence of node ids from the first revisited node back
    /// to itself.
    pub fn check_acyclic(&self) -> Result<(), GraphError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }
        let adjacency: HashMap<&str, Vec<&str>> = {
            let mut map: HashMap<&str, Vec<&str>> = HashMap::new();
            for edge in &self.edges {
                map.entry(edge.source.as_str()).or_default().push(edge.target.as_str());
            }
            map
        };

        let mut marks: HashMap<&str, Mark> = HashMap::new();
        let mut stack: Vec<&str> = Vec::new();

        fn visit<'a>(
            node: &'a str,
            adjacency: &HashMap<&'a str, Vec<&'a str>>,
            marks: &mut HashMap<&'a str, Mark>,
            stack: &mut Vec<&'a str>,
        ) -> Result<(), GraphError> {
            match marks.get(node) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => {
                    let cycle_start = stack.iter().position(|n| *n == node).unwrap_or(0);
                    let mut cycle: Vec<String> = stack[cycle_start..].iter().map(|s| s.to_string()).collect();
                    cycle.push(node.to_string());
                    return Err(GraphError::AcyclicityViolation(cycle));
                }
                None => {}
            }
            marks.insert(node, Mark::Visiting);
            stack.push(node);
            if let Some(targets) = adjacency.get(node) {
                for target in targets {
                    visit(target, adjacency, marks, stack)?;
                }
            }
            stack.pop();
            marks.insert(node, Mark::Done);
            Ok(())
        }

        for node in &self.nodes {
            if !marks.contains_key(node.id.as_str()) {
                visit(node.id.as_str(), &adjacency, &mut marks, &mut stack)?;
            }
        }
        Ok(())
    }

    /// All node ids reachable by following edges forward from every `start`
    /// node. Used by the Planner's isolation check (§4.2).
    pub fn reachable_from_start(&self) -> HashSet<NodeId> {
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &self.edges {
            adjacency.entry(edge.source.as_str()).or_default().push(edge.target.as_str());
        }
        let mut reachable: HashSet<NodeId> = HashSet::new();
        let mut queue: Vec<&str> = self
            .nodes
            .iter()
            .filter(|n| n.node_type == NodeType::Start)
            .map(|n| n.id.as_str())
            .collect();
        while let Some(current) = queue.pop() {
            if reachable.insert(current.to_string()) {
                if let Some(next) = adjacency.get(current) {
                    queue.extend(next.iter().copied());
                }
            }
        }
        reachable
    }
}
