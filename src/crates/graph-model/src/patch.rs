//! Patches: the only way a [`Workflow`] is mutated after construction (§4.1).
//!
//! A patch is a list of operations applied transactionally — either the
//! whole patch yields a valid workflow, or the whole patch fails with a
//! classified error listing every violation found (§4.1, §8 round-trip law
//! "applying a no-op patch produces a structurally equal document").

use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::graph::{Edge, Node, NodeId, Workflow};

/// A single add/remove/update operation against a [`Workflow`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PatchOp {
    AddNode { node: Node },
    RemoveNode { id: NodeId },
    UpdateNode { id: NodeId, partial_config: serde_json::Value },
    AddEdge { edge: Edge },
    RemoveEdge { source: NodeId, target: NodeId },
}

/// An ordered list of [`PatchOp`]s applied as a single atomic unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Patch {
    pub ops: Vec<PatchOp>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, op: PatchOp) -> Self {
        self.ops.push(op);
        self
    }

    pub fn is_noop(&self) -> bool {
        self.ops.is_empty()
    }

    /// The set of node ids this patch adds, removes, or updates — used by
    /// the Planner's isolation check (§4.2) to compare against the
    /// reachable set from `start`.
    pub fn mutated_node_ids(&self) -> Vec<NodeId> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                PatchOp::AddNode { node } => Some(node.id.clone()),
                PatchOp::RemoveNode { id } => Some(id.clone()),
                PatchOp::UpdateNode { id, .. } => Some(id.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Apply `patch` to `workflow`, returning a new, validated [`Workflow`] or a
/// single [`GraphError::PatchRejected`] listing every violation.
///
/// Applying an empty patch always succeeds and yields a workflow
/// structurally equal to the input (the no-op law in §8).
pub fn apply_patch(workflow: &Workflow, patch: &Patch) -> Result<Workflow, GraphError> {
    let mut candidate = workflow.clone();
    let mut violations = Vec::new();

    for op in &patch.ops {
        if let Err(e) = apply_op(&mut candidate, op) {
            violations.push(e);
        }
    }

    if !violations.is_empty() {
        return Err(GraphError::PatchRejected { violations });
    }

    if let Err(e) = candidate.validate() {
        return Err(GraphError::PatchRejected { violations: vec![e] });
    }

    candidate.updated_at = chrono::Utc::now();
    Ok(candidate)
}

fn apply_op(workflow: &mut Workflow, op: &PatchOp) -> Result<(), GraphError> {
    match op {
        PatchOp::AddNode { node } => {
            if workflow.node(&node.id).is_some() {
                return Err(GraphError::DuplicateNodeId(node.id.clone()));
            }
            node.validate()?;
            workflow.nodes.push(node.clone());
            Ok(())
        }
        PatchOp::RemoveNode { id } => {
            let before = workflow.nodes.len();
            workflow.nodes.retain(|n| &n.id != id);
            if workflow.nodes.len() == before {
                return Err(GraphError::UnknownNodeId(id.clone()));
            }
            workflow.edges.retain(|e| &e.source != id && &e.target != id);
            Ok(())
        }
        PatchOp::UpdateNode { id, partial_config } => {
            let node = workflow
                .nodes
                .iter_mut()
                .find(|n| &n.id == id)
                .ok_or_else(|| GraphError::UnknownNodeId(id.clone()))?;
            merge_json(&mut node.config, partial_config);
            node.validate()?;
            Ok(())
        }
        PatchOp::AddEdge { edge } => {
            if workflow.node(&edge.source).is_none() {
                return Err(GraphError::EdgeDangling(edge.source.clone()));
            }
            if workflow.node(&edge.target).is_none() {
                return Err(GraphError::EdgeDangling(edge.target.clone()));
            }
            workflow.edges.push(edge.clone());
            Ok(())
        }
        PatchOp::RemoveEdge { source, target } => {
            let before = workflow.edges.len();
            workflow
                .edges
                .retain(|e| !(&e.source == source && &e.target == target));
            if workflow.edges.len() == before {
                return Err(GraphError::EdgeDangling(format!("{source}->{target}")));
            }
            Ok(())
        }
    }
}

fn merge_json(base: &mut serde_json::Value, patch: &serde_json::Value) {
    if let (Some(base_obj), Some(patch_obj)) = (base.as_object_mut(), patch.as_object()) {
        for (key, value) in patch_obj {
            base_obj.insert(key.clone(), value.clone());
        }
    } else {
        *base = patch.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;

    fn start_end_workflow() -> Workflow {
        let mut wf = Workflow::new("test", None);
        wf.nodes.push(Node::new("start", "start", serde_json::json!({})).unwrap());
        wf.nodes.push(Node::new("end", "end", serde_json::json!({})).unwrap());
        wf.edges.push(Edge {
            source: "start".into(),
            target: "end".into(),
            guard: None,
        });
        wf
    }

    #[test]
    fn noop_patch_preserves_structure() {
        let wf = start_end_workflow();
        let patched = apply_patch(&wf, &Patch::new()).unwrap();
        assert_eq!(patched.nodes.len(), wf.nodes.len());
        assert_eq!(patched.edges.len(), wf.edges.len());
    }

    #[test]
    fn insert_llm_node_between_start_and_end() {
        // Mirrors scenario 1 from §8: add an llm node and rewrire two edges.
        let wf = start_end_workflow();
        let llm = Node::new(
            "summarize",
            "llm",
            serde_json::json!({ "model": "gpt-x", "prompt": "Summarize" }),
        )
        .unwrap();
        let patch = Patch::new()
            .push(PatchOp::RemoveEdge { source: "start".into(), target: "end".into() })
            .push(PatchOp::AddNode { node: llm })
            .push(PatchOp::AddEdge { edge: Edge { source: "start".into(), target: "summarize".into(), guard: None } })
            .push(PatchOp::AddEdge { edge: Edge { source: "summarize".into(), target: "end".into(), guard: None } });

        let patched = apply_patch(&wf, &patch).unwrap();
        assert_eq!(patched.nodes.len(), 3);
        assert_eq!(patched.edges.len(), 2);
    }

    #[test]
    fn patch_reports_every_violation() {
        let wf = start_end_workflow();
        let patch = Patch::new()
            .push(PatchOp::RemoveNode { id: "ghost-1".into() })
            .push(PatchOp::RemoveNode { id: "ghost-2".into() });
        let err = apply_patch(&wf, &patch).unwrap_err();
        match err {
            GraphError::PatchRejected { violations } => assert_eq!(violations.len(), 2),
            other => panic!("expected PatchRejected, got {other:?}"),
        }
    }

    #[test]
    fn patch_introducing_a_cycle_is_rejected() {
        let wf = start_end_workflow();
        let patch = Patch::new().push(PatchOp::AddEdge {
            edge: Edge { source: "end".into(), target: "start".into(), guard: None },
        });
        assert!(apply_patch(&wf, &patch).is_err());
    }
}
