//! The Planner's isolation guarantee (§4.2): a patch must not mutate nodes
//! outside the connected component reachable from `start` unless the user's
//! message explicitly names the isolated node (by id or display name).

use graph_model::{GraphError, Patch, Workflow};

/// Check a candidate patch against the isolation guarantee. `user_message`
/// is scanned case-insensitively for each unreachable mutated node's id or
/// display name; any unreachable node not explicitly named is a violation.
pub fn check_isolation(original: &Workflow, patch: &Patch, user_message: &str) -> Result<(), GraphError> {
    let reachable = original.reachable_from_start();
    let lower_message = user_message.to_ascii_lowercase();

    let mut violations = Vec::new();
    for node_id in patch.mutated_node_ids() {
        if reachable.contains(&node_id) {
            continue;
        }
        let explicitly_named = lower_message.contains(&node_id.to_ascii_lowercase())
            || original
                .node(&node_id)
                .and_then(|n| n.display_name.as_ref())
                .map(|name| lower_message.contains(&name.to_ascii_lowercase()))
                .unwrap_or(false);
        if !explicitly_named {
            violations.push(node_id);
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(GraphError::IsolationViolation(violations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_model::{Edge, Node, PatchOp};

    fn workflow_with_island() -> Workflow {
        let mut wf = Workflow::new("test", None);
        wf.nodes.push(Node::new("start", "start", serde_json::json!({})).unwrap());
        wf.nodes.push(Node::new("end", "end", serde_json::json!({})).unwrap());
        wf.edges.push(Edge { source: "start".into(), target: "end".into(), guard: None });
        wf.nodes.push(Node::new("island", "transform", serde_json::json!({})).unwrap());
        wf
    }

    #[test]
    fn mutating_unreachable_node_without_mention_is_rejected() {
        let wf = workflow_with_island();
        let patch = Patch::new().push(PatchOp::UpdateNode { id: "island".into(), partial_config: serde_json::json!({}) });
        let err = check_isolation(&wf, &patch, "add an llm node").unwrap_err();
        assert!(matches!(err, GraphError::IsolationViolation(ids) if ids == vec!["island".to_string()]));
    }

    #[test]
    fn mutating_unreachable_node_explicitly_named_is_allowed() {
        let wf = workflow_with_island();
        let patch = Patch::new().push(PatchOp::UpdateNode { id: "island".into(), partial_config: serde_json::json!({}) });
        assert!(check_isolation(&wf, &patch, "please fix the island node").is_ok());
    }

    #[test]
    fn mutating_reachable_node_never_needs_a_mention() {
        let wf = workflow_with_island();
        let patch = Patch::new().push(PatchOp::UpdateNode { id: "end".into(), partial_config: serde_json::json!({}) });
        assert!(check_isolation(&wf, &patch, "anything").is_ok());
    }
}
