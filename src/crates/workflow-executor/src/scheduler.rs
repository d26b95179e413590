//! The dependency scheduler (§4.3 "Scheduling model"): builds the
//! dependency graph once per run, pulls the ready set, launches a dispatch
//! task per ready node, and repeats until the ready set is empty and no
//! tasks are in flight.
//!
//! **Readiness rule.** A node is ready once every incoming edge is
//! *decided*: its source has reached a terminal per-node status and, if the
//! edge carries a guard, the guard evaluates against the accumulated
//! outputs. A node is ready only if *every* incoming edge is decided
//! *and satisfied* (source completed, guard true or absent) — this gives
//! plain AND-join semantics for parallel/join targets, and the same rule
//! naturally prunes a `conditional`'s untaken branch: its one guarded
//! incoming edge decides false, so the target is skipped rather than run.
//! A node with no incoming edges (a `start` node) is ready immediately.

use std::collections::{HashMap, HashSet};

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use graph_model::{Guard, NodeId, Workflow};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::config::ExecutorConfig;
use crate::context::WorkflowExecutionContext;
use crate::error::{ExecutorError, Result};
use crate::events::ExecutionEvent;
use crate::handlers::{dispatch, ExecutorPorts};
use crate::policy::FailurePolicy;
use crate::side_effect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

struct NodeRuntime {
    status: NodeStatus,
    attempts: usize,
}

/// Runs every node in `workflow` to completion (or to the run's first
/// fail-fast failure, or to cancellation), emitting one [`ExecutionEvent`]
/// per dispatch lifecycle transition.
pub async fn run<'a>(
    workflow: &'a Workflow,
    ctx: &'a WorkflowExecutionContext,
    ports: &'a ExecutorPorts,
    config: &'a ExecutorConfig,
    events: &'a UnboundedSender<ExecutionEvent>,
) -> Result<()> {
    let mut runtime: HashMap<NodeId, NodeRuntime> =
        workflow.nodes.iter().map(|n| (n.id.clone(), NodeRuntime { status: NodeStatus::Pending, attempts: 0 })).collect();

    let mut in_flight: FuturesUnordered<
        std::pin::Pin<Box<dyn std::future::Future<Output = (NodeId, Result<Value>)> + Send + 'a>>,
    > = FuturesUnordered::new();
    let mut dispatched: HashSet<NodeId> = HashSet::new();

    loop {
        if ctx.cancellation.is_cancelled() {
            return Err(ExecutorError::Cancelled);
        }

        resolve_fixpoint(workflow, &mut runtime, ctx, events);

        let ready: Vec<NodeId> = workflow
            .nodes
            .iter()
            .filter(|n| runtime[&n.id].status == NodeStatus::Pending)
            .filter(|n| is_ready(workflow, n.id.as_str(), &runtime, &ctx.all_outputs()))
            .map(|n| n.id.clone())
            .filter(|id| dispatched.insert(id.clone()))
            .collect();

        for node_id in &ready {
            let step = ctx.next_step();
            if step >= ctx.max_steps {
                ctx.cancellation.cancel();
                return Err(ExecutorError::StepLimitExceeded(ctx.max_steps));
            }

            runtime.get_mut(node_id).unwrap().status = NodeStatus::Running;
            let node = workflow.node(node_id).expect("ready node exists").clone();
            let _ = events.send(ExecutionEvent::NodeStart { node_id: node.id.clone() });

            let upstream_outputs = ctx.all_outputs();
            let ctx_ref: &WorkflowExecutionContext = ctx;
            let ports = ports.clone();
            let config = config.clone();
            let events = events.clone();
            let run_id = ctx.run_id;

            let task: std::pin::Pin<Box<dyn std::future::Future<Output = (NodeId, Result<Value>)> + Send + 'a>> = Box::pin(async move {
                let outcome = dispatch_with_gate(run_id, &node, &upstream_outputs, ctx_ref, &ports, &config, &events).await;
                (node.id.clone(), outcome)
            });
            in_flight.push(task);
        }

        if in_flight.is_empty() {
            if ready.is_empty() {
                break;
            }
            continue;
        }

        let (node_id, outcome) = in_flight.select_next_some().await;
        handle_completion(workflow, &mut runtime, ctx, events, &node_id, outcome).await?;
    }

    let unresolved: Vec<&NodeId> =
        workflow.nodes.iter().map(|n| &n.id).filter(|id| runtime[*id].status == NodeStatus::Pending).collect();
    if !unresolved.is_empty() {
        tracing::warn!(?unresolved, "scheduler terminated with unresolved nodes (likely a join on a pruned branch)");
    }
    Ok(())
}

async fn dispatch_with_gate(
    run_id: Uuid,
    node: &graph_model::Node,
    upstream_outputs: &HashMap<String, Value>,
    ctx: &WorkflowExecutionContext,
    ports: &ExecutorPorts,
    config: &ExecutorConfig,
    events: &UnboundedSender<ExecutionEvent>,
) -> Result<Value> {
    if node.is_side_effecting() {
        let summary = format!("execute {} node '{}'", node.node_type, node.id);
        side_effect::gate(run_id, &node.id, summary, &node.config, ctx, ports.confirmation.as_ref(), config, events).await?;
    }
    let crate::handlers::HandlerOutcome::Value(value) = dispatch(node, upstream_outputs, ctx, ports, config, events).await?;
    Ok(value)
}

async fn handle_completion(
    workflow: &Workflow,
    runtime: &mut HashMap<NodeId, NodeRuntime>,
    ctx: &WorkflowExecutionContext,
    events: &UnboundedSender<ExecutionEvent>,
    node_id: &str,
    outcome: Result<Value>,
) -> Result<()> {
    match outcome {
        Ok(value) => {
            ctx.record_output(node_id, value.clone());
            runtime.get_mut(node_id).unwrap().status = NodeStatus::Completed;
            let _ = events.send(ExecutionEvent::NodeComplete { node_id: node_id.to_string(), output: value });
            Ok(())
        }
        Err(err) => on_failure(workflow, runtime, ctx, events, node_id, err).await,
    }
}

/// On dispatch failure, applies the node's [`FailurePolicy`]. A `Retry` that
/// still has attempts left sleeps the backoff curve's delay before resetting
/// the node to `Pending` for re-dispatch on the next scheduling pass — the
/// sleep runs inline here rather than as a separate scheduled task, so it
/// only holds up this one node's retry, not the rest of the in-flight set.
async fn on_failure(
    workflow: &Workflow,
    runtime: &mut HashMap<NodeId, NodeRuntime>,
    ctx: &WorkflowExecutionContext,
    events: &UnboundedSender<ExecutionEvent>,
    node_id: &str,
    err: ExecutorError,
) -> Result<()> {
    let node = workflow.node(node_id).expect("failing node exists");
    let policy = FailurePolicy::for_node(node);
    let attempts = {
        let entry = runtime.get_mut(node_id).unwrap();
        entry.attempts += 1;
        entry.attempts
    };

    if let FailurePolicy::Retry { backoff, .. } = &policy {
        if backoff.should_retry(attempts - 1) {
            let delay = backoff.calculate_delay(attempts - 1);
            tracing::warn!(node_id, attempt = attempts, delay_ms = delay.as_millis() as u64, error = %err, "node failed, will retry");
            tokio::time::sleep(delay).await;
            runtime.get_mut(node_id).unwrap().status = NodeStatus::Pending;
            return Ok(());
        }
    }

    runtime.get_mut(node_id).unwrap().status = NodeStatus::Failed;
    let _ = events.send(ExecutionEvent::NodeError { node_id: node_id.to_string(), error: err.clone() });
    let aborts_run = matches!(policy, FailurePolicy::FailFast)
        || matches!(&policy, FailurePolicy::Retry { on_exhaustion, .. } if matches!(**on_exhaustion, FailurePolicy::FailFast));
    if aborts_run {
        ctx.cancellation.cancel();
        return Err(err);
    }
    Ok(())
}

/// Why a `Pending` node can never become ready.
enum Unreachable {
    /// An upstream node itself failed or was skipped — a real failure
    /// propagating downstream.
    UpstreamFailed,
    /// Every upstream completed, but a guarded edge decided false — normal
    /// routing (a `conditional`'s untaken branch), not a failure.
    GuardPruned,
}

/// Repeatedly scans `Pending` nodes, marking any whose incoming edges can
/// never be satisfied (an upstream failure, or a guard that decided false)
/// as [`NodeStatus::Skipped`], until a full pass makes no further change.
fn resolve_fixpoint(
    workflow: &Workflow,
    runtime: &mut HashMap<NodeId, NodeRuntime>,
    ctx: &WorkflowExecutionContext,
    events: &UnboundedSender<ExecutionEvent>,
) {
    loop {
        let outputs = ctx.all_outputs();
        let mut changed = false;
        for node in &workflow.nodes {
            if runtime[&node.id].status != NodeStatus::Pending {
                continue;
            }
            if let Some(reason) = why_unreachable(workflow, &node.id, runtime, &outputs) {
                runtime.get_mut(&node.id).unwrap().status = NodeStatus::Skipped;
                let event = match reason {
                    Unreachable::UpstreamFailed => ExecutionEvent::NodeError {
                        node_id: node.id.clone(),
                        error: ExecutorError::UpstreamFailed(node.id.clone()),
                    },
                    Unreachable::GuardPruned => ExecutionEvent::NodeSkipped {
                        node_id: node.id.clone(),
                        reason: "guarded incoming edge decided false".to_string(),
                    },
                };
                let _ = events.send(event);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

fn incoming<'a>(workflow: &'a Workflow, node_id: &str) -> Vec<&'a graph_model::Edge> {
    workflow.edges.iter().filter(|e| e.target == node_id).collect()
}

fn edge_satisfied(edge: &graph_model::Edge, status: NodeStatus, outputs: &HashMap<String, Value>) -> Option<bool> {
    if status != NodeStatus::Completed {
        return None;
    }
    match &edge.guard {
        None => Some(true),
        Some(source) => Guard::parse(source).ok().map(|g| g.evaluate(outputs)),
    }
}

fn is_ready(workflow: &Workflow, node_id: &str, runtime: &HashMap<NodeId, NodeRuntime>, outputs: &HashMap<String, Value>) -> bool {
    let edges = incoming(workflow, node_id);
    if edges.is_empty() {
        return true;
    }
    edges.iter().all(|edge| {
        let source_status = runtime[&edge.source].status;
        edge_satisfied(edge, source_status, outputs) == Some(true)
    })
}

fn why_unreachable(
    workflow: &Workflow,
    node_id: &str,
    runtime: &HashMap<NodeId, NodeRuntime>,
    outputs: &HashMap<String, Value>,
) -> Option<Unreachable> {
    let edges = incoming(workflow, node_id);
    let mut guard_pruned = false;
    for edge in &edges {
        let source_status = runtime[&edge.source].status;
        match source_status {
            NodeStatus::Failed | NodeStatus::Skipped => return Some(Unreachable::UpstreamFailed),
            NodeStatus::Completed => {
                if edge_satisfied(edge, source_status, outputs) == Some(false) {
                    guard_pruned = true;
                }
            }
            NodeStatus::Pending | NodeStatus::Running => {}
        }
    }
    if guard_pruned {
        Some(Unreachable::GuardPruned)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_model::{Edge, Node};
    use ports::testing::{InMemoryConfirmationPort, ReplayHttpPort, StubKnowledgePort, StubLlmPort};
    use std::sync::Arc;

    fn ports_with(llm_responses: Vec<&str>) -> ExecutorPorts {
        ExecutorPorts {
            llm: Arc::new(StubLlmPort::new(llm_responses)),
            http: Arc::new(ReplayHttpPort::new(Vec::new())),
            knowledge: Arc::new(StubKnowledgePort::new(Vec::new())),
            confirmation: Arc::new(InMemoryConfirmationPort::new()),
        }
    }

    fn linear_workflow() -> Workflow {
        let mut wf = Workflow::new("t", None);
        wf.nodes.push(Node::new("start", "start", serde_json::json!({})).unwrap());
        wf.nodes.push(Node::new("greet", "llm", serde_json::json!({ "model": "x", "prompt": "hi" })).unwrap());
        wf.nodes.push(Node::new("end", "end", serde_json::json!({})).unwrap());
        wf.edges.push(Edge { source: "start".into(), target: "greet".into(), guard: None });
        wf.edges.push(Edge { source: "greet".into(), target: "end".into(), guard: None });
        wf
    }

    #[tokio::test]
    async fn linear_workflow_runs_to_completion() {
        let workflow = linear_workflow();
        let ctx = WorkflowExecutionContext::new(Uuid::new_v4(), workflow.clone(), 100);
        let ports = ports_with(vec!["hello there"]);
        let config = ExecutorConfig::default();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        run(&workflow, &ctx, &ports, &config, &tx).await.unwrap();

        assert!(ctx.output("greet").unwrap()["text"].as_str().unwrap().contains("hello"));
        let mut saw_complete_for_end = false;
        while let Ok(event) = rx.try_recv() {
            if let ExecutionEvent::NodeComplete { node_id, .. } = event {
                if node_id == "end" {
                    saw_complete_for_end = true;
                }
            }
        }
        assert!(saw_complete_for_end);
    }

    #[tokio::test]
    async fn conditional_prunes_untaken_branch() {
        let mut wf = Workflow::new("t", None);
        wf.nodes.push(Node::new("start", "start", serde_json::json!({})).unwrap());
        wf.nodes.push(Node::new("gate", "conditional", serde_json::json!({ "guard": "start.ok == true" })).unwrap());
        wf.nodes.push(Node::new("taken", "transform", serde_json::json!({ "expression": "gate.matched" })).unwrap());
        wf.nodes.push(Node::new("untaken", "transform", serde_json::json!({ "expression": "gate.matched" })).unwrap());
        wf.edges.push(Edge { source: "start".into(), target: "gate".into(), guard: None });
        wf.edges.push(Edge { source: "gate".into(), target: "taken".into(), guard: Some("gate.matched == true".into()) });
        wf.edges.push(Edge { source: "gate".into(), target: "untaken".into(), guard: Some("gate.matched == false".into()) });

        let ctx = WorkflowExecutionContext::new(Uuid::new_v4(), wf.clone(), 100);
        ctx.record_output("start", serde_json::json!({ "ok": true }));
        let ports = ports_with(vec![]);
        let config = ExecutorConfig::default();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        run(&wf, &ctx, &ports, &config, &tx).await.unwrap();

        assert!(ctx.output("taken").is_some());
        assert!(ctx.output("untaken").is_none());

        let mut saw_skip_for_untaken = false;
        let mut saw_error_for_untaken = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                ExecutionEvent::NodeSkipped { node_id, .. } if node_id == "untaken" => saw_skip_for_untaken = true,
                ExecutionEvent::NodeError { node_id, .. } if node_id == "untaken" => saw_error_for_untaken = true,
                _ => {}
            }
        }
        assert!(saw_skip_for_untaken, "untaken branch should emit NodeSkipped, not a failure event");
        assert!(!saw_error_for_untaken, "a pruned conditional branch is not an upstream failure");
    }

    #[tokio::test]
    async fn fail_fast_cancels_the_run() {
        let mut wf = Workflow::new("t", None);
        wf.nodes.push(Node::new("start", "start", serde_json::json!({})).unwrap());
        wf.nodes.push(Node::new("bad", "transform", serde_json::json!({})).unwrap());
        wf.edges.push(Edge { source: "start".into(), target: "bad".into(), guard: None });

        let ctx = WorkflowExecutionContext::new(Uuid::new_v4(), wf.clone(), 100);
        let ports = ports_with(vec![]);
        let config = ExecutorConfig::default();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();

        let result = run(&wf, &ctx, &ports, &config, &tx).await;
        assert!(result.is_err());
        assert!(ctx.cancellation.is_cancelled());
    }

    #[tokio::test]
    async fn step_bound_aborts_a_run_that_would_exceed_it() {
        let workflow = linear_workflow();
        let ctx = WorkflowExecutionContext::new(Uuid::new_v4(), workflow.clone(), 1);
        let ports = ports_with(vec!["hello there"]);
        let config = ExecutorConfig::default();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();

        let result = run(&workflow, &ctx, &ports, &config, &tx).await;
        assert!(matches!(result, Err(ExecutorError::StepLimitExceeded(1))));
        assert!(ctx.cancellation.is_cancelled());
    }

    #[tokio::test]
    async fn continue_policy_skips_dependents_without_failing_the_run() {
        let mut wf = Workflow::new("t", None);
        wf.nodes.push(Node::new("start", "start", serde_json::json!({})).unwrap());
        wf.nodes.push(Node::new("bad", "transform", serde_json::json!({ "on_failure": { "kind": "continue" } })).unwrap());
        wf.nodes.push(Node::new("downstream", "transform", serde_json::json!({ "expression": "bad.result" })).unwrap());
        wf.edges.push(Edge { source: "start".into(), target: "bad".into(), guard: None });
        wf.edges.push(Edge { source: "bad".into(), target: "downstream".into(), guard: None });

        let ctx = WorkflowExecutionContext::new(Uuid::new_v4(), wf.clone(), 100);
        let ports = ports_with(vec![]);
        let config = ExecutorConfig::default();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();

        let result = run(&wf, &ctx, &ports, &config, &tx).await;
        assert!(result.is_ok());
        assert!(!ctx.cancellation.is_cancelled());
        assert!(ctx.output("downstream").is_none());
    }

}
