//! The Executor (C3, §4.3): given a validated [`graph_model::Workflow`] and a
//! run id, schedules nodes in dependency order with controlled parallelism,
//! gates side-effecting nodes behind a confirmation protocol, and streams
//! every dispatch transition as an [`ExecutionEvent`]. Depends on
//! `graph-model` (C1) and `ports` (C6); never imports a concrete adapter.

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod handlers;
pub mod policy;
pub mod scheduler;
pub mod side_effect;

pub use config::ExecutorConfig;
pub use context::{CancellationToken, WorkflowExecutionContext};
pub use error::{ExecutorError, Result};
pub use events::ExecutionEvent;
pub use handlers::ExecutorPorts;
pub use policy::{FailurePolicy, RetryPolicy};

use graph_model::Workflow;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// A single run's execution entry point (§3.1 `WorkflowExecutionContext`,
/// §4.3 "Responsibility"). Owns nothing across runs — a fresh [`Executor`]
/// is constructed per run, mirroring how [`workflow_planner::Planner`] is
/// constructed per planning session.
pub struct Executor {
    ports: ExecutorPorts,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(ports: ExecutorPorts, config: ExecutorConfig) -> Self {
        Self { ports, config }
    }

    /// Execute `workflow` to completion under `run_id`, emitting
    /// `workflow_start` / (node-level events) / `workflow_complete` or
    /// `workflow_error` to `events` (§6 execution event types). The workflow
    /// snapshot is immutable for the run's lifetime (§5 shared-resource
    /// policy) — the caller takes it at run creation and hands ownership in.
    pub async fn run(&self, run_id: Uuid, workflow: Workflow, max_steps: usize, events: UnboundedSender<ExecutionEvent>) -> Result<WorkflowExecutionContext> {
        let _ = events.send(ExecutionEvent::WorkflowStart { run_id });
        tracing::info!(%run_id, workflow_id = %workflow.id, "execution run started");

        let ctx = WorkflowExecutionContext::new(run_id, workflow, max_steps);

        match scheduler::run(&ctx.workflow.clone(), &ctx, &self.ports, &self.config, &events).await {
            Ok(()) => {
                tracing::info!(%run_id, "execution run completed");
                let _ = events.send(ExecutionEvent::WorkflowComplete { run_id, summary: None });
                Ok(ctx)
            }
            Err(err) => {
                tracing::warn!(%run_id, error = %err, "execution run failed");
                let _ = events.send(ExecutionEvent::WorkflowError { run_id, error: err.clone() });
                Err(err)
            }
        }
    }

    pub fn ports(&self) -> &ExecutorPorts {
        &self.ports
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
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

    fn empty_workflow() -> Workflow {
        let mut wf = Workflow::new("empty", None);
        wf.nodes.push(Node::new("start", "start", serde_json::json!({})).unwrap());
        wf.nodes.push(Node::new("end", "end", serde_json::json!({})).unwrap());
        wf.edges.push(Edge { source: "start".into(), target: "end".into(), guard: None });
        wf
    }

    #[tokio::test]
    async fn empty_workflow_runs_to_a_completed_run() {
        let executor = Executor::new(ports_with(vec![]), ExecutorConfig::default());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let ctx = executor.run(Uuid::new_v4(), empty_workflow(), 100, tx).await.unwrap();
        assert!(ctx.output("end").is_some());

        let mut saw_start = false;
        let mut saw_complete = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                ExecutionEvent::WorkflowStart { .. } => saw_start = true,
                ExecutionEvent::WorkflowComplete { .. } => saw_complete = true,
                _ => {}
            }
        }
        assert!(saw_start && saw_complete);
    }

    #[tokio::test]
    async fn failing_node_surfaces_a_workflow_error_event() {
        let mut wf = Workflow::new("t", None);
        wf.nodes.push(Node::new("start", "start", serde_json::json!({})).unwrap());
        wf.nodes.push(Node::new("bad", "transform", serde_json::json!({})).unwrap());
        wf.edges.push(Edge { source: "start".into(), target: "bad".into(), guard: None });

        let executor = Executor::new(ports_with(vec![]), ExecutorConfig::default());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let run_id = Uuid::new_v4();
        let result = executor.run(run_id, wf, 100, tx).await;
        assert!(result.is_err());

        let mut saw_workflow_error = false;
        while let Ok(event) = rx.try_recv() {
            if let ExecutionEvent::WorkflowError { run_id: seen, .. } = event {
                assert_eq!(seen, run_id);
                saw_workflow_error = true;
            }
        }
        assert!(saw_workflow_error);
    }
}
