//! `WorkflowExecutionContext` (§3.1): the transient state held for the
//! duration of one Run — workflow snapshot, accumulated outputs, step
//! counters, pending side-effect confirmations, and a cancellation token.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use graph_model::Workflow;
use serde_json::Value;
use tokio::sync::Notify;
use uuid::Uuid;

/// A cooperative cancellation signal, checked between scheduling steps and
/// before each side-effect gate (§4.3, §5). Deliberately minimal — a shared
/// flag plus a [`Notify`] for tasks that want to wait on it rather than
/// poll, since only the suspension-point contract is fixed, not a specific
/// runtime primitive (§9).
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<std::sync::atomic::AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self { cancelled: Arc::new(std::sync::atomic::AtomicBool::new(false)), notify: Arc::new(Notify::new()) }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// The transient execution context for one Run (§3.1). Owned exclusively by
/// that run's tasks (§5 "the pending-confirmations map is owned by one
/// context and accessed only by that run's tasks").
pub struct WorkflowExecutionContext {
    pub run_id: Uuid,
    /// The workflow document snapshot taken at run creation; immutable for
    /// the lifetime of the run (§5 "shared-resource policy").
    pub workflow: Arc<Workflow>,
    /// Accumulated outputs keyed by node id, visible to downstream handlers
    /// and guard evaluation.
    outputs: DashMap<String, Value>,
    step_counter: AtomicUsize,
    pub max_steps: usize,
    /// Bookkeeping of in-flight side-effect confirmations, for observability
    /// and timeout logging; resolution itself flows through the
    /// `ConfirmationPort` (§4.6), not this map.
    pending_confirmations: DashMap<Uuid, Instant>,
    pub cancellation: CancellationToken,
}

impl WorkflowExecutionContext {
    pub fn new(run_id: Uuid, workflow: Workflow, max_steps: usize) -> Self {
        Self {
            run_id,
            workflow: Arc::new(workflow),
            outputs: DashMap::new(),
            step_counter: AtomicUsize::new(0),
            max_steps,
            pending_confirmations: DashMap::new(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn record_output(&self, node_id: impl Into<String>, output: Value) {
        self.outputs.insert(node_id.into(), output);
    }

    pub fn output(&self, node_id: &str) -> Option<Value> {
        self.outputs.get(node_id).map(|v| v.clone())
    }

    /// A snapshot of every output recorded so far, keyed by node id (used by
    /// guard evaluation and node handlers that need the full upstream set).
    pub fn all_outputs(&self) -> std::collections::HashMap<String, Value> {
        self.outputs.iter().map(|entry| (entry.key().clone(), entry.value().clone())).collect()
    }

    pub fn next_step(&self) -> usize {
        self.step_counter.fetch_add(1, Ordering::SeqCst)
    }

    pub fn register_pending_confirmation(&self, confirm_id: Uuid) {
        self.pending_confirmations.insert(confirm_id, Instant::now());
    }

    pub fn clear_pending_confirmation(&self, confirm_id: &Uuid) {
        self.pending_confirmations.remove(confirm_id);
    }

    pub fn pending_confirmation_count(&self) -> usize {
        self.pending_confirmations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancellation_token_wakes_waiters() {
        let token = CancellationToken::new();
        let waiter_token = token.clone();
        let waiter = tokio::spawn(async move {
            waiter_token.cancelled().await;
        });
        tokio::task::yield_now().await;
        token.cancel();
        waiter.await.unwrap();
        assert!(token.is_cancelled());
    }

    #[test]
    fn outputs_round_trip_through_context() {
        let wf = Workflow::new("test", None);
        let ctx = WorkflowExecutionContext::new(Uuid::new_v4(), wf, 100);
        ctx.record_output("a", serde_json::json!({ "value": 1 }));
        assert_eq!(ctx.output("a"), Some(serde_json::json!({ "value": 1 })));
        assert_eq!(ctx.output("missing"), None);
    }
}
