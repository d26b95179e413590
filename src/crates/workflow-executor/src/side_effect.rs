//! The side-effect confirmation gate (§4.3): before a side-effecting node
//! dispatches, the Executor requests confirmation through the
//! `ConfirmationPort` and blocks on the decision, subject to a timeout.

use serde_json::Value;
use uuid::Uuid;

use ports::{ConfirmationDecision, ConfirmationPort};

use crate::config::ExecutorConfig;
use crate::context::WorkflowExecutionContext;
use crate::error::{ExecutorError, Result};
use crate::events::ExecutionEvent;
use event_mapper::redact::redact;

/// Gate one side-effecting node. Emits `side-effect-request`, then awaits
/// the matching `resolve` call (allow/deny) or times out.
///
/// Returns `Ok(())` on `allow`; `ConfirmationDenied`/`ConfirmationTimeout`
/// otherwise (§4.3 steps 4–5), for the caller to route through the node's
/// failure policy like any other dispatch error.
pub async fn gate(
    run_id: Uuid,
    node_id: &str,
    summary: String,
    payload: &Value,
    ctx: &WorkflowExecutionContext,
    confirmation: &dyn ConfirmationPort,
    config: &ExecutorConfig,
    events: &tokio::sync::mpsc::UnboundedSender<ExecutionEvent>,
) -> Result<()> {
    let confirm_id = Uuid::new_v4();
    ctx.register_pending_confirmation(confirm_id);

    let redacted_payload = redact(payload);
    let _ = events.send(ExecutionEvent::SideEffectRequest {
        node_id: node_id.to_string(),
        confirm_id,
        summary: summary.clone(),
        redacted_payload,
    });

    let outcome = tokio::time::timeout(config.confirmation_timeout, confirmation.request_confirmation(run_id, confirm_id, summary)).await;
    ctx.clear_pending_confirmation(&confirm_id);

    match outcome {
        Err(_) => Err(ExecutorError::ConfirmationTimeout(node_id.to_string())),
        Ok(Err(port_err)) => Err(ExecutorError::from(port_err)),
        Ok(Ok(ConfirmationDecision::Allow)) => Ok(()),
        Ok(Ok(ConfirmationDecision::Deny)) => Err(ExecutorError::ConfirmationDenied(node_id.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_model::Workflow;
    use ports::testing::InMemoryConfirmationPort;
    use std::sync::Arc;

    async fn next_confirm_id(rx: &mut tokio::sync::mpsc::UnboundedReceiver<ExecutionEvent>) -> Uuid {
        match rx.recv().await.expect("a side-effect-request event") {
            ExecutionEvent::SideEffectRequest { confirm_id, .. } => confirm_id,
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn allow_resolves_ok() {
        let confirmation = Arc::new(InMemoryConfirmationPort::new());
        let ctx = Arc::new(WorkflowExecutionContext::new(Uuid::new_v4(), Workflow::new("t", None), 10));
        let config = ExecutorConfig::default();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let (gate_port, gate_ctx, gate_config) = (confirmation.clone(), ctx.clone(), config.clone());
        let handle = tokio::spawn(async move {
            gate(gate_ctx.run_id, "n1", "do the thing".into(), &serde_json::json!({}), &gate_ctx, gate_port.as_ref(), &gate_config, &tx).await
        });

        let confirm_id = next_confirm_id(&mut rx).await;
        confirmation.resolve(confirm_id, ConfirmationDecision::Allow).await.unwrap();

        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn deny_is_reported_as_denied() {
        let confirmation = Arc::new(InMemoryConfirmationPort::new());
        let ctx = Arc::new(WorkflowExecutionContext::new(Uuid::new_v4(), Workflow::new("t", None), 10));
        let config = ExecutorConfig::default();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let (gate_port, gate_ctx, gate_config) = (confirmation.clone(), ctx.clone(), config.clone());
        let handle = tokio::spawn(async move {
            gate(gate_ctx.run_id, "n1", "do the thing".into(), &serde_json::json!({}), &gate_ctx, gate_port.as_ref(), &gate_config, &tx).await
        });

        let confirm_id = next_confirm_id(&mut rx).await;
        confirmation.resolve(confirm_id, ConfirmationDecision::Deny).await.unwrap();

        assert!(matches!(handle.await.unwrap().unwrap_err(), ExecutorError::ConfirmationDenied(_)));
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let confirmation = InMemoryConfirmationPort::new();
        let ctx = WorkflowExecutionContext::new(Uuid::new_v4(), Workflow::new("t", None), 10);
        let mut config = ExecutorConfig::default();
        config.confirmation_timeout = std::time::Duration::from_millis(20);
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();

        let result = gate(ctx.run_id, "n1", "do the thing".into(), &serde_json::json!({}), &ctx, &confirmation, &config, &tx).await;
        assert!(matches!(result.unwrap_err(), ExecutorError::ConfirmationTimeout(_)));
    }
}
