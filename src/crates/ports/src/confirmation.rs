//! Confirmation Port (§4.6): bridges a side-effecting node's pending future
//! to whatever external surface resolves it (an HTTP `confirm` endpoint in
//! the full system, a deterministic stub in tests).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationDecision {
    Allow,
    Deny,
}

#[async_trait]
pub trait ConfirmationPort: Send + Sync {
    /// Registers a pending confirmation and returns once someone calls
    /// [`ConfirmationPort::resolve`] with the matching `confirm_id`, or the
    /// Executor's own 300s timeout elapses first (the timeout itself is the
    /// Executor's concern, not this port's).
    async fn request_confirmation(&self, run_id: Uuid, confirm_id: Uuid, summary: String) -> Result<ConfirmationDecision>;

    /// Resolves a previously requested confirmation. Returns `Ok(())` even
    /// if no task is currently awaiting it (at-most-once delivery); resolving
    /// an unknown or already-resolved id is a [`crate::error::PortError::UnknownConfirmation`].
    async fn resolve(&self, confirm_id: Uuid, decision: ConfirmationDecision) -> Result<()>;
}
