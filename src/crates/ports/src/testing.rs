//! Deterministic stub implementations of every port, behind the `testing`
//! feature. These back the Planner's and Executor's own test suites without
//! either crate linking a real LLM/HTTP client or a database (§4.6).

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use uuid::Uuid;

use graph_model::Workflow;

use crate::confirmation::{ConfirmationDecision, ConfirmationPort};
use crate::error::{PortError, Result};
use crate::http::{HttpPort, HttpRequest, HttpResponse};
use crate::knowledge::{KnowledgeChunk, KnowledgePort};
use crate::llm::{ChatCompletion, ChatMessage, ChatToken, LlmPort};
use crate::repository::{EventChannel, Run, RunEventRecord, RunRepository, RunStatus, WorkflowRepository};

/// Replies with a fixed, caller-supplied sequence of completions, one per
/// `invoke` call; panics (via error) if exhausted, making test expectations
/// explicit rather than silently cycling.
pub struct StubLlmPort {
    responses: Mutex<VecDeque<String>>,
}

impl StubLlmPort {
    pub fn new(responses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
        }
    }

    fn next_response(&self) -> Result<String> {
        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| PortError::LlmUnavailable("StubLlmPort exhausted".into()))
    }
}

#[async_trait]
impl LlmPort for StubLlmPort {
    async fn invoke(&self, _messages: &[ChatMessage]) -> Result<ChatCompletion> {
        Ok(ChatCompletion { text: self.next_response()? })
    }

    async fn invoke_streaming(&self, _messages: &[ChatMessage]) -> Result<BoxStream<'static, ChatToken>> {
        let text = self.next_response()?;
        let tokens: Vec<ChatToken> = text
            .split_whitespace()
            .map(|w| ChatToken { delta: format!("{w} "), is_final: false })
            .chain(std::iter::once(ChatToken { delta: String::new(), is_final: true }))
            .collect();
        Ok(stream::iter(tokens).boxed())
    }
}

/// Returns a fixed set of chunks regardless of query, recording the last
/// query seen for assertions.
pub struct StubKnowledgePort {
    chunks: Vec<KnowledgeChunk>,
    last_query: Mutex<Option<String>>,
}

impl StubKnowledgePort {
    pub fn new(chunks: Vec<KnowledgeChunk>) -> Self {
        Self { chunks, last_query: Mutex::new(None) }
    }

    pub fn last_query(&self) -> Option<String> {
        self.last_query.lock().clone()
    }
}

#[async_trait]
impl KnowledgePort for StubKnowledgePort {
    async fn retrieve(&self, query: &str, _scope: Option<&str>, top_k: usize) -> Result<Vec<KnowledgeChunk>> {
        *self.last_query.lock() = Some(query.to_string());
        Ok(self.chunks.iter().take(top_k).cloned().collect())
    }
}

/// Replays a fixed response for every request matching a recorded URL,
/// grounded in the "recorded replay" implementation named for the HTTP Port
/// in §4.6.
pub struct ReplayHttpPort {
    recorded: Vec<(String, HttpResponse)>,
}

impl ReplayHttpPort {
    pub fn new(recorded: Vec<(String, HttpResponse)>) -> Self {
        Self { recorded }
    }
}

#[async_trait]
impl HttpPort for ReplayHttpPort {
    async fn request(&self, req: HttpRequest, _timeout: Duration) -> Result<HttpResponse> {
        self.recorded
            .iter()
            .find(|(url, _)| url == &req.url)
            .map(|(_, resp)| resp.clone())
            .ok_or_else(|| PortError::HttpUnavailable(format!("no recorded response for {}", req.url)))
    }
}

/// An in-process `WorkflowRepository` over a `Mutex<Vec<Workflow>>`, enforcing
/// the project-scope invariant the same way a real adapter must.
#[derive(Default)]
pub struct InMemoryWorkflowRepository {
    workflows: Mutex<Vec<Workflow>>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn create(&self, workflow: Workflow) -> Result<Workflow> {
        self.workflows.lock().push(workflow.clone());
        Ok(workflow)
    }

    async fn find_by_id(&self, id: Uuid, caller_project_id: Option<Uuid>) -> Result<Workflow> {
        self.workflows
            .lock()
            .iter()
            .find(|w| w.id == id && w.project_id == caller_project_id)
            .cloned()
            .ok_or_else(|| PortError::UnknownWorkflow(id.to_string()))
    }

    async fn update(&self, workflow: Workflow) -> Result<Workflow> {
        let mut guard = self.workflows.lock();
        let slot = guard
            .iter_mut()
            .find(|w| w.id == workflow.id)
            .ok_or_else(|| PortError::UnknownWorkflow(workflow.id.to_string()))?;
        *slot = workflow.clone();
        Ok(workflow)
    }
}

#[derive(Default)]
pub struct InMemoryRunRepository {
    runs: Mutex<Vec<Run>>,
}

impl InMemoryRunRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunRepository for InMemoryRunRepository {
    async fn create(&self, run: Run) -> Result<Run> {
        self.runs.lock().push(run.clone());
        Ok(run)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Run> {
        self.runs
            .lock()
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| PortError::UnknownRun(id.to_string()))
    }

    async fn update_status_if_current(&self, id: Uuid, expected: RunStatus, new: RunStatus) -> Result<bool> {
        let mut guard = self.runs.lock();
        let run = guard
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| PortError::UnknownRun(id.to_string()))?;
        if run.status != expected {
            return Ok(false);
        }
        run.status = new;
        if new.is_terminal() {
            run.finished_at = Some(chrono::Utc::now());
        }
        Ok(true)
    }
}

/// A confirmation port backed by a channel map, resolved synchronously by
/// test code calling [`InMemoryConfirmationPort::resolve`] from another task.
#[derive(Default)]
pub struct InMemoryConfirmationPort {
    pending: Mutex<std::collections::HashMap<Uuid, tokio::sync::oneshot::Sender<ConfirmationDecision>>>,
}

impl InMemoryConfirmationPort {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfirmationPort for InMemoryConfirmationPort {
    async fn request_confirmation(&self, _run_id: Uuid, confirm_id: Uuid, _summary: String) -> Result<ConfirmationDecision> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.pending.lock().insert(confirm_id, tx);
        rx.await.map_err(|_| PortError::UnknownConfirmation(confirm_id.to_string()))
    }

    async fn resolve(&self, confirm_id: Uuid, decision: ConfirmationDecision) -> Result<()> {
        let sender = self
            .pending
            .lock()
            .remove(&confirm_id)
            .ok_or_else(|| PortError::UnknownConfirmation(confirm_id.to_string()))?;
        sender.send(decision).map_err(|_| PortError::UnknownConfirmation(confirm_id.to_string()))
    }
}

/// An event-log recorder double. Holds appended events in memory with the
/// same serialized-sequence-per-run contract a real `run-log` adapter must
/// provide, so executor/planner tests can assert on ordering without sqlite.
#[derive(Default)]
pub struct InMemoryRunEventRepository {
    events: Mutex<std::collections::HashMap<Uuid, Vec<RunEventRecord>>>,
}

impl InMemoryRunEventRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl crate::repository::RunEventRepository for InMemoryRunEventRepository {
    async fn append(&self, run_id: Uuid, channel: EventChannel, kind: &str, payload: serde_json::Value) -> Result<RunEventRecord> {
        let mut guard = self.events.lock();
        let entries = guard.entry(run_id).or_default();
        let sequence = entries.len() as i64 + 1;
        let record = RunEventRecord {
            run_id,
            sequence,
            timestamp: chrono::Utc::now(),
            channel,
            kind: kind.to_string(),
            payload,
        };
        entries.push(record.clone());
        Ok(record)
    }

    async fn list_after(&self, run_id: Uuid, sequence: i64) -> Result<Vec<RunEventRecord>> {
        Ok(self
            .events
            .lock()
            .get(&run_id)
            .map(|events| events.iter().filter(|e| e.sequence > sequence).cloned().collect())
            .unwrap_or_default())
    }
}

/// Convenience bundle of every stub port, for tests that just need
/// "some working ports" without caring which.
pub fn default_test_ports() -> (
    Arc<dyn LlmPort>,
    Arc<dyn KnowledgePort>,
    Arc<dyn HttpPort>,
    Arc<dyn WorkflowRepository>,
    Arc<dyn RunRepository>,
    Arc<dyn crate::repository::RunEventRepository>,
    Arc<dyn ConfirmationPort>,
) {
    (
        Arc::new(StubLlmPort::new(Vec::<String>::new())),
        Arc::new(StubKnowledgePort::new(Vec::new())),
        Arc::new(ReplayHttpPort::new(Vec::new())),
        Arc::new(InMemoryWorkflowRepository::new()),
        Arc::new(InMemoryRunRepository::new()),
        Arc::new(InMemoryRunEventRepository::new()),
        Arc::new(InMemoryConfirmationPort::new()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_llm_port_replays_in_order() {
        let llm = StubLlmPort::new(["first", "second"]);
        assert_eq!(llm.invoke(&[]).await.unwrap().text, "first");
        assert_eq!(llm.invoke(&[]).await.unwrap().text, "second");
        assert!(llm.invoke(&[]).await.is_err());
    }

    #[tokio::test]
    async fn in_memory_run_repository_enforces_cas() {
        let repo = InMemoryRunRepository::new();
        let run = Run::new(Uuid::new_v4(), None);
        let id = run.id;
        repo.create(run).await.unwrap();

        let swapped = repo.update_status_if_current(id, RunStatus::Created, RunStatus::Running).await.unwrap();
        assert!(swapped);
        let stale = repo.update_status_if_current(id, RunStatus::Created, RunStatus::Failed).await.unwrap();
        assert!(!stale);
    }

    #[tokio::test]
    async fn in_memory_workflow_repository_hides_cross_project_records() {
        let repo = InMemoryWorkflowRepository::new();
        let project_a = Uuid::new_v4();
        let wf = Workflow::new("wf", Some(project_a));
        let id = wf.id;
        repo.create(wf).await.unwrap();

        assert!(repo.find_by_id(id, Some(Uuid::new_v4())).await.is_err());
        assert!(repo.find_by_id(id, Some(project_a)).await.is_ok());
    }

    #[tokio::test]
    async fn confirmation_port_delivers_decision() {
        let port = Arc::new(InMemoryConfirmationPort::new());
        let confirm_id = Uuid::new_v4();
        let waiter = {
            let port = port.clone();
            tokio::spawn(async move { port.request_confirmation(Uuid::new_v4(), confirm_id, "do it".into()).await })
        };
        tokio::task::yield_now().await;
        port.resolve(confirm_id, ConfirmationDecision::Allow).await.unwrap();
        assert_eq!(waiter.await.unwrap().unwrap(), ConfirmationDecision::Allow);
    }
}
