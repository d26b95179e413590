//! The Planner's ReAct loop (§4.2): user message + workflow snapshot →
//! LLM → structured action → tool dispatch or dry-run patch validation →
//! repeat, bounded by a step limit and a per-turn retry budget, streaming
//! progress the whole way.

use std::sync::Arc;

use graph_model::{apply_patch, NodeType, Workflow};
use ports::{ChatMessage, KnowledgePort, LlmPort};
use tokio::sync::mpsc::UnboundedSender;

use crate::action::{extract_action, Action};
use crate::config::PlannerConfig;
use crate::error::PlannerError;
use crate::events::{PatchDiffSummary, PlanningEvent, PlanningFailureReason, ReActStep};
use crate::isolation::check_isolation;

/// A planning session bound to one workflow + user message (§4.2).
pub struct Planner {
    llm: Arc<dyn LlmPort>,
    knowledge: Arc<dyn KnowledgePort>,
    config: PlannerConfig,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmPort>, knowledge: Arc<dyn KnowledgePort>, config: PlannerConfig) -> Self {
        Self { llm, knowledge, config }
    }

    /// Run the ReAct loop to completion, emitting every [`PlanningEvent`] to
    /// `events` as it happens (§4.2 event schema). Returns the finalized
    /// workflow on success, or the terminal error on failure — in both
    /// cases the corresponding terminal event has already been sent.
    pub async fn plan(&self, original: Workflow, user_message: String, events: UnboundedSender<PlanningEvent>) -> Result<Workflow, PlannerError> {
        let _ = events.send(PlanningEvent::WorkflowPlanningStarted { workflow_id: original.id });
        tracing::info!(workflow_id = %original.id, "planning session started");

        let mut conversation = vec![
            ChatMessage::system(system_prompt(&original)),
            ChatMessage::user(user_message.clone()),
        ];
        let mut candidate = original.clone();

        for step in 0..self.config.max_steps {
            match self.run_turn(&mut conversation, &candidate, &user_message, &events).await {
                Ok(TurnOutcome::Continue(updated)) => {
                    candidate = updated;
                }
                Ok(TurnOutcome::Finalize) => {
                    tracing::info!(workflow_id = %candidate.id, steps = step + 1, "planning session completed");
                    let _ = events.send(PlanningEvent::WorkflowPlanningCompleted { workflow: Box::new(candidate.clone()) });
                    return Ok(candidate);
                }
                Err(error) => {
                    return self.fail(&events, error);
                }
            }
        }

        self.fail(&events, PlannerError::StepLimitExceeded(self.config.max_steps))
    }

    fn fail(&self, events: &UnboundedSender<PlanningEvent>, error: PlannerError) -> Result<Workflow, PlannerError> {
        tracing::warn!(error = %error, "planning session failed");
        let reason = PlanningFailureReason::from_error(&error);
        let _ = events.send(PlanningEvent::WorkflowPlanningFailed { reason, error: error.clone() });
        Err(error)
    }

    /// One outer ReAct iteration: invoke the LLM (streaming `thinking`),
    /// extract an action with up to `max_retries_per_turn` parse/validation
    /// retries, then dispatch it (§4.2 steps 1-5).
    async fn run_turn(
        &self,
        conversation: &mut Vec<ChatMessage>,
        candidate: &Workflow,
        user_message: &str,
        events: &UnboundedSender<PlanningEvent>,
    ) -> Result<TurnOutcome, PlannerError> {
        let mut last_error: Option<PlannerError> = None;

        for attempt in 0..=self.config.max_retries_per_turn {
            if let Some(err) = &last_error {
                conversation.push(ChatMessage::user(retry_prompt(&last_raw_output(conversation), err)));
            }

            let raw = self.invoke_streaming(conversation, events).await?;
            conversation.push(ChatMessage::assistant(raw.clone()));

            match extract_action(&raw) {
                Ok(action) => {
                    return self.dispatch_action(action, conversation, candidate, user_message, events).await;
                }
                Err(parse_error) => {
                    tracing::warn!(attempt, error = %parse_error, "planner action parse failure, retrying");
                    last_error = Some(parse_error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| PlannerError::ParseFailure("exhausted retries with no recorded error".into())))
    }

    async fn invoke_streaming(&self, conversation: &[ChatMessage], events: &UnboundedSender<PlanningEvent>) -> Result<String, PlannerError> {
        use futures::StreamExt;
        let mut stream = self.llm.invoke_streaming(conversation).await?;
        let mut accumulated = String::new();
        while let Some(token) = stream.next().await {
            if !token.delta.is_empty() {
                accumulated.push_str(&token.delta);
                let _ = events.send(PlanningEvent::ReActStepCompleted(ReActStep {
                    thought: token.delta.clone(),
                    action: String::new(),
                    observation: String::new(),
                }));
            }
            if token.is_final {
                break;
            }
        }
        Ok(accumulated)
    }

    async fn dispatch_action(
        &self,
        action: Action,
        conversation: &mut Vec<ChatMessage>,
        candidate: &Workflow,
        user_message: &str,
        events: &UnboundedSender<PlanningEvent>,
    ) -> Result<TurnOutcome, PlannerError> {
        match action {
            Action::QueryKnowledge { query, scope } => {
                let chunks = self.knowledge.retrieve(&query, scope.as_deref(), 5).await?;
                let observation = serde_json::to_string(&chunks).unwrap_or_default();
                let _ = events.send(PlanningEvent::ReActStepCompleted(ReActStep {
                    thought: String::new(),
                    action: format!("query_knowledge({query})"),
                    observation: observation.clone(),
                }));
                conversation.push(ChatMessage::user(format!("Knowledge results: {observation}")));
                Ok(TurnOutcome::Continue(candidate.clone()))
            }
            Action::PreviewPatch { patch, continue_editing } => {
                check_isolation(candidate, &patch, user_message)?;
                let patched = apply_patch(candidate, &patch)?;
                let diff = PatchDiffSummary::from_patch(&patch);
                let _ = events.send(PlanningEvent::WorkflowPatchGenerated { patch, diff });
                if continue_editing {
                    conversation.push(ChatMessage::user(
                        "Patch applied to the dry-run copy. Continue editing or call finalize.".to_string(),
                    ));
                }
                Ok(TurnOutcome::Continue(patched))
            }
            Action::Finalize => Ok(TurnOutcome::Finalize),
        }
    }
}

enum TurnOutcome {
    Continue(Workflow),
    Finalize,
}

fn last_raw_output(conversation: &[ChatMessage]) -> String {
    conversation
        .iter()
        .rev()
        .find(|m| m.role == ports::Role::Assistant)
        .map(|m| m.content.clone())
        .unwrap_or_default()
}

/// Synthesize a retry prompt carrying (a) the offending output, (b) the
/// validation error, (c) an instruction to re-emit the same action schema
/// (§4.2 retry policy).
fn retry_prompt(offending_output: &str, error: &PlannerError) -> String {
    format!(
        "Your previous output could not be used:\n---\n{offending_output}\n---\nValidation error: {error}\n\
         Re-emit a single JSON object matching the action schema \
         ({{\"action\": \"query_knowledge\"|\"preview_patch\"|\"finalize\", ...}})."
    )
}

/// The system message enumerating the canonical node-type catalog and the
/// current workflow serialization (§4.2 step 1).
fn system_prompt(workflow: &Workflow) -> String {
    let catalog: Vec<&str> = NodeType::ALL.iter().map(|t| t.tag()).collect();
    let document = serde_json::to_string(workflow).unwrap_or_default();
    format!(
        "You are a workflow planning assistant. The canonical node types are: {}.\n\
         Current workflow document:\n{document}\n\
         Respond with exactly one JSON action object per turn: \
         {{\"action\": \"query_knowledge\", \"query\": ..., \"scope\": ...}}, \
         {{\"action\": \"preview_patch\", \"patch\": {{\"ops\": [...]}}, \"continue_editing\": bool}}, \
         or {{\"action\": \"finalize\"}}.",
        catalog.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ports::testing::{StubKnowledgePort, StubLlmPort};

    fn start_end_workflow() -> Workflow {
        let mut wf = Workflow::new("test", None);
        wf.nodes.push(graph_model::Node::new("start", "start", serde_json::json!({})).unwrap());
        wf.nodes.push(graph_model::Node::new("end", "end", serde_json::json!({})).unwrap());
        wf.edges.push(graph_model::Edge { source: "start".into(), target: "end".into(), guard: None });
        wf
    }

    #[tokio::test]
    async fn immediate_finalize_completes_with_unchanged_workflow() {
        let llm = Arc::new(StubLlmPort::new([r#"{"action": "finalize"}"#]));
        let knowledge = Arc::new(StubKnowledgePort::new(Vec::new()));
        let planner = Planner::new(llm, knowledge, PlannerConfig::default());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let result = planner.plan(start_end_workflow(), "do nothing".into(), tx).await;
        assert!(result.is_ok());

        let mut saw_started = false;
        let mut saw_completed = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                PlanningEvent::WorkflowPlanningStarted { .. } => saw_started = true,
                PlanningEvent::WorkflowPlanningCompleted { .. } => saw_completed = true,
                _ => {}
            }
        }
        assert!(saw_started && saw_completed);
    }

    #[tokio::test]
    async fn preview_patch_then_finalize_inserts_llm_node() {
        // Mirrors §8 scenario 1: add an llm node between start and end.
        let patch_json = serde_json::json!({
            "action": "preview_patch",
            "continue_editing": false,
            "patch": {
                "ops": [
                    { "op": "remove_edge", "source": "start", "target": "end" },
                    { "op": "add_node", "node": { "id": "summarize", "node_type": "llm", "position": null, "config": { "model": "gpt-x", "prompt": "Summarize" }, "display_name": "Summarize" } },
                    { "op": "add_edge", "edge": { "source": "start", "target": "summarize", "guard": null } },
                    { "op": "add_edge", "edge": { "source": "summarize", "target": "end", "guard": null } }
                ]
            }
        })
        .to_string();

        let llm = Arc::new(StubLlmPort::new([patch_json, r#"{"action": "finalize"}"#.to_string()]));
        let knowledge = Arc::new(StubKnowledgePort::new(Vec::new()));
        let planner = Planner::new(llm, knowledge, PlannerConfig::default());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let result = planner
            .plan(start_end_workflow(), "add an llm node between start and end called Summarize".into(), tx)
            .await
            .unwrap();

        assert_eq!(result.nodes.len(), 3);
        assert_eq!(result.edges.len(), 2);

        let mut saw_patch = false;
        while let Ok(event) = rx.try_recv() {
            if let PlanningEvent::WorkflowPatchGenerated { diff, .. } = event {
                assert_eq!(diff.nodes_added, vec!["summarize".to_string()]);
                saw_patch = true;
            }
        }
        assert!(saw_patch);
    }

    #[tokio::test]
    async fn unparseable_output_exhausts_retries_and_fails() {
        let llm = Arc::new(StubLlmPort::new(["not json", "still not json", "nope", "nope again"]));
        let knowledge = Arc::new(StubKnowledgePort::new(Vec::new()));
        let planner = Planner::new(llm, knowledge, PlannerConfig::default());
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();

        let err = planner.plan(start_end_workflow(), "do something".into(), tx).await.unwrap_err();
        assert!(matches!(err, PlannerError::ParseFailure(_)));
    }

    #[tokio::test]
    async fn unknown_node_type_in_patch_surfaces_as_typed_error() {
        let bad_patch = serde_json::json!({
            "action": "preview_patch",
            "continue_editing": false,
            "patch": { "ops": [
                { "op": "add_node", "node": { "id": "x", "node_type": "quantum_agent", "position": null, "config": {}, "display_name": null } }
            ] }
        });
        // NodeType deserialization itself fails for an unknown tag before the
        // action schema is even reached, so this exercises ParseFailure.
        let llm = Arc::new(StubLlmPort::new([bad_patch.to_string(); 4]));
        let knowledge = Arc::new(StubKnowledgePort::new(Vec::new()));
        let planner = Planner::new(llm, knowledge, PlannerConfig::default());
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();

        let err = planner.plan(start_end_workflow(), "add a node".into(), tx).await.unwrap_err();
        assert!(matches!(err, PlannerError::ParseFailure(_)));
    }

    #[tokio::test]
    async fn step_limit_is_enforced() {
        let mut config = PlannerConfig::default();
        config.max_steps = 2;
        let responses: Vec<String> = (0..10).map(|_| r#"{"action": "query_knowledge", "query": "x", "scope": null}"#.to_string()).collect();
        let llm = Arc::new(StubLlmPort::new(responses));
        let knowledge = Arc::new(StubKnowledgePort::new(Vec::new()));
        let planner = Planner::new(llm, knowledge, config);
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();

        let err = planner.plan(start_end_workflow(), "loop forever".into(), tx).await.unwrap_err();
        assert!(matches!(err, PlannerError::StepLimitExceeded(2)));
    }
}
