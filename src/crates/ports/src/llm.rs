//! LLM Port (§4.6): the only way the Planner talks to a language model.
//!
//! Modeled on `langgraph_core::llm::ChatModel` — a minimal, provider-agnostic
//! trait that implementations (OpenAI-compatible HTTP, recorded replay,
//! deterministic stub) fill in. The Planner never imports a concrete client.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// A single incremental chunk of a streamed completion.
#[derive(Debug, Clone)]
pub struct ChatToken {
    pub delta: String,
    pub is_final: bool,
}

/// The result of a non-streamed `invoke`.
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub text: String,
}

/// Abstract boundary to a chat-completion-capable language model.
///
/// `invoke` returns either the full text (non-streaming) or a boxed stream
/// of [`ChatToken`]s (streaming), matching the Planner's need to emit
/// `thinking` events with incremental content (§4.2 step 2).
#[async_trait]
pub trait LlmPort: Send + Sync {
    async fn invoke(&self, messages: &[ChatMessage]) -> Result<ChatCompletion>;

    async fn invoke_streaming(&self, messages: &[ChatMessage]) -> Result<BoxStream<'static, ChatToken>>;
}
