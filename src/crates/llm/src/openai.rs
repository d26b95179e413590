//! OpenAI-compatible remote chat-completion client (§4.6 LLM Port: "OpenAI-compatible HTTP").
//!
//! Implements [`ports::LlmPort`] directly — the Planner never imports this
//! type, only the trait; this is the one concrete adapter a binary wiring
//! the system together would construct.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::Stream;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use ports::{ChatCompletion, ChatMessage, ChatToken, LlmPort, PortError, Result as PortResult, Role};

use crate::config::RemoteLlmConfig;
use crate::error::LlmError;
use crate::provider_utils::{ModelInfo, ProviderUtils};

/// An OpenAI-compatible chat-completion client. Works against the real
/// OpenAI API or any gateway implementing the same `/chat/completions`
/// wire format (the base URL is configurable for exactly this reason).
#[derive(Clone)]
pub struct OpenAiLlmPort {
    config: RemoteLlmConfig,
    client: Client,
}

impl OpenAiLlmPort {
    pub fn new(config: RemoteLlmConfig) -> Self {
        let client = Client::builder().timeout(config.timeout).build().expect("failed to build reqwest client");
        Self { config, client }
    }

    fn request_body(&self, messages: &[ChatMessage], stream: bool) -> OpenAiRequest {
        OpenAiRequest {
            model: self.config.model.clone(),
            messages: messages.iter().map(convert_message).collect(),
            stream,
        }
    }

    fn post(&self) -> reqwest::RequestBuilder {
        let url = format!("{}/chat/completions", self.config.base_url);
        let mut req = self.client.post(&url).header("Authorization", format!("Bearer {}", self.config.api_key));
        if let Some(org) = &self.config.organization {
            req = req.header("OpenAI-Organization", org);
        }
        req
    }

    async fn check_health(&self) -> Result<bool, LlmError> {
        let url = format!("{}/models", self.config.base_url);
        let response = self.client.get(&url).header("Authorization", format!("Bearer {}", self.config.api_key)).send().await?;
        Ok(response.status().is_success())
    }
}

fn convert_message(msg: &ChatMessage) -> OpenAiMessage {
    OpenAiMessage {
        role: match msg.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
        .to_string(),
        content: msg.content.clone(),
    }
}

async fn map_error_response(response: reqwest::Response) -> LlmError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(status = status.as_u16(), "OpenAI-compatible endpoint returned an error response");
    if status.as_u16() == 401 {
        LlmError::AuthenticationError(body)
    } else if status.as_u16() == 429 {
        LlmError::RateLimitExceeded(body)
    } else {
        LlmError::ProviderError(format!("OpenAI API error {status}: {body}"))
    }
}

#[async_trait]
impl LlmPort for OpenAiLlmPort {
    async fn invoke(&self, messages: &[ChatMessage]) -> PortResult<ChatCompletion> {
        let response = self
            .post()
            .json(&self.request_body(messages, false))
            .send()
            .await
            .map_err(LlmError::HttpError)
            .map_err(PortError::from)?;

        if !response.status().is_success() {
            return Err(map_error_response(response).await.into());
        }

        let body: OpenAiResponse = response.json().await.map_err(|e| LlmError::InvalidResponse(e.to_string())).map_err(PortError::from)?;
        let text = body.choices.into_iter().next().map(|c| c.message.content).unwrap_or_default();
        Ok(ChatCompletion { text })
    }

    /// Consumes the provider's `text/event-stream` response line by line,
    /// translating each `data: {...}` chunk's `delta.content` into a
    /// [`ChatToken`] (§4.2 step 2, §4.3 "Streaming LLM nodes"). The sentinel
    /// `data: [DONE]` line closes the stream with a final empty token.
    async fn invoke_streaming(&self, messages: &[ChatMessage]) -> PortResult<BoxStream<'static, ChatToken>> {
        let response = self
            .post()
            .json(&self.request_body(messages, true))
            .send()
            .await
            .map_err(LlmError::HttpError)
            .map_err(PortError::from)?;

        if !response.status().is_success() {
            return Err(map_error_response(response).await.into());
        }

        let byte_stream = response.bytes_stream();
        Ok(Box::pin(SseTokenStream::new(byte_stream)) as BoxStream<'static, ChatToken>)
    }
}

#[async_trait]
impl ProviderUtils for OpenAiLlmPort {
    async fn ping(&self) -> crate::error::Result<bool> {
        self.check_health().await
    }

    async fn fetch_models(&self) -> crate::error::Result<Vec<ModelInfo>> {
        Ok(vec![ModelInfo::new(&self.config.model)])
    }

    async fn use_model(&mut self, model: impl Into<String> + Send) -> crate::error::Result<String> {
        let model = model.into();
        self.config.model = model.clone();
        Ok(model)
    }

    fn current_model(&self) -> &str {
        &self.config.model
    }
}

/// Turns a raw SSE byte stream into a stream of [`ChatToken`]s, buffering
/// partial lines across chunk boundaries.
struct SseTokenStream<S> {
    inner: S,
    buffer: String,
    done: bool,
}

impl<S> SseTokenStream<S> {
    fn new(inner: S) -> Self {
        Self { inner, buffer: String::new(), done: false }
    }
}

impl<S> Stream for SseTokenStream<S>
where
    S: Stream<Item = reqwest::Result<Bytes>> + Unpin,
{
    type Item = ChatToken;

    fn poll_next(self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if this.done {
                return std::task::Poll::Ready(None);
            }
            if let Some(pos) = this.buffer.find('\n') {
                let line = this.buffer[..pos].trim_end_matches('\r').to_string();
                this.buffer.drain(..=pos);
                if let Some(token) = parse_sse_line(&line, &mut this.done) {
                    return std::task::Poll::Ready(Some(token));
                }
                continue;
            }
            match Pin::new(&mut this.inner).poll_next(cx) {
                std::task::Poll::Ready(Some(Ok(chunk))) => {
                    this.buffer.push_str(&String::from_utf8_lossy(&chunk));
                }
                std::task::Poll::Ready(Some(Err(_))) | std::task::Poll::Ready(None) => {
                    this.done = true;
                    return std::task::Poll::Ready(Some(ChatToken { delta: String::new(), is_final: true }));
                }
                std::task::Poll::Pending => return std::task::Poll::Pending,
            }
        }
    }
}

fn parse_sse_line(line: &str, done: &mut bool) -> Option<ChatToken> {
    let data = line.strip_prefix("data:")?.trim();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        *done = true;
        return Some(ChatToken { delta: String::new(), is_final: true });
    }
    let chunk: OpenAiStreamChunk = serde_json::from_str(data).ok()?;
    let delta = chunk.choices.into_iter().next().and_then(|c| c.delta.content).unwrap_or_default();
    if delta.is_empty() {
        None
    } else {
        Some(ChatToken { delta, is_final: false })
    }
}

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiStreamDelta,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_construction_does_not_panic() {
        let config = RemoteLlmConfig::new("test-key", "https://api.openai.com/v1", "gpt-4");
        let _client = OpenAiLlmPort::new(config);
    }

    #[test]
    fn message_conversion_maps_roles() {
        let msg = ChatMessage::user("hello");
        let converted = convert_message(&msg);
        assert_eq!(converted.role, "user");
        assert_eq!(converted.content, "hello");
    }

    #[test]
    fn sse_line_parsing_extracts_delta_content() {
        let mut done = false;
        let line = r#"data: {"choices":[{"delta":{"content":"hi"}}]}"#;
        let token = parse_sse_line(line, &mut done).unwrap();
        assert_eq!(token.delta, "hi");
        assert!(!token.is_final);
        assert!(!done);
    }

    #[test]
    fn sse_done_sentinel_is_final() {
        let mut done = false;
        let token = parse_sse_line("data: [DONE]", &mut done).unwrap();
        assert!(token.is_final);
        assert!(done);
    }
}
