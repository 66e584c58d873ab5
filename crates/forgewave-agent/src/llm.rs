//! Model transport abstraction.
//!
//! The spec scopes the actual wire protocol to a specific LLM provider out
//! of this crate — there is no HTTP/SSE/stdio framing here, unlike the donor
//! agent crate's `llm::client`/`llm::streaming` modules, which speak a
//! concrete provider's native tool-calling wire format. [`ModelTransport`]
//! is the seam instead: callers plug in whatever speaks to their provider of
//! choice, and [`crate::provider::AgentProvider`] drives it purely in terms
//! of text turns, recovering tool calls from that text via
//! [`crate::tool_call`] rather than a provider-specific structured field.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

/// The role of one turn in a transport-level conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportRole {
    System,
    User,
    Assistant,
}

/// One turn of transport-level conversation context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportMessage {
    pub role: TransportRole,
    pub content: String,
}

impl TransportMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: TransportRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TransportRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TransportRole::Assistant,
            content: content.into(),
        }
    }
}

/// A pluggable connection to a text-completion model. Implementors own
/// whatever request framing, retries, and auth their provider needs; this
/// crate only ever sees whole or streamed text back.
#[async_trait]
pub trait ModelTransport: Send + Sync {
    /// Run one full completion and return the model's entire response text.
    async fn complete(&self, messages: &[TransportMessage]) -> Result<String>;

    /// Run one completion, invoking `on_token` for each chunk as it arrives.
    /// Returns the full response text once the stream ends. The default
    /// implementation falls back to [`Self::complete`] and delivers it as a
    /// single chunk, for transports that cannot stream.
    async fn stream(
        &self,
        messages: &[TransportMessage],
        on_token: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String> {
        let text = self.complete(messages).await?;
        on_token(&text);
        Ok(text)
    }
}

/// A transport that always returns a fixed string, regardless of input.
/// Useful for exercising the provider loop's non-tool-calling path in tests.
pub struct EchoProvider {
    pub response: String,
}

impl EchoProvider {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

#[async_trait]
impl ModelTransport for EchoProvider {
    async fn complete(&self, _messages: &[TransportMessage]) -> Result<String> {
        Ok(self.response.clone())
    }
}

/// A transport that returns one scripted response per call, in order, then
/// errors once exhausted. Lets a test drive a multi-turn tool-calling loop
/// deterministically.
pub struct ScriptedProvider {
    responses: tokio::sync::Mutex<std::collections::VecDeque<String>>,
}

impl ScriptedProvider {
    pub fn new(responses: impl IntoIterator<Item = String>) -> Self {
        Self {
            responses: tokio::sync::Mutex::new(responses.into_iter().collect()),
        }
    }
}

#[async_trait]
impl ModelTransport for ScriptedProvider {
    async fn complete(&self, _messages: &[TransportMessage]) -> Result<String> {
        self.responses
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| AgentError::TransportFailed {
                reason: "scripted provider exhausted".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_provider_ignores_input() {
        let provider = EchoProvider::new("hello");
        let out = provider
            .complete(&[TransportMessage::user("anything")])
            .await
            .unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn scripted_provider_returns_in_order_then_errors() {
        let provider = ScriptedProvider::new(vec!["first".to_string(), "second".to_string()]);
        assert_eq!(provider.complete(&[]).await.unwrap(), "first");
        assert_eq!(provider.complete(&[]).await.unwrap(), "second");
        assert!(provider.complete(&[]).await.is_err());
    }

    #[tokio::test]
    async fn default_stream_falls_back_to_complete() {
        let provider = EchoProvider::new("streamed");
        let mut collected = String::new();
        let out = provider
            .stream(&[], &mut |chunk| collected.push_str(chunk))
            .await
            .unwrap();
        assert_eq!(out, "streamed");
        assert_eq!(collected, "streamed");
    }
}
