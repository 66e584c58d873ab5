//! A concrete [`ModelTransport`] speaking the Anthropic Messages API.
//!
//! Grounded in the donor agent crate's `llm::client::LlmClient`
//! (reqwest client, bearer/x-api-key header, JSON request/response), but
//! collapsed to the thin text-in/text-out shape [`ModelTransport`] asks for:
//! no tool-call fields, no streaming SSE parsing, one system message and one
//! running list of user/assistant turns.

use std::time::Duration;

use async_trait::async_trait;
use forgewave_agent::{AgentError, ModelTransport, Result, TransportMessage, TransportRole};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicTransport {
    api_key: String,
    base_url: String,
    model: String,
    http: reqwest::Client,
}

impl AnthropicTransport {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AgentError::TransportFailed {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            api_key: api_key.into(),
            base_url: ANTHROPIC_BASE_URL.to_string(),
            model: model.into(),
            http,
        })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key).map_err(|e| AgentError::TransportFailed {
                reason: format!("invalid api key header: {e}"),
            })?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        Ok(headers)
    }
}

#[async_trait]
impl ModelTransport for AnthropicTransport {
    async fn complete(&self, messages: &[TransportMessage]) -> Result<String> {
        let system = messages
            .iter()
            .find(|m| m.role == TransportRole::System)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let turns: Vec<Value> = messages
            .iter()
            .filter(|m| m.role != TransportRole::System)
            .map(|m| {
                let role = match m.role {
                    TransportRole::User => "user",
                    TransportRole::Assistant => "assistant",
                    TransportRole::System => unreachable!("filtered above"),
                };
                json!({ "role": role, "content": m.content })
            })
            .collect();

        let body = json!({
            "model": self.model,
            "max_tokens": 4096,
            "system": system,
            "messages": turns,
        });

        let resp = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::TransportFailed {
                reason: format!("request failed: {e}"),
            })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| AgentError::TransportFailed {
            reason: format!("failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            return Err(AgentError::TransportFailed {
                reason: format!("API returned {status}: {text}"),
            });
        }

        let parsed: Value = serde_json::from_str(&text).map_err(|e| AgentError::TransportFailed {
            reason: format!("invalid JSON response: {e}"),
        })?;

        let content = parsed
            .get("content")
            .and_then(Value::as_array)
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                    .filter_map(|b| b.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        Ok(content)
    }
}
