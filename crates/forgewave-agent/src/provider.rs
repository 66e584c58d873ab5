//! Agent Provider: the loop that drives one agent's turn to completion.
//!
//! Grounded in the donor agent crate's `runtime.rs` drive loop (prompt,
//! call the model, act on the response, repeat) but generalized: where the
//! donor reads a provider's native `tool_calls` field, this loop recovers
//! tool calls from plain text via [`crate::tool_call::extract_tool_calls`]
//! and drives an arbitrary [`ModelTransport`] instead of one specific wire
//! client.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::error::{AgentError, Result};
use crate::llm::{ModelTransport, TransportMessage};
use crate::tool_call::{extract_tool_calls, remove_tool_calls, StreamFilter};
use crate::tools::{ToolContext, ToolRegistry};

/// Tunables for one [`AgentProvider`] run.
#[derive(Debug, Clone)]
pub struct AgentProviderConfig {
    /// Hard cap on model-call iterations before the run fails rather than
    /// looping forever on a model that keeps calling tools.
    pub max_iterations: u32,
}

impl Default for AgentProviderConfig {
    fn default() -> Self {
        Self { max_iterations: 25 }
    }
}

/// Normalized events emitted by [`AgentProvider::run_streaming`], in strict
/// chronological order: any `ToolCallStarted` for a call is followed, before
/// the next model call begins, by exactly one matching `ToolCallCompleted`
/// or `ToolCallFailed`.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    /// A fragment of clean (non-tool-call) model text, safe to show live.
    Text(String),
    ToolCallStarted { name: String, arguments: Value },
    ToolCallCompleted { name: String, result: Value },
    ToolCallFailed { name: String, error: String },
    Completed { iterations: u32 },
    Error { message: String },
}

/// Drives one agent's prompt/respond/act loop to completion or cancellation.
pub struct AgentProvider {
    transport: Arc<dyn ModelTransport>,
    tools: ToolRegistry,
    config: AgentProviderConfig,
}

impl AgentProvider {
    pub fn new(
        transport: Arc<dyn ModelTransport>,
        tools: ToolRegistry,
        config: AgentProviderConfig,
    ) -> Self {
        Self {
            transport,
            tools,
            config,
        }
    }

    /// What this provider can do, surfaced for callers building a capability
    /// descriptor (e.g. for an A2A agent card) without constructing a run.
    pub fn known_tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run the loop non-streaming: iterate prompt -> model call -> extract
    /// tool calls -> execute -> append -> repeat, until the model produces a
    /// turn with no tool calls, the iteration cap is hit, or `cancelled`
    /// flips true. Returns the final clean-text response.
    pub async fn run(
        &self,
        ctx: &ToolContext,
        system_prompt: &str,
        user_message: &str,
        cancelled: &AtomicBool,
    ) -> Result<String> {
        let mut transcript = vec![
            TransportMessage::system(system_prompt),
            TransportMessage::user(user_message),
        ];

        for iteration in 0..self.config.max_iterations {
            if cancelled.load(Ordering::Relaxed) {
                return Err(AgentError::Cancelled {
                    agent_id: ctx.agent_id,
                });
            }

            let response = self.transport.complete(&transcript).await?;
            let tool_calls = extract_tool_calls(&response);
            if tool_calls.is_empty() {
                return Ok(response);
            }

            transcript.push(TransportMessage::assistant(&response));
            let results = self.tools.execute_all(ctx, &tool_calls).await;

            if cancelled.load(Ordering::Relaxed) {
                return Err(AgentError::Cancelled {
                    agent_id: ctx.agent_id,
                });
            }

            transcript.push(TransportMessage::user(ToolRegistry::format_results(&results)));

            if iteration + 1 == self.config.max_iterations {
                return Err(AgentError::MaxIterationsExceeded {
                    agent_id: ctx.agent_id,
                    max_iterations: self.config.max_iterations,
                });
            }
        }

        Err(AgentError::MaxIterationsExceeded {
            agent_id: ctx.agent_id,
            max_iterations: self.config.max_iterations,
        })
    }

    /// Run the loop as in [`Self::run`], but emit [`ProviderEvent`]s as the
    /// response streams in and as each tool call is executed.
    pub async fn run_streaming(
        &self,
        ctx: &ToolContext,
        system_prompt: &str,
        user_message: &str,
        cancelled: &AtomicBool,
        mut on_event: impl FnMut(ProviderEvent) + Send,
    ) -> Result<String> {
        let mut transcript = vec![
            TransportMessage::system(system_prompt),
            TransportMessage::user(user_message),
        ];

        for iteration in 0..self.config.max_iterations {
            if cancelled.load(Ordering::Relaxed) {
                let message = "run was cancelled".to_string();
                on_event(ProviderEvent::Error {
                    message: message.clone(),
                });
                return Err(AgentError::Cancelled {
                    agent_id: ctx.agent_id,
                });
            }

            let mut filter = StreamFilter::new();
            let stream_result = self
                .transport
                .stream(&transcript, &mut |chunk| {
                    filter.push(chunk, |clean| on_event(ProviderEvent::Text(clean.to_string())));
                })
                .await;
            filter.flush(|clean| on_event(ProviderEvent::Text(clean.to_string())));

            let response = match stream_result {
                Ok(text) => text,
                Err(e) => {
                    on_event(ProviderEvent::Error {
                        message: e.to_string(),
                    });
                    return Err(e);
                }
            };

            let tool_calls = extract_tool_calls(&response);
            if tool_calls.is_empty() {
                on_event(ProviderEvent::Completed {
                    iterations: iteration + 1,
                });
                return Ok(remove_tool_calls(&response));
            }

            transcript.push(TransportMessage::assistant(&response));

            let mut results = Vec::with_capacity(tool_calls.len());
            for call in &tool_calls {
                if cancelled.load(Ordering::Relaxed) {
                    return Err(AgentError::Cancelled {
                        agent_id: ctx.agent_id,
                    });
                }
                on_event(ProviderEvent::ToolCallStarted {
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                });
                let executed = self.tools.execute_all(ctx, std::slice::from_ref(call)).await;
                let (_, result) = executed.into_iter().next().expect("one call in, one result out");
                if result.get("success").and_then(Value::as_bool) == Some(false) {
                    on_event(ProviderEvent::ToolCallFailed {
                        name: call.name.clone(),
                        error: result
                            .get("error")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown error")
                            .to_string(),
                    });
                } else {
                    on_event(ProviderEvent::ToolCallCompleted {
                        name: call.name.clone(),
                        result: result.clone(),
                    });
                }
                results.push((call.name.clone(), result));
            }

            transcript.push(TransportMessage::user(ToolRegistry::format_results(&results)));

            if iteration + 1 == self.config.max_iterations {
                let error = AgentError::MaxIterationsExceeded {
                    agent_id: ctx.agent_id,
                    max_iterations: self.config.max_iterations,
                };
                on_event(ProviderEvent::Error {
                    message: error.to_string(),
                });
                return Err(error);
            }
        }

        Err(AgentError::MaxIterationsExceeded {
            agent_id: ctx.agent_id,
            max_iterations: self.config.max_iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{EchoProvider, ScriptedProvider};
    use forgewave_kernel::{AgentStore, ConversationStore, EventBus, TaskStore};
    use tempfile::tempdir;
    use uuid::Uuid;

    fn test_context(root: std::path::PathBuf) -> ToolContext {
        ToolContext {
            workspace_id: "ws1".to_string(),
            agent_id: Uuid::now_v7(),
            workspace_root: root,
            agents: AgentStore::new(),
            tasks: TaskStore::new(),
            conversations: ConversationStore::new(),
            events: EventBus::new(64),
        }
    }

    #[tokio::test]
    async fn run_returns_immediately_when_no_tool_calls() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path().to_path_buf());
        let provider = AgentProvider::new(
            Arc::new(EchoProvider::new("all done, no tools needed")),
            ToolRegistry::with_builtins(),
            AgentProviderConfig::default(),
        );
        let cancelled = AtomicBool::new(false);
        let result = provider.run(&ctx, "system", "do the thing", &cancelled).await.unwrap();
        assert_eq!(result, "all done, no tools needed");
    }

    #[tokio::test]
    async fn run_executes_tool_call_then_returns_final_text() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path().to_path_buf());
        let first = r#"<tool_call>{"name":"list_agents","arguments":{}}</tool_call>"#.to_string();
        let second = "final answer".to_string();
        let provider = AgentProvider::new(
            Arc::new(ScriptedProvider::new(vec![first, second])),
            ToolRegistry::with_builtins(),
            AgentProviderConfig::default(),
        );
        let cancelled = AtomicBool::new(false);
        let result = provider.run(&ctx, "system", "go", &cancelled).await.unwrap();
        assert_eq!(result, "final answer");
    }

    #[tokio::test]
    async fn run_reports_cancellation_before_first_model_call() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path().to_path_buf());
        let provider = AgentProvider::new(
            Arc::new(EchoProvider::new("unused")),
            ToolRegistry::with_builtins(),
            AgentProviderConfig::default(),
        );
        let cancelled = AtomicBool::new(true);
        let result = provider.run(&ctx, "system", "go", &cancelled).await;
        assert!(matches!(result, Err(AgentError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn run_fails_with_max_iterations_when_model_never_stops_calling_tools() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path().to_path_buf());
        let looping_call = r#"<tool_call>{"name":"list_agents","arguments":{}}</tool_call>"#;
        let provider = AgentProvider::new(
            Arc::new(EchoProvider::new(looping_call)),
            ToolRegistry::with_builtins(),
            AgentProviderConfig { max_iterations: 3 },
        );
        let cancelled = AtomicBool::new(false);
        let result = provider.run(&ctx, "system", "go", &cancelled).await;
        assert!(matches!(result, Err(AgentError::MaxIterationsExceeded { .. })));
    }

    #[tokio::test]
    async fn run_streaming_emits_text_then_completed_with_no_tool_calls() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path().to_path_buf());
        let provider = AgentProvider::new(
            Arc::new(EchoProvider::new("hello there")),
            ToolRegistry::with_builtins(),
            AgentProviderConfig::default(),
        );
        let cancelled = AtomicBool::new(false);
        let mut events = Vec::new();
        let result = provider
            .run_streaming(&ctx, "system", "go", &cancelled, |event| events.push(event))
            .await
            .unwrap();
        assert_eq!(result, "hello there");
        assert!(events
            .iter()
            .any(|e| matches!(e, ProviderEvent::Completed { iterations: 1 })));
    }

    #[tokio::test]
    async fn run_streaming_emits_tool_call_started_and_completed_in_order() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path().to_path_buf());
        let first = r#"<tool_call>{"name":"list_agents","arguments":{}}</tool_call>"#.to_string();
        let second = "final".to_string();
        let provider = AgentProvider::new(
            Arc::new(ScriptedProvider::new(vec![first, second])),
            ToolRegistry::with_builtins(),
            AgentProviderConfig::default(),
        );
        let cancelled = AtomicBool::new(false);
        let mut events = Vec::new();
        provider
            .run_streaming(&ctx, "system", "go", &cancelled, |event| events.push(event))
            .await
            .unwrap();

        let started_idx = events
            .iter()
            .position(|e| matches!(e, ProviderEvent::ToolCallStarted { .. }))
            .unwrap();
        let completed_idx = events
            .iter()
            .position(|e| matches!(e, ProviderEvent::ToolCallCompleted { .. }))
            .unwrap();
        assert!(started_idx < completed_idx);
    }
}
