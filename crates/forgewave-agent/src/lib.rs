//! Model-agnostic tool-calling agent loop.
//!
//! Pulls together plan parsing ([`plan_parser`]), tool-call recovery from
//! free text ([`tool_call`]), the tool registry and coordination surface
//! ([`tools`]), a pluggable model transport ([`llm`]), and the loop that
//! drives all of it for one agent turn ([`provider`]).

pub mod config;
pub mod error;
pub mod llm;
pub mod plan_parser;
pub mod provider;
pub mod tool_call;
pub mod tools;

pub use config::AgentRuntimeConfig;
pub use error::{AgentError, Result};
pub use llm::{EchoProvider, ModelTransport, ScriptedProvider, TransportMessage, TransportRole};
pub use plan_parser::{parse_json_plan, parse_plan, JsonPlan, PlanStrategy, TaskSpec};
pub use provider::{AgentProvider, AgentProviderConfig, ProviderEvent};
pub use tool_call::{extract_tool_calls, remove_tool_calls, ParsedToolCall, StreamFilter};
pub use tools::{ToolContext, ToolHandler, ToolRegistry};
