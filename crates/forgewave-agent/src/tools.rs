//! Text-Based Tool Executor and the coordination tool surface.
//!
//! Every tool call recovered by [`crate::tool_call::extract_tool_calls`] is
//! dispatched through a [`ToolRegistry`] and always resolves to a `{success,
//! data|error}` envelope — a handler never propagates a Rust `Err` past this
//! boundary, matching [`crate::error::AgentError`]'s documented contract.
//! Built-in filesystem handlers are grounded in the donor adapters crate's
//! `FilesystemAdapter::safe_resolve`/`normalize_path` path-confinement logic;
//! the coordination handlers (`list_agents`, `delegate`, ...) are grounded in
//! that same crate's `Adapter` trait shape, generalized to operate on the
//! kernel's agent/task/conversation stores and event bus instead of an
//! external system.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use forgewave_kernel::{
    Agent, AgentRole, AgentStatus, CompletionReport, ConversationStore, Event, EventBus,
    Message, MessageRole, ModelTier, Task, TaskStatus, TaskStore, WorkspaceId,
};

use crate::tool_call::ParsedToolCall;

/// Maximum characters returned by `read_file` before truncation, matching
/// the donor filesystem adapter's cap.
const MAX_FILE_READ_CHARS: usize = 16_000;

/// Shared state every tool handler runs against.
#[derive(Clone)]
pub struct ToolContext {
    pub workspace_id: WorkspaceId,
    pub agent_id: Uuid,
    pub workspace_root: PathBuf,
    pub agents: forgewave_kernel::AgentStore,
    pub tasks: TaskStore,
    pub conversations: ConversationStore,
    pub events: EventBus,
}

fn ok(data: Value) -> Value {
    json!({ "success": true, "data": data })
}

fn err(message: impl Into<String>) -> Value {
    json!({ "success": false, "error": message.into() })
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;
    async fn call(&self, ctx: &ToolContext, arguments: Value) -> Value;
}

/// Dispatch table mapping tool name to handler.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    /// A registry with every built-in filesystem and coordination handler
    /// already registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();
        registry.register(Arc::new(ReadFileTool));
        registry.register(Arc::new(ListFilesTool));
        registry.register(Arc::new(WriteFileTool));
        registry.register(Arc::new(ListAgentsTool));
        registry.register(Arc::new(ReadAgentConversationTool));
        registry.register(Arc::new(CreateAgentTool));
        registry.register(Arc::new(DelegateTool));
        registry.register(Arc::new(MessageAgentTool));
        registry.register(Arc::new(ReportToParentTool));
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Execute every call in `calls`, strictly in order. An unknown tool
    /// name yields an error envelope rather than aborting the batch.
    pub async fn execute_all(
        &self,
        ctx: &ToolContext,
        calls: &[ParsedToolCall],
    ) -> Vec<(String, Value)> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let result = match self.handlers.get(&call.name) {
                Some(handler) => handler.call(ctx, call.arguments.clone()).await,
                None => err(format!("unknown tool: {}", call.name)),
            };
            results.push((call.name.clone(), result));
        }
        results
    }

    /// Render executed results as `<tool_result>` blocks, in call order, the
    /// way they are fed back into the next turn of model context.
    pub fn format_results(results: &[(String, Value)]) -> String {
        results
            .iter()
            .map(|(name, value)| {
                format!(
                    "<tool_result name=\"{name}\">{}</tool_result>",
                    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ---------------------------------------------------------------------------
// Filesystem handlers
// ---------------------------------------------------------------------------

/// Resolve `raw_path` against `root` the way `FilesystemAdapter::safe_resolve`
/// does: join non-absolute paths onto `root`, normalize `.`/`..` components
/// without touching the filesystem (the target may not exist yet), then
/// reject anything that escapes `root` once canonicalized.
fn safe_resolve(root: &Path, raw_path: &str) -> Result<PathBuf, String> {
    let candidate = Path::new(raw_path);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };
    let normalized = normalize_path(&joined);

    let canonical_root = root
        .canonicalize()
        .map_err(|e| format!("workspace root is not accessible: {e}"))?;

    if !normalized.starts_with(&canonical_root) {
        // The root itself may not be canonical relative to `normalized` if
        // `root` contains symlinks; compare against the non-canonical root
        // too so freshly created files inside it still resolve correctly.
        if !normalized.starts_with(root) {
            return Err(format!("path escapes workspace root: {raw_path}"));
        }
    }
    Ok(normalized)
}

fn normalize_path(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if matches!(out.components().last(), Some(Component::Normal(_))) {
                    out.pop();
                } else {
                    out.push(component);
                }
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

struct ReadFileTool;

#[async_trait]
impl ToolHandler for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    async fn call(&self, ctx: &ToolContext, arguments: Value) -> Value {
        let Some(raw_path) = arguments.get("path").and_then(Value::as_str) else {
            return err("missing required argument: path");
        };
        let path = match safe_resolve(&ctx.workspace_root, raw_path) {
            Ok(path) => path,
            Err(message) => return err(message),
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                if content.chars().count() > MAX_FILE_READ_CHARS {
                    let truncated: String = content.chars().take(MAX_FILE_READ_CHARS).collect();
                    ok(json!({
                        "content": truncated,
                        "truncated": true,
                    }))
                } else {
                    ok(json!({ "content": content, "truncated": false }))
                }
            }
            Err(e) => err(format!("failed to read {raw_path}: {e}")),
        }
    }
}

struct ListFilesTool;

#[async_trait]
impl ToolHandler for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    async fn call(&self, ctx: &ToolContext, arguments: Value) -> Value {
        let raw_path = arguments
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or(".");
        let path = match safe_resolve(&ctx.workspace_root, raw_path) {
            Ok(path) => path,
            Err(message) => return err(message),
        };
        let mut entries = match tokio::fs::read_dir(&path).await {
            Ok(entries) => entries,
            Err(e) => return err(format!("failed to list {raw_path}: {e}")),
        };
        let mut names = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => names.push(entry.file_name().to_string_lossy().into_owned()),
                Ok(None) => break,
                Err(e) => return err(format!("failed to list {raw_path}: {e}")),
            }
        }
        names.sort();
        ok(json!({ "entries": names }))
    }
}

struct WriteFileTool;

#[async_trait]
impl ToolHandler for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    async fn call(&self, ctx: &ToolContext, arguments: Value) -> Value {
        let (Some(raw_path), Some(content)) = (
            arguments.get("path").and_then(Value::as_str),
            arguments.get("content").and_then(Value::as_str),
        ) else {
            return err("missing required arguments: path, content");
        };
        let path = match safe_resolve(&ctx.workspace_root, raw_path) {
            Ok(path) => path,
            Err(message) => return err(message),
        };
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return err(format!("failed to create parent directories: {e}"));
            }
        }
        match tokio::fs::write(&path, content).await {
            Ok(()) => ok(json!({ "bytes_written": content.len() })),
            Err(e) => err(format!("failed to write {raw_path}: {e}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Coordination handlers
// ---------------------------------------------------------------------------

fn agent_json(agent: &Agent) -> Value {
    json!({
        "id": agent.id,
        "role": agent.role,
        "status": agent.status,
        "name": agent.name,
        "parent_id": agent.parent_id,
    })
}

struct ListAgentsTool;

#[async_trait]
impl ToolHandler for ListAgentsTool {
    fn name(&self) -> &str {
        "list_agents"
    }

    async fn call(&self, ctx: &ToolContext, _arguments: Value) -> Value {
        let agents: Vec<Value> = ctx
            .agents
            .list_by_workspace(&ctx.workspace_id)
            .iter()
            .map(agent_json)
            .collect();
        ok(json!({ "agents": agents }))
    }
}

struct ReadAgentConversationTool;

#[async_trait]
impl ToolHandler for ReadAgentConversationTool {
    fn name(&self) -> &str {
        "read_agent_conversation"
    }

    async fn call(&self, ctx: &ToolContext, arguments: Value) -> Value {
        let Some(agent_id) = arguments
            .get("agent_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
        else {
            return err("missing or invalid argument: agent_id");
        };
        if ctx.agents.get(agent_id).is_err() {
            return err(format!("unknown agent: {agent_id}"));
        }
        let include_tool_calls = arguments
            .get("include_tool_calls")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let messages = match (
            arguments.get("last_n").and_then(Value::as_u64),
            arguments.get("start_turn").and_then(Value::as_u64),
            arguments.get("end_turn").and_then(Value::as_u64),
        ) {
            (Some(n), _, _) => ctx.conversations.get_last_n(agent_id, n as usize),
            (None, Some(start), Some(end)) => ctx.conversations.get_by_turn_range(agent_id, start, end),
            _ => ctx.conversations.get_conversation(agent_id),
        };
        let rendered: Vec<Value> = messages
            .iter()
            .filter(|m| include_tool_calls || m.role != MessageRole::Tool)
            .map(|m| json!({ "role": m.role, "content": m.content, "turn": m.turn }))
            .collect();
        ok(json!({ "messages": rendered }))
    }
}

struct CreateAgentTool;

#[async_trait]
impl ToolHandler for CreateAgentTool {
    fn name(&self) -> &str {
        "create_agent"
    }

    async fn call(&self, ctx: &ToolContext, arguments: Value) -> Value {
        let Some(name) = arguments.get("name").and_then(Value::as_str) else {
            return err("missing required argument: name");
        };
        let role = match arguments.get("role").and_then(Value::as_str) {
            Some("CRAFTER") | None => AgentRole::Crafter,
            Some("GATE") => AgentRole::Gate,
            Some(other) => return err(format!("invalid role: {other}")),
        };
        let model_tier = match arguments.get("model_tier").and_then(Value::as_str) {
            Some("FAST") => ModelTier::Fast,
            _ => ModelTier::Smart,
        };
        let workspace_id = arguments
            .get("workspace_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| ctx.workspace_id.clone());
        let parent_id = match arguments.get("parent_id").and_then(Value::as_str) {
            Some(raw) => match Uuid::parse_str(raw) {
                Ok(id) => id,
                Err(_) => return err(format!("invalid parent_id: {raw}")),
            },
            None => ctx.agent_id,
        };

        let agent = Agent::child(&workspace_id, name, role, parent_id, model_tier);
        let agent_id = agent.id;
        ctx.agents.save(agent.clone());
        ctx.events.emit(Event::AgentCreated {
            agent_id,
            workspace_id,
            timestamp: chrono::Utc::now(),
        });
        ok(agent_json(&agent))
    }
}

struct DelegateTool;

#[async_trait]
impl ToolHandler for DelegateTool {
    fn name(&self) -> &str {
        "delegate"
    }

    async fn call(&self, ctx: &ToolContext, arguments: Value) -> Value {
        let (Some(task_id), Some(agent_id)) = (
            arguments
                .get("task_id")
                .and_then(Value::as_str)
                .and_then(|s| Uuid::parse_str(s).ok()),
            arguments
                .get("agent_id")
                .and_then(Value::as_str)
                .and_then(|s| Uuid::parse_str(s).ok()),
        ) else {
            return err("missing or invalid arguments: task_id, agent_id");
        };

        let mut task: Task = match ctx.tasks.get(task_id) {
            Ok(task) => task,
            Err(e) => return err(e.to_string()),
        };
        if ctx.agents.get(agent_id).is_err() {
            return err(format!("unknown agent: {agent_id}"));
        }
        if task.status != TaskStatus::Pending {
            return err(format!(
                "task {task_id} is not PENDING (currently {:?})",
                task.status
            ));
        }

        let old_status = task.status;
        task.assigned_to = Some(agent_id);
        task.status = TaskStatus::InProgress;
        task.updated_at = chrono::Utc::now();
        ctx.tasks.save(task);

        let old_agent_status = match ctx.agents.get(agent_id) {
            Ok(agent) => agent.status,
            Err(e) => return err(e.to_string()),
        };
        if let Err(e) = ctx.agents.update_status(agent_id, AgentStatus::Active) {
            return err(e.to_string());
        }

        ctx.events.emit(Event::TaskDelegated {
            task_id,
            agent_id,
            timestamp: chrono::Utc::now(),
        });
        ctx.events.emit(Event::TaskStatusChanged {
            task_id,
            old_status,
            new_status: TaskStatus::InProgress,
            timestamp: chrono::Utc::now(),
        });
        ctx.events.emit(Event::AgentStatusChanged {
            agent_id,
            old_status: old_agent_status,
            new_status: AgentStatus::Active,
            timestamp: chrono::Utc::now(),
        });
        ok(json!({ "task_id": task_id, "assigned_to": agent_id }))
    }
}

struct MessageAgentTool;

#[async_trait]
impl ToolHandler for MessageAgentTool {
    fn name(&self) -> &str {
        "message_agent"
    }

    async fn call(&self, ctx: &ToolContext, arguments: Value) -> Value {
        let (Some(agent_id), Some(content)) = (
            arguments
                .get("to")
                .or_else(|| arguments.get("agent_id"))
                .and_then(Value::as_str)
                .and_then(|s| Uuid::parse_str(s).ok()),
            arguments.get("content").or_else(|| arguments.get("message")).and_then(Value::as_str),
        ) else {
            return err("missing or invalid arguments: to, content");
        };
        if ctx.agents.get(agent_id).is_err() {
            return err(format!("unknown agent: {agent_id}"));
        }

        let (sender_label, sender_role) = match arguments
            .get("from")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
        {
            Some(from_id) => match ctx.agents.get(from_id) {
                Ok(sender) => (sender.name, format!("{:?}", sender.role).to_uppercase()),
                Err(e) => return err(e.to_string()),
            },
            None => match ctx.agents.get(ctx.agent_id) {
                Ok(sender) => (sender.name, format!("{:?}", sender.role).to_uppercase()),
                Err(e) => return err(e.to_string()),
            },
        };
        let prefixed = format!("[From {sender_label} ({sender_role})]: {content}");

        let message = ctx
            .conversations
            .append(Message::new(agent_id, MessageRole::User, prefixed));
        ctx.events.emit(Event::MessageReceived {
            agent_id,
            message_id: message.id,
            timestamp: message.timestamp,
        });
        ok(json!({ "message_id": message.id, "turn": message.turn }))
    }
}

struct ReportToParentTool;

#[async_trait]
impl ToolHandler for ReportToParentTool {
    fn name(&self) -> &str {
        "report_to_parent"
    }

    async fn call(&self, ctx: &ToolContext, arguments: Value) -> Value {
        let Some(summary) = arguments.get("summary").and_then(Value::as_str) else {
            return err("missing required argument: summary");
        };
        let Some(task_id) = arguments
            .get("task_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
        else {
            return err("missing or invalid argument: task_id");
        };
        let success = arguments
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let files_modified = arguments
            .get("files_modified")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        let verification_results = arguments
            .get("verification_results")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|entry| {
                        let command = entry.get("command")?.as_str()?.to_string();
                        let result = entry.get("result")?.as_str()?.to_string();
                        Some((command, result))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let reporting_agent = match ctx.agents.get(ctx.agent_id) {
            Ok(agent) => agent,
            Err(e) => return err(e.to_string()),
        };
        let Some(parent_id) = reporting_agent.parent_id else {
            return err("agent has no parent to report to");
        };

        let report = CompletionReport {
            agent_id: ctx.agent_id,
            task_id,
            summary: summary.to_string(),
            files_modified,
            verification_results,
            success,
        };
        let message = ctx.conversations.append(Message::new(
            parent_id,
            MessageRole::User,
            serde_json::to_string(&report).unwrap_or_default(),
        ));
        ctx.events.emit(Event::MessageReceived {
            agent_id: parent_id,
            message_id: message.id,
            timestamp: message.timestamp,
        });
        ok(json!({ "delivered_to": parent_id, "report": report }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_context(root: PathBuf) -> ToolContext {
        ToolContext {
            workspace_id: "ws1".to_string(),
            agent_id: Uuid::now_v7(),
            workspace_root: root,
            agents: forgewave_kernel::AgentStore::new(),
            tasks: TaskStore::new(),
            conversations: ConversationStore::new(),
            events: EventBus::new(64),
        }
    }

    #[test]
    fn normalize_path_resolves_parent_components() {
        let path = Path::new("a/b/../c");
        assert_eq!(normalize_path(path), PathBuf::from("a/c"));
    }

    #[test]
    fn path_traversal_is_blocked() {
        let dir = tempdir().unwrap();
        let result = safe_resolve(dir.path(), "../../etc/passwd");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn write_then_read_file_round_trips() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path().to_path_buf());
        let registry = ToolRegistry::with_builtins();

        let write_result = registry
            .execute_all(
                &ctx,
                &[ParsedToolCall {
                    name: "write_file".to_string(),
                    arguments: json!({ "path": "notes/a.txt", "content": "hello" }),
                }],
            )
            .await;
        assert_eq!(write_result[0].1["success"], true);

        let read_result = registry
            .execute_all(
                &ctx,
                &[ParsedToolCall {
                    name: "read_file".to_string(),
                    arguments: json!({ "path": "notes/a.txt" }),
                }],
            )
            .await;
        assert_eq!(read_result[0].1["data"]["content"], "hello");
    }

    #[tokio::test]
    async fn read_file_rejects_escaping_path() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path().to_path_buf());
        let registry = ToolRegistry::with_builtins();
        let result = registry
            .execute_all(
                &ctx,
                &[ParsedToolCall {
                    name: "read_file".to_string(),
                    arguments: json!({ "path": "../../etc/passwd" }),
                }],
            )
            .await;
        assert_eq!(result[0].1["success"], false);
    }

    #[tokio::test]
    async fn unknown_tool_yields_error_envelope_without_aborting_batch() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path().to_path_buf());
        let registry = ToolRegistry::with_builtins();
        let results = registry
            .execute_all(
                &ctx,
                &[
                    ParsedToolCall {
                        name: "not_a_real_tool".to_string(),
                        arguments: json!({}),
                    },
                    ParsedToolCall {
                        name: "list_agents".to_string(),
                        arguments: json!({}),
                    },
                ],
            )
            .await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].1["success"], false);
        assert_eq!(results[1].1["success"], true);
    }

    #[tokio::test]
    async fn create_agent_then_delegate_then_report_to_parent() {
        let dir = tempdir().unwrap();
        let mut ctx = test_context(dir.path().to_path_buf());
        let routa = Agent::routa(&ctx.workspace_id, "routa-1");
        ctx.agent_id = routa.id;
        ctx.agents.save(routa.clone());

        let task = Task::new(&ctx.workspace_id, "T1", "do thing", "scope");
        let task_id = task.id;
        ctx.tasks.save(task);

        let registry = ToolRegistry::with_builtins();

        let create_result = registry
            .execute_all(
                &ctx,
                &[ParsedToolCall {
                    name: "create_agent".to_string(),
                    arguments: json!({ "name": "crafter-1", "role": "CRAFTER" }),
                }],
            )
            .await;
        let crafter_id_str = create_result[0].1["data"]["id"].as_str().unwrap().to_string();
        let crafter_id = Uuid::parse_str(&crafter_id_str).unwrap();

        let delegate_result = registry
            .execute_all(
                &ctx,
                &[ParsedToolCall {
                    name: "delegate".to_string(),
                    arguments: json!({ "task_id": task_id, "agent_id": crafter_id }),
                }],
            )
            .await;
        assert_eq!(delegate_result[0].1["success"], true);
        assert_eq!(ctx.tasks.get(task_id).unwrap().status, TaskStatus::InProgress);

        let mut crafter_ctx = ctx.clone();
        crafter_ctx.agent_id = crafter_id;
        let report_result = registry
            .execute_all(
                &crafter_ctx,
                &[ParsedToolCall {
                    name: "report_to_parent".to_string(),
                    arguments: json!({
                        "task_id": task_id,
                        "summary": "done",
                        "success": true,
                    }),
                }],
            )
            .await;
        assert_eq!(report_result[0].1["success"], true);
        let parent_conversation = ctx.conversations.get_conversation(routa.id);
        assert_eq!(parent_conversation.len(), 1);
    }
}
