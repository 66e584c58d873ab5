//! A2A (Agent-to-Agent) JSON-RPC 2.0 adapter (C10).
//!
//! Grounded directly in the donor web crate's `mcp.rs`: the
//! `JsonRpcRequest`/`JsonRpcResponse`/`JsonRpcError` shapes, the standard
//! error-code constants, and the `success()`/`error()` constructors are
//! carried over verbatim in spirit. Method names and result shapes are
//! swapped for the A2A vocabulary (`message/send`, `tasks/get`,
//! `tasks/cancel`) in place of MCP's `tools/list`/`tools/call`, and instead
//! of dispatching to adapters this server forwards text to a workspace's
//! ROUTA agent — as a `message_agent(from=external, to=ROUTA)` call — and
//! drives a full orchestration pass, mapping task state for external callers
//! as waves progress.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use forgewave_coordinator::{ExecuteOutcome, Orchestrator};
use forgewave_kernel::{ConversationStore, Message, MessageRole, TaskStatus};

// ---------------------------------------------------------------------------
// JSON-RPC types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Task state mapping
// ---------------------------------------------------------------------------

/// External A2A task-state vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExternalTaskState {
    Submitted,
    Working,
    InputRequired,
    Completed,
    Canceled,
    Failed,
    Rejected,
}

/// Map an internal [`TaskStatus`] to the external A2A state vocabulary.
pub fn map_task_status(status: TaskStatus) -> ExternalTaskState {
    match status {
        TaskStatus::Pending => ExternalTaskState::Submitted,
        TaskStatus::InProgress | TaskStatus::ReviewRequired | TaskStatus::NeedsFix => {
            ExternalTaskState::Working
        }
        TaskStatus::Completed => ExternalTaskState::Completed,
        TaskStatus::Cancelled => ExternalTaskState::Canceled,
        TaskStatus::Blocked => ExternalTaskState::InputRequired,
    }
}

fn task_envelope(task: &forgewave_kernel::Task) -> Value {
    let mut artifacts = Vec::new();
    if let Some(summary) = &task.completion_summary {
        artifacts.push(json!({
            "name": "completion_summary",
            "parts": [{ "type": "text", "text": summary }],
        }));
    }
    json!({
        "id": task.id,
        "contextId": task.workspace_id,
        "status": {
            "state": map_task_status(task.status),
            "timestamp": task.updated_at,
        },
        "artifacts": artifacts,
    })
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

fn concatenated_text(message: &Value) -> Option<String> {
    let parts = message.get("parts")?.as_array()?;
    let text = parts
        .iter()
        .filter(|p| p.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("");
    Some(text)
}

/// Serves one workspace's A2A surface. Not itself the axum state — see
/// [`crate::state::AppState`] for the shared handle wrapping this.
pub struct A2aServer {
    orchestrator: Arc<Orchestrator>,
}

impl A2aServer {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        tracing::debug!(method = %request.method, "A2A request received");
        match request.method.as_str() {
            "message/send" => self.handle_message_send(request.id, request.params),
            "tasks/get" => self.handle_tasks_get(request.id, request.params),
            "tasks/cancel" => self.handle_tasks_cancel(request.id, request.params),
            other => JsonRpcResponse::error(
                request.id,
                METHOD_NOT_FOUND,
                format!("method not found: {other}"),
            ),
        }
    }

    /// Forward the incoming text as a `message_agent(from=external,
    /// to=ROUTA)` call, register an external tracking task for it, and spawn
    /// a full orchestration pass in the background. `tasks/get` reads this
    /// tracking task's store record as the pass progresses; it is distinct
    /// from the internal per-task records ROUTA's own plan produces.
    fn handle_message_send(&self, id: Option<Value>, params: Value) -> JsonRpcResponse {
        let Some(message) = params.get("message") else {
            return JsonRpcResponse::error(id, INVALID_PARAMS, "missing required field: message");
        };
        let Some(text) = concatenated_text(message) else {
            return JsonRpcResponse::error(
                id,
                INVALID_PARAMS,
                "message must contain at least one text part",
            );
        };

        let coordinator = self.orchestrator.coordinator().clone();
        let routa_id = coordinator.initialize();

        let task = forgewave_kernel::Task::new(coordinator.workspace_id(), "external request", &text, "");
        let task_id = task.id;
        coordinator.tasks().save(task);

        coordinator.conversations().append(Message::new(
            routa_id,
            MessageRole::User,
            format!("[From external (EXTERNAL)]: {text}"),
        ));

        let orchestrator = Arc::clone(&self.orchestrator);
        let tasks = coordinator.tasks().clone();
        tokio::spawn(async move {
            let outcome = orchestrator.execute(&text).await;
            let Ok(mut tracking_task) = tasks.get(task_id) else {
                return;
            };
            // A cancelled external task must not be resurrected by a run
            // that was already in flight when the cancellation landed.
            if tracking_task.status == TaskStatus::Cancelled {
                return;
            }
            let (status, summary) = match outcome {
                Ok(ExecuteOutcome::Success { completed_tasks, waves }) => (
                    TaskStatus::Completed,
                    format!("{completed_tasks} task(s) completed in {waves} wave(s)"),
                ),
                Ok(ExecuteOutcome::NoTasks) => (
                    TaskStatus::Completed,
                    "ROUTA produced no tasks for this request".to_string(),
                ),
                Ok(ExecuteOutcome::MaxWavesReached) => (
                    TaskStatus::Blocked,
                    "gave up after the wave budget without full verification".to_string(),
                ),
                Ok(ExecuteOutcome::Failed { reason }) => (TaskStatus::Cancelled, reason),
                Err(e) => (TaskStatus::Cancelled, e.to_string()),
            };
            tracking_task.status = status;
            tracking_task.completion_summary = Some(summary);
            tracking_task.updated_at = chrono::Utc::now();
            tasks.save(tracking_task);
        });

        let task = match coordinator.tasks().get(task_id) {
            Ok(task) => task,
            Err(e) => return JsonRpcResponse::error(id, INTERNAL_ERROR, e.to_string()),
        };
        JsonRpcResponse::success(id, task_envelope(&task))
    }

    fn handle_tasks_get(&self, id: Option<Value>, params: Value) -> JsonRpcResponse {
        let Some(task_id) = params
            .get("id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
        else {
            return JsonRpcResponse::error(id, INVALID_PARAMS, "missing or invalid field: id");
        };
        match self.orchestrator.coordinator().tasks().get(task_id) {
            Ok(task) => JsonRpcResponse::success(id, task_envelope(&task)),
            Err(e) => JsonRpcResponse::error(id, INVALID_PARAMS, e.to_string()),
        }
    }

    fn handle_tasks_cancel(&self, id: Option<Value>, params: Value) -> JsonRpcResponse {
        let Some(task_id) = params
            .get("id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
        else {
            return JsonRpcResponse::error(id, INVALID_PARAMS, "missing or invalid field: id");
        };
        let tasks = self.orchestrator.coordinator().tasks();
        let mut task = match tasks.get(task_id) {
            Ok(task) => task,
            Err(e) => return JsonRpcResponse::error(id, INVALID_PARAMS, e.to_string()),
        };
        // Only the store record is marked cancelled here, not the shared
        // orchestrator cancellation flag: that flag is one-shot for the
        // orchestrator's whole lifetime, so tripping it here would also
        // abort every *other* in-flight or future external request this
        // server handles. The spawned run's Cancelled-status guard (see
        // `handle_message_send`) keeps it from overwriting this record once
        // it does finish.
        task.status = TaskStatus::Cancelled;
        task.updated_at = chrono::Utc::now();
        tasks.save(task.clone());
        JsonRpcResponse::success(id, task_envelope(&task))
    }
}

/// The agent-card document returned by the discovery endpoint.
pub fn agent_card(name: &str, description: &str) -> Value {
    json!({
        "name": name,
        "description": description,
        "version": env!("CARGO_PKG_VERSION"),
        "capabilities": {
            "streaming": false,
            "pushNotifications": false,
        },
        "skills": [
            { "id": "orchestrate", "name": "Orchestrate a multi-agent task", "tags": ["planning", "execution", "verification"] }
        ],
        "provider": { "organization": "forgewave" },
        "interfaces": [
            { "transport": "JSONRPC", "methods": ["message/send", "tasks/get", "tasks/cancel"] }
        ],
    })
}

pub type SharedConversations = Arc<ConversationStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use forgewave_agent::{AgentProvider, AgentProviderConfig, EchoProvider, ToolRegistry};
    use forgewave_coordinator::{Coordinator, OrchestratorConfig};
    use forgewave_kernel::{AgentStore, EventBus, TaskStore};

    /// Builds a server whose ROUTA/CRAFTER/GATE providers all echo fixed
    /// text, so `execute()` reaches a deterministic outcome without a real
    /// model transport. `_dir` must stay alive for the orchestrator's
    /// workspace root.
    fn new_server(routa_text: &str, crafter_text: &str, gate_text: &str) -> (A2aServer, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = Coordinator::new(
            "ws1",
            AgentStore::new(),
            TaskStore::new(),
            ConversationStore::new(),
            EventBus::new(64),
            1,
        );
        let make_provider = |text: &str| {
            Arc::new(AgentProvider::new(
                Arc::new(EchoProvider::new(text)),
                ToolRegistry::with_builtins(),
                AgentProviderConfig::default(),
            ))
        };
        let orchestrator = Orchestrator::new(
            coordinator,
            make_provider(routa_text),
            make_provider(crafter_text),
            make_provider(gate_text),
            OrchestratorConfig { max_waves: 3, max_parallelism: 1 },
            dir.path().to_path_buf(),
        );
        (A2aServer::new(Arc::new(orchestrator)), dir)
    }

    const SINGLE_TASK_PLAN: &str = "\
@@@task
# Add README
## Objective
Document the project
## Definition of Done
- README exists
@@@
";

    fn text_message(text: &str) -> Value {
        json!({
            "role": "user",
            "messageId": Uuid::now_v7().to_string(),
            "parts": [{ "type": "text", "text": text }],
        })
    }

    fn request(method: &str, params: Value) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".into(),
            id: Some(json!(1)),
            method: method.to_string(),
            params,
        }
    }

    /// Poll `tasks/get` until the task leaves `submitted`/`working`, yielding
    /// between attempts so the background `execute()` spawned by
    /// `message/send` gets a chance to run on this test's current-thread
    /// runtime.
    async fn wait_for_terminal(server: &A2aServer, task_id: Value) -> Value {
        for _ in 0..1000 {
            let resp = server
                .handle_request(request("tasks/get", json!({ "id": task_id })))
                .await;
            let result = resp.result.unwrap();
            let state = result["status"]["state"].as_str().unwrap().to_string();
            if state != "submitted" && state != "working" {
                return result;
            }
            tokio::task::yield_now().await;
        }
        panic!("task {task_id} never left submitted/working");
    }

    #[tokio::test]
    async fn message_send_creates_submitted_task() {
        let (server, _dir) = new_server(SINGLE_TASK_PLAN, "Added README", "\u{2705} APPROVED");
        let resp = server
            .handle_request(request("message/send", json!({ "message": text_message("hello") })))
            .await;
        assert!(resp.error.is_none());
        let result = resp.result.unwrap();
        assert_eq!(result["status"]["state"], "submitted");
    }

    #[tokio::test]
    async fn message_send_drives_execution_to_completion() {
        let (server, _dir) = new_server(
            SINGLE_TASK_PLAN,
            "Added README\nAll tests pass",
            "\u{2705} APPROVED",
        );
        let send_resp = server
            .handle_request(request("message/send", json!({ "message": text_message("add a README") })))
            .await;
        let task_id = send_resp.result.unwrap()["id"].clone();

        let result = wait_for_terminal(&server, task_id).await;
        assert_eq!(result["status"]["state"], "completed");
        assert!(!result["artifacts"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn full_send_get_cancel_round_trip() {
        let (server, _dir) = new_server(SINGLE_TASK_PLAN, "Added README", "\u{2705} APPROVED");
        let send_resp = server
            .handle_request(request("message/send", json!({ "message": text_message("hello") })))
            .await;
        let task_id = send_resp.result.unwrap()["id"].clone();

        let get_resp = server
            .handle_request(request("tasks/get", json!({ "id": task_id })))
            .await;
        assert_eq!(get_resp.result.unwrap()["status"]["state"], "submitted");

        let cancel_resp = server
            .handle_request(request("tasks/cancel", json!({ "id": task_id })))
            .await;
        assert_eq!(cancel_resp.result.unwrap()["status"]["state"], "canceled");

        // Let the in-flight background run finish; the cancelled-status
        // guard in `handle_message_send` must keep it from clobbering the
        // cancellation this test just recorded.
        for _ in 0..1000 {
            tokio::task::yield_now().await;
        }
        let final_get = server
            .handle_request(request("tasks/get", json!({ "id": task_id })))
            .await;
        assert_eq!(final_get.result.unwrap()["status"]["state"], "canceled");
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let (server, _dir) = new_server(SINGLE_TASK_PLAN, "Added README", "\u{2705} APPROVED");
        let resp = server.handle_request(request("nonexistent/method", json!(null))).await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn message_send_without_text_part_is_invalid_params() {
        let (server, _dir) = new_server(SINGLE_TASK_PLAN, "Added README", "\u{2705} APPROVED");
        let resp = server
            .handle_request(request("message/send", json!({ "message": { "parts": [] } })))
            .await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn tasks_get_unknown_id_is_invalid_params() {
        let (server, _dir) = new_server(SINGLE_TASK_PLAN, "Added README", "\u{2705} APPROVED");
        let resp = server
            .handle_request(request("tasks/get", json!({ "id": Uuid::now_v7().to_string() })))
            .await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, INVALID_PARAMS);
    }

    #[test]
    fn status_mapping_covers_every_internal_status() {
        assert!(matches!(map_task_status(TaskStatus::Pending), ExternalTaskState::Submitted));
        assert!(matches!(map_task_status(TaskStatus::InProgress), ExternalTaskState::Working));
        assert!(matches!(map_task_status(TaskStatus::ReviewRequired), ExternalTaskState::Working));
        assert!(matches!(map_task_status(TaskStatus::NeedsFix), ExternalTaskState::Working));
        assert!(matches!(map_task_status(TaskStatus::Completed), ExternalTaskState::Completed));
        assert!(matches!(map_task_status(TaskStatus::Cancelled), ExternalTaskState::Canceled));
        assert!(matches!(map_task_status(TaskStatus::Blocked), ExternalTaskState::InputRequired));
    }
}
