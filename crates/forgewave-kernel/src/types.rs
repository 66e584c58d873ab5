//! Entity types shared by the stores and the event bus: workspaces, agents,
//! tasks, messages, and the coordination-phase snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A scoping identifier. All entities belong to exactly one workspace; the
/// coordinator processes one orchestration at a time per workspace.
pub type WorkspaceId = String;

/// The role an [`Agent`] plays in an orchestration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentRole {
    /// The planning agent; consumes the user request and emits `@@@task` blocks.
    Routa,
    /// A worker agent assigned to exactly one task per run.
    Crafter,
    /// The verification agent that judges REVIEW_REQUIRED tasks.
    Gate,
}

/// Lifecycle status of an [`Agent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentStatus {
    Pending,
    Active,
    Completed,
    Error,
    Cancelled,
}

impl AgentStatus {
    /// Whether this status may not change further by normal operations.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }
}

/// Relative capability/cost tier requested for the model backing an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModelTier {
    Smart,
    Fast,
}

/// An LLM-backed participant in an orchestration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub workspace_id: WorkspaceId,
    pub role: AgentRole,
    pub status: AgentStatus,
    /// CRAFTER/GATE agents must carry a parent; ROUTA must not.
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub model_tier: ModelTier,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// Construct a new ROUTA agent (no parent).
    pub fn routa(workspace_id: impl Into<WorkspaceId>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            workspace_id: workspace_id.into(),
            role: AgentRole::Routa,
            status: AgentStatus::Pending,
            parent_id: None,
            name: name.into(),
            model_tier: ModelTier::Smart,
            created_at: now,
            updated_at: now,
        }
    }

    /// Construct a new CRAFTER or GATE agent parented by `parent_id`.
    pub fn child(
        workspace_id: impl Into<WorkspaceId>,
        name: impl Into<String>,
        role: AgentRole,
        parent_id: Uuid,
        model_tier: ModelTier,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            workspace_id: workspace_id.into(),
            role,
            status: AgentStatus::Pending,
            parent_id: Some(parent_id),
            name: name.into(),
            model_tier,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Lifecycle status of a [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    ReviewRequired,
    NeedsFix,
    Completed,
    Blocked,
    Cancelled,
}

/// The verdict a GATE agent reaches for a REVIEW_REQUIRED task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerificationVerdict {
    Approved,
    NotApproved,
    Blocked,
}

/// One unit of planned work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub workspace_id: WorkspaceId,
    pub title: String,
    pub objective: String,
    pub scope: String,
    pub acceptance_criteria: Vec<String>,
    pub verification_commands: Vec<String>,
    pub status: TaskStatus,
    pub assigned_to: Option<Uuid>,
    pub completion_summary: Option<String>,
    pub verification_report: Option<String>,
    pub verification_verdict: Option<VerificationVerdict>,
    pub dependencies: Vec<Uuid>,
    /// Tasks sharing a `parallel_group` may run concurrently, subject to
    /// `dependencies`. `dependencies` is authoritative for readiness;
    /// `parallel_group` is only a hint for picking among the ready set.
    pub parallel_group: i64,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Construct a new PENDING task in `workspace_id` with no assignment.
    pub fn new(
        workspace_id: impl Into<WorkspaceId>,
        title: impl Into<String>,
        objective: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            workspace_id: workspace_id.into(),
            title: title.into(),
            objective: objective.into(),
            scope: scope.into(),
            acceptance_criteria: Vec::new(),
            verification_commands: Vec::new(),
            status: TaskStatus::Pending,
            assigned_to: None,
            completion_summary: None,
            verification_report: None,
            verification_verdict: None,
            dependencies: Vec::new(),
            parallel_group: 0,
            updated_at: Utc::now(),
        }
    }

    /// A task is ready iff it is PENDING and every dependency is COMPLETED,
    /// evaluated against a snapshot of its dependencies' statuses.
    pub fn is_ready(&self, dependency_statuses: &[TaskStatus]) -> bool {
        self.status == TaskStatus::Pending
            && dependency_statuses
                .iter()
                .all(|status| *status == TaskStatus::Completed)
    }
}

/// The role of a participant in an agent's conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

/// One append-only entry in an agent's conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Monotonic per-agent sequence number, assigned at append time if absent.
    pub turn: Option<u64>,
}

impl Message {
    /// Construct a message without a pre-assigned turn; the store assigns one.
    pub fn new(agent_id: Uuid, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            agent_id,
            role,
            content: content.into(),
            timestamp: Utc::now(),
            turn: None,
        }
    }
}

/// A worker or verifier's self-report, consumed by `report_to_parent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionReport {
    pub agent_id: Uuid,
    pub task_id: Uuid,
    pub summary: String,
    pub files_modified: Vec<String>,
    /// Ordered pairs of (command, result) from running `verification_commands`.
    pub verification_results: Vec<(String, String)>,
    pub success: bool,
}

/// The phases of one workspace's orchestration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoordinationPhase {
    Idle,
    Planning,
    Ready,
    Executing,
    WaveComplete,
    Verifying,
    NeedsFix,
    Completed,
    Failed,
}

/// Singleton coordination state tracked per workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationState {
    pub workspace_id: WorkspaceId,
    pub phase: CoordinationPhase,
    pub current_wave: u32,
    pub active_task_ids: Vec<Uuid>,
    pub routa_agent_id: Option<Uuid>,
    pub gate_agent_id: Option<Uuid>,
}

impl CoordinationState {
    pub fn new(workspace_id: impl Into<WorkspaceId>) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            phase: CoordinationPhase::Idle,
            current_wave: 1,
            active_task_ids: Vec::new(),
            routa_agent_id: None,
            gate_agent_id: None,
        }
    }
}
