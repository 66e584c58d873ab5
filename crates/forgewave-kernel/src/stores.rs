//! In-memory entity stores: [`AgentStore`], [`TaskStore`], [`ConversationStore`].
//!
//! Grounded in the donor kernel's `DashMap`-backed adapter registry: each
//! store is an `Arc`-wrapped, cheaply `Clone`-able handle over a concurrent
//! map, accessors return value snapshots, and `DashMap`'s per-shard locking
//! gives the "writes serialized per entity" invariant for free. There is
//! deliberately no persistence layer here — durable backends are a pluggable
//! concern outside this crate.

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{KernelError, Result};
use crate::types::{Agent, AgentStatus, Message, Task, TaskStatus, WorkspaceId};

// ---------------------------------------------------------------------------
// AgentStore
// ---------------------------------------------------------------------------

/// In-memory store of [`Agent`] records.
#[derive(Clone, Default)]
pub struct AgentStore {
    agents: Arc<DashMap<Uuid, Agent>>,
}

impl AgentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite an agent record (last-writer-wins).
    pub fn save(&self, agent: Agent) {
        self.agents.insert(agent.id, agent);
    }

    /// Fetch a snapshot of one agent.
    pub fn get(&self, id: Uuid) -> Result<Agent> {
        self.agents
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(KernelError::AgentNotFound { agent_id: id })
    }

    /// Snapshot of every agent in a workspace, in no particular order.
    pub fn list_by_workspace(&self, workspace_id: &str) -> Vec<Agent> {
        self.agents
            .iter()
            .filter(|entry| entry.value().workspace_id == workspace_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Transition an agent's status, rejecting transitions out of a terminal
    /// state (COMPLETED/ERROR/CANCELLED may never transition back).
    pub fn update_status(&self, id: Uuid, new_status: AgentStatus) -> Result<Agent> {
        let mut entry = self
            .agents
            .get_mut(&id)
            .ok_or(KernelError::AgentNotFound { agent_id: id })?;
        if entry.status.is_terminal() && entry.status != new_status {
            return Err(KernelError::InvalidTransition {
                entity: "agent",
                id,
                from: format!("{:?}", entry.status),
                to: format!("{new_status:?}"),
            });
        }
        entry.status = new_status;
        entry.updated_at = chrono::Utc::now();
        Ok(entry.clone())
    }
}

// ---------------------------------------------------------------------------
// TaskStore
// ---------------------------------------------------------------------------

/// In-memory store of [`Task`] records.
#[derive(Clone, Default)]
pub struct TaskStore {
    tasks: Arc<DashMap<Uuid, Task>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a task record (last-writer-wins).
    pub fn save(&self, task: Task) {
        self.tasks.insert(task.id, task);
    }

    /// Fetch a snapshot of one task.
    pub fn get(&self, id: Uuid) -> Result<Task> {
        self.tasks
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(KernelError::TaskNotFound { task_id: id })
    }

    /// Snapshot of every task in a workspace.
    pub fn list_by_workspace(&self, workspace_id: &str) -> Vec<Task> {
        self.tasks
            .iter()
            .filter(|entry| entry.value().workspace_id == workspace_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Snapshot of tasks in a workspace with a given status.
    pub fn list_by_status(&self, workspace_id: &str, status: TaskStatus) -> Vec<Task> {
        self.list_by_workspace(workspace_id)
            .into_iter()
            .filter(|task| task.status == status)
            .collect()
    }

    /// The set of tasks in `workspace_id` that are PENDING and whose
    /// dependencies are all COMPLETED.
    pub fn ready_tasks(&self, workspace_id: &str) -> Vec<Task> {
        let all = self.list_by_workspace(workspace_id);
        all.iter()
            .filter(|task| {
                task.status == TaskStatus::Pending
                    && task.dependencies.iter().all(|dep_id| {
                        all.iter()
                            .find(|candidate| candidate.id == *dep_id)
                            .map(|dep| dep.status == TaskStatus::Completed)
                            .unwrap_or(false)
                    })
            })
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// ConversationStore
// ---------------------------------------------------------------------------

/// Append-only per-agent conversation log.
#[derive(Clone, Default)]
pub struct ConversationStore {
    conversations: Arc<DashMap<Uuid, Vec<Message>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, assigning a monotonically increasing `turn` for
    /// this agent if the message did not already carry one. Returns the
    /// stored message (with its resolved `turn`).
    pub fn append(&self, mut message: Message) -> Message {
        let mut conversation = self.conversations.entry(message.agent_id).or_default();
        if message.turn.is_none() {
            let next_turn = conversation.last().and_then(|m| m.turn).map_or(0, |t| t + 1);
            message.turn = Some(next_turn);
        }
        conversation.push(message.clone());
        message
    }

    /// Full conversation for an agent, in append order.
    pub fn get_conversation(&self, agent_id: Uuid) -> Vec<Message> {
        self.conversations
            .get(&agent_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// The last `n` messages for an agent, in append order.
    pub fn get_last_n(&self, agent_id: Uuid, n: usize) -> Vec<Message> {
        let conversation = self.get_conversation(agent_id);
        let start = conversation.len().saturating_sub(n);
        conversation[start..].to_vec()
    }

    /// Messages for an agent whose `turn` falls in `[start_turn, end_turn]`.
    pub fn get_by_turn_range(&self, agent_id: Uuid, start_turn: u64, end_turn: u64) -> Vec<Message> {
        self.get_conversation(agent_id)
            .into_iter()
            .filter(|m| matches!(m.turn, Some(t) if t >= start_turn && t <= end_turn))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentRole, MessageRole};

    #[test]
    fn agent_store_roundtrip() {
        let store = AgentStore::new();
        let agent = Agent::routa("ws1", "routa-1");
        let id = agent.id;
        store.save(agent);
        let fetched = store.get(id).unwrap();
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.role, AgentRole::Routa);
    }

    #[test]
    fn agent_store_missing_is_not_found() {
        let store = AgentStore::new();
        assert!(store.get(Uuid::now_v7()).is_err());
    }

    #[test]
    fn agent_store_rejects_transition_out_of_terminal() {
        let store = AgentStore::new();
        let agent = Agent::routa("ws1", "routa-1");
        let id = agent.id;
        store.save(agent);
        store.update_status(id, AgentStatus::Completed).unwrap();
        let result = store.update_status(id, AgentStatus::Active);
        assert!(result.is_err());
    }

    #[test]
    fn task_store_ready_tasks_respects_dependencies() {
        let store = TaskStore::new();
        let mut t1 = Task::new("ws1", "T1", "obj", "scope");
        t1.status = TaskStatus::Completed;
        let mut t2 = Task::new("ws1", "T2", "obj", "scope");
        t2.dependencies = vec![t1.id];
        let t1_id = t1.id;
        store.save(t1);
        store.save(t2);

        let ready = store.ready_tasks("ws1");
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].dependencies, vec![t1_id]);
    }

    #[test]
    fn task_store_blocks_unready_dependency() {
        let store = TaskStore::new();
        let t1 = Task::new("ws1", "T1", "obj", "scope");
        let mut t2 = Task::new("ws1", "T2", "obj", "scope");
        t2.dependencies = vec![t1.id];
        store.save(t1);
        store.save(t2);

        assert!(store.ready_tasks("ws1").is_empty());
    }

    #[test]
    fn conversation_store_assigns_monotonic_turns() {
        let store = ConversationStore::new();
        let agent_id = Uuid::now_v7();
        store.append(Message::new(agent_id, MessageRole::User, "hello"));
        store.append(Message::new(agent_id, MessageRole::Assistant, "hi"));

        let conversation = store.get_conversation(agent_id);
        assert_eq!(conversation[0].turn, Some(0));
        assert_eq!(conversation[1].turn, Some(1));
    }

    #[test]
    fn conversation_store_get_last_n() {
        let store = ConversationStore::new();
        let agent_id = Uuid::now_v7();
        for i in 0..5 {
            store.append(Message::new(agent_id, MessageRole::User, format!("msg{i}")));
        }
        let last_two = store.get_last_n(agent_id, 2);
        assert_eq!(last_two.len(), 2);
        assert_eq!(last_two[0].content, "msg3");
        assert_eq!(last_two[1].content, "msg4");
    }

    #[test]
    fn conversation_store_get_by_turn_range() {
        let store = ConversationStore::new();
        let agent_id = Uuid::now_v7();
        for i in 0..5 {
            store.append(Message::new(agent_id, MessageRole::User, format!("msg{i}")));
        }
        let middle = store.get_by_turn_range(agent_id, 1, 3);
        assert_eq!(middle.len(), 3);
        assert_eq!(middle[0].content, "msg1");
        assert_eq!(middle[2].content, "msg3");
    }
}
