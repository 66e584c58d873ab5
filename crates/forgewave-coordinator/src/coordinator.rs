//! Coordinator State Machine (C8).
//!
//! Grounded in the donor orchestrator's `Scheduler` (phase-bearing state
//! struct behind a lock, mutated by small focused methods) but the phase
//! vocabulary and transition rules are this system's own wave/verification
//! cycle. Verdict reconciliation is deliberately **store-based**: it reads
//! task status snapshots rather than trusting event-bus delivery order,
//! since tool-call side effects and orchestrator polling are concurrent and
//! events may arrive out of order relative to a store write.

use std::sync::{Arc, Mutex};

use forgewave_agent::{parse_plan, TaskSpec};
use forgewave_kernel::{
    Agent, AgentRole, AgentStatus, AgentStore, ConversationStore, CoordinationPhase,
    CoordinationState, Event, EventBus, ModelTier, Task, TaskStatus, TaskStore, WorkspaceId,
};
use uuid::Uuid;

use crate::error::{CoordinatorError, Result};

/// Minimum number of trailing conversation messages included in a CRAFTER's
/// conversation excerpt when building a GATE's review context.
const GATE_CONTEXT_RECENT_MESSAGES: usize = 5;

/// Snapshot of one task for status-reporting callers.
#[derive(Debug, Clone)]
pub struct TaskSummary {
    pub id: Uuid,
    pub title: String,
    pub status: TaskStatus,
    pub verdict: Option<forgewave_kernel::VerificationVerdict>,
}

/// Coordinates one workspace's orchestration: owns no agent-running logic
/// itself (that is [`crate::driver::Orchestrator`]'s job), only the phase
/// machine and the store mutations each phase transition implies.
#[derive(Clone)]
pub struct Coordinator {
    workspace_id: WorkspaceId,
    agents: AgentStore,
    tasks: TaskStore,
    conversations: ConversationStore,
    events: EventBus,
    state: Arc<Mutex<CoordinationState>>,
    max_parallelism: u32,
}

impl Coordinator {
    pub fn new(
        workspace_id: impl Into<WorkspaceId>,
        agents: AgentStore,
        tasks: TaskStore,
        conversations: ConversationStore,
        events: EventBus,
        max_parallelism: u32,
    ) -> Self {
        let workspace_id = workspace_id.into();
        Self {
            state: Arc::new(Mutex::new(CoordinationState::new(workspace_id.clone()))),
            workspace_id,
            agents,
            tasks,
            conversations,
            events,
            max_parallelism: max_parallelism.clamp(1, 5),
        }
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn agents(&self) -> &AgentStore {
        &self.agents
    }

    pub fn tasks(&self) -> &TaskStore {
        &self.tasks
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn phase(&self) -> CoordinationPhase {
        self.state.lock().expect("coordination state poisoned").phase
    }

    /// Create the ROUTA agent for this workspace if one does not already
    /// exist, and move to PLANNING.
    pub fn initialize(&self) -> Uuid {
        let mut state = self.state.lock().expect("coordination state poisoned");
        if let Some(id) = state.routa_agent_id {
            return id;
        }
        let routa = Agent::routa(&self.workspace_id, "routa-1");
        let routa_id = routa.id;
        self.agents.save(routa);
        self.events.emit(Event::AgentCreated {
            agent_id: routa_id,
            workspace_id: self.workspace_id.clone(),
            timestamp: chrono::Utc::now(),
        });
        state.routa_agent_id = Some(routa_id);
        state.phase = CoordinationPhase::Planning;
        routa_id
    }

    /// Parse `plan_text` into tasks, persist them PENDING, and move to
    /// READY. Returns task IDs in parse order, empty if the plan named no
    /// tasks (the phase still advances to READY either way).
    ///
    /// The `@@@task` grammar carries no `parallelGroup`/`dependencies`
    /// fields (C3 only extracts title/objective/scope/criteria/commands), so
    /// every task parsed from one plan defaults to `parallel_group = 0`
    /// (the same default `Task::new` would give) — a flat, fully-parallel
    /// batch unless a future dependency-aware planner sets otherwise.
    pub fn register_tasks(&self, plan_text: &str) -> Vec<Uuid> {
        let specs: Vec<TaskSpec> = parse_plan(plan_text);
        let mut ids = Vec::with_capacity(specs.len());
        for spec in specs {
            let mut task = Task::new(&self.workspace_id, spec.title, spec.objective, spec.scope);
            task.acceptance_criteria = spec.acceptance_criteria;
            task.verification_commands = spec.verification_commands;
            ids.push(task.id);
            self.tasks.save(task);
        }
        self.state.lock().expect("coordination state poisoned").phase = CoordinationPhase::Ready;
        ids
    }

    /// Pick the lowest `parallelGroup` with ready tasks, delegate up to
    /// `maxParallelism` of them to freshly created CRAFTER agents, and move
    /// to EXECUTING. Returns `(crafterId, taskId)` pairs in assignment order.
    pub fn execute_next_wave(&self) -> Result<Vec<(Uuid, Uuid)>> {
        let routa_id = self
            .state
            .lock()
            .expect("coordination state poisoned")
            .routa_agent_id
            .ok_or(CoordinatorError::MissingRouta)?;

        let ready = self.tasks.ready_tasks(&self.workspace_id);
        let Some(min_group) = ready.iter().map(|t| t.parallel_group).min() else {
            return Ok(Vec::new());
        };
        let picked: Vec<Task> = ready
            .into_iter()
            .filter(|t| t.parallel_group == min_group)
            .take(self.max_parallelism as usize)
            .collect();

        let mut pairs = Vec::with_capacity(picked.len());
        for mut task in picked {
            let crafter = Agent::child(
                &self.workspace_id,
                format!("crafter-{}", &task.id.to_string()[..8]),
                AgentRole::Crafter,
                routa_id,
                ModelTier::Fast,
            );
            self.agents.save(crafter.clone());
            self.agents
                .update_status(crafter.id, AgentStatus::Active)?;

            let old_status = task.status;
            task.assigned_to = Some(crafter.id);
            task.status = TaskStatus::InProgress;
            task.updated_at = chrono::Utc::now();
            self.tasks.save(task.clone());

            self.events.emit(Event::TaskDelegated {
                task_id: task.id,
                agent_id: crafter.id,
                timestamp: chrono::Utc::now(),
            });
            self.events.emit(Event::TaskStatusChanged {
                task_id: task.id,
                old_status,
                new_status: TaskStatus::InProgress,
                timestamp: chrono::Utc::now(),
            });

            pairs.push((crafter.id, task.id));
        }

        self.state.lock().expect("coordination state poisoned").phase = CoordinationPhase::Executing;
        Ok(pairs)
    }

    /// If any task is REVIEW_REQUIRED, create a GATE agent and move to
    /// VERIFYING. Returns `None` (no phase change) when nothing needs review.
    pub fn start_verification(&self) -> Result<Option<Uuid>> {
        let routa_id = self
            .state
            .lock()
            .expect("coordination state poisoned")
            .routa_agent_id
            .ok_or(CoordinatorError::MissingRouta)?;

        let review_tasks = self
            .tasks
            .list_by_status(&self.workspace_id, TaskStatus::ReviewRequired);
        if review_tasks.is_empty() {
            return Ok(None);
        }

        let gate = Agent::child(
            &self.workspace_id,
            "gate-1",
            AgentRole::Gate,
            routa_id,
            ModelTier::Smart,
        );
        self.agents.save(gate.clone());
        self.agents.update_status(gate.id, AgentStatus::Active)?;

        let mut state = self.state.lock().expect("coordination state poisoned");
        state.phase = CoordinationPhase::Verifying;
        state.gate_agent_id = Some(gate.id);
        Ok(Some(gate.id))
    }

    /// Build the agent-facing prompt context for a CRAFTER (its assigned
    /// task) or a GATE (every REVIEW_REQUIRED task plus the crafter's recent
    /// conversation). Returns `None` for a CRAFTER with no assignment.
    pub fn build_agent_context(&self, agent_id: Uuid) -> Result<Option<String>> {
        let agent = self.agents.get(agent_id)?;
        match agent.role {
            AgentRole::Routa => Ok(None),
            AgentRole::Crafter => {
                let task = self
                    .tasks
                    .list_by_workspace(&self.workspace_id)
                    .into_iter()
                    .find(|t| t.assigned_to == Some(agent_id));
                Ok(task.map(|task| crafter_context(&task)))
            }
            AgentRole::Gate => {
                let review_tasks = self
                    .tasks
                    .list_by_status(&self.workspace_id, TaskStatus::ReviewRequired);
                if review_tasks.is_empty() {
                    return Ok(None);
                }
                let mut sections = Vec::with_capacity(review_tasks.len());
                for task in &review_tasks {
                    let crafter_messages = task
                        .assigned_to
                        .map(|crafter_id| {
                            self.conversations
                                .get_last_n(crafter_id, GATE_CONTEXT_RECENT_MESSAGES)
                        })
                        .unwrap_or_default();
                    sections.push(gate_context_section(task, &crafter_messages));
                }
                Ok(Some(sections.join("\n\n")))
            }
        }
    }

    /// Snapshot of every task's ID, title, status, and verdict.
    pub fn get_task_summary(&self) -> Vec<TaskSummary> {
        self.tasks
            .list_by_workspace(&self.workspace_id)
            .into_iter()
            .map(|task| TaskSummary {
                id: task.id,
                title: task.title,
                status: task.status,
                verdict: task.verification_verdict,
            })
            .collect()
    }

    /// Reconcile phase against current store state after a wave +
    /// verification round. COMPLETED is terminal once reached; a NEEDS_FIX
    /// task resets to PENDING and the phase returns to EXECUTING so the next
    /// wave can pick it back up.
    pub fn reconcile(&self) -> CoordinationPhase {
        let tasks = self.tasks.list_by_workspace(&self.workspace_id);
        let mut state = self.state.lock().expect("coordination state poisoned");

        if !tasks.is_empty() && tasks.iter().all(|t| t.status == TaskStatus::Completed) {
            state.phase = CoordinationPhase::Completed;
            return state.phase;
        }

        let needs_fix: Vec<Task> = tasks
            .into_iter()
            .filter(|t| t.status == TaskStatus::NeedsFix)
            .collect();
        if !needs_fix.is_empty() {
            for mut task in needs_fix {
                task.status = TaskStatus::Pending;
                task.assigned_to = None;
                task.updated_at = chrono::Utc::now();
                self.tasks.save(task);
            }
            state.phase = CoordinationPhase::Executing;
            return state.phase;
        }

        state.phase
    }
}

fn crafter_context(task: &Task) -> String {
    let mut out = format!(
        "You are a CRAFTER agent. Complete the following task.\n\n# {}\n\n## Objective\n{}\n\n## Scope\n{}",
        task.title, task.objective, task.scope
    );
    if !task.acceptance_criteria.is_empty() {
        out.push_str("\n\n## Definition of Done\n");
        for item in &task.acceptance_criteria {
            out.push_str(&format!("- {item}\n"));
        }
    }
    if !task.verification_commands.is_empty() {
        out.push_str("\n## Verification\n");
        for item in &task.verification_commands {
            out.push_str(&format!("- {item}\n"));
        }
    }
    out
}

fn gate_context_section(task: &Task, crafter_messages: &[forgewave_kernel::Message]) -> String {
    let mut out = format!(
        "# Review: {}\n\n## Objective\n{}\n\n## Acceptance Criteria\n",
        task.title, task.objective
    );
    for item in &task.acceptance_criteria {
        out.push_str(&format!("- {item}\n"));
    }
    if let Some(summary) = &task.completion_summary {
        out.push_str(&format!("\n## Crafter Report\n{summary}\n"));
    }
    if !crafter_messages.is_empty() {
        out.push_str("\n## Recent Crafter Conversation\n");
        for message in crafter_messages {
            out.push_str(&format!("[{:?}] {}\n", message.role, message.content));
        }
    }
    if !task.verification_commands.is_empty() {
        out.push_str("\n## Verification Commands\n");
        for item in &task.verification_commands {
            out.push_str(&format!("- {item}\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_coordinator(max_parallelism: u32) -> Coordinator {
        Coordinator::new(
            "ws1",
            AgentStore::new(),
            TaskStore::new(),
            ConversationStore::new(),
            EventBus::new(64),
            max_parallelism,
        )
    }

    const PLAN: &str = "\
@@@task
# Add README
## Objective
Document the project
## Definition of Done
- README exists
@@@
";

    #[test]
    fn initialize_is_idempotent() {
        let coordinator = new_coordinator(1);
        let first = coordinator.initialize();
        let second = coordinator.initialize();
        assert_eq!(first, second);
        assert_eq!(coordinator.agents.list_by_workspace("ws1").len(), 1);
    }

    #[test]
    fn register_tasks_yields_pending_unassigned_tasks() {
        let coordinator = new_coordinator(1);
        coordinator.initialize();
        let ids = coordinator.register_tasks(PLAN);
        assert_eq!(ids.len(), 1);
        let task = coordinator.tasks.get(ids[0]).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.assigned_to.is_none());
        assert_eq!(coordinator.phase(), CoordinationPhase::Ready);
    }

    #[test]
    fn register_tasks_with_zero_tasks_still_reaches_ready() {
        let coordinator = new_coordinator(1);
        coordinator.initialize();
        let ids = coordinator.register_tasks("no tasks in this text");
        assert!(ids.is_empty());
        assert_eq!(coordinator.phase(), CoordinationPhase::Ready);
    }

    #[test]
    fn execute_next_wave_delegates_ready_tasks_and_no_two_share_assignee() {
        let coordinator = new_coordinator(5);
        coordinator.initialize();
        coordinator.register_tasks(
            "@@@task\n# T1\n## Objective\nA\n@@@\n@@@task\n# T2\n## Objective\nB\n@@@\n",
        );
        let pairs = coordinator.execute_next_wave().unwrap();
        assert_eq!(pairs.len(), 2);
        let crafters: std::collections::HashSet<Uuid> = pairs.iter().map(|(c, _)| *c).collect();
        assert_eq!(crafters.len(), 2);
        for (_, task_id) in &pairs {
            assert_eq!(coordinator.tasks.get(*task_id).unwrap().status, TaskStatus::InProgress);
        }
    }

    #[test]
    fn execute_next_wave_respects_max_parallelism() {
        let coordinator = new_coordinator(1);
        coordinator.initialize();
        coordinator.register_tasks(
            "@@@task\n# T1\n## Objective\nA\n@@@\n@@@task\n# T2\n## Objective\nB\n@@@\n",
        );
        let pairs = coordinator.execute_next_wave().unwrap();
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn execute_next_wave_with_no_ready_tasks_returns_empty() {
        let coordinator = new_coordinator(1);
        coordinator.initialize();
        let pairs = coordinator.execute_next_wave().unwrap();
        assert!(pairs.is_empty());
    }

    #[test]
    fn start_verification_returns_none_when_nothing_needs_review() {
        let coordinator = new_coordinator(1);
        coordinator.initialize();
        coordinator.register_tasks(PLAN);
        assert!(coordinator.start_verification().unwrap().is_none());
    }

    #[test]
    fn start_verification_creates_gate_when_review_required() {
        let coordinator = new_coordinator(1);
        coordinator.initialize();
        let ids = coordinator.register_tasks(PLAN);
        let mut task = coordinator.tasks.get(ids[0]).unwrap();
        task.status = TaskStatus::ReviewRequired;
        coordinator.tasks.save(task);

        let gate_id = coordinator.start_verification().unwrap();
        assert!(gate_id.is_some());
        assert_eq!(coordinator.phase(), CoordinationPhase::Verifying);
    }

    #[test]
    fn reconcile_resets_needs_fix_tasks_to_pending() {
        let coordinator = new_coordinator(1);
        coordinator.initialize();
        let ids = coordinator.register_tasks(PLAN);
        let mut task = coordinator.tasks.get(ids[0]).unwrap();
        task.status = TaskStatus::NeedsFix;
        task.assigned_to = Some(Uuid::now_v7());
        coordinator.tasks.save(task);

        let phase = coordinator.reconcile();
        assert_eq!(phase, CoordinationPhase::Executing);
        let task = coordinator.tasks.get(ids[0]).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.assigned_to.is_none());
    }

    #[test]
    fn reconcile_reaches_completed_when_all_tasks_done() {
        let coordinator = new_coordinator(1);
        coordinator.initialize();
        let ids = coordinator.register_tasks(PLAN);
        let mut task = coordinator.tasks.get(ids[0]).unwrap();
        task.status = TaskStatus::Completed;
        coordinator.tasks.save(task);

        assert_eq!(coordinator.reconcile(), CoordinationPhase::Completed);
    }

    #[test]
    fn build_agent_context_for_crafter_includes_task_details() {
        let coordinator = new_coordinator(1);
        coordinator.initialize();
        let ids = coordinator.register_tasks(PLAN);
        let pairs = coordinator.execute_next_wave().unwrap();
        let (crafter_id, _) = pairs[0];
        assert_eq!(ids[0], pairs[0].1);

        let context = coordinator.build_agent_context(crafter_id).unwrap().unwrap();
        assert!(context.contains("Add README"));
        assert!(context.contains("README exists"));
    }
}
