//! Orchestrator Driver (C9): runs one full `execute(userRequest)` pass.
//!
//! Grounded in the donor `Orchestrator`'s worker-handle/dispatch-loop shape
//! (`orchestrator.rs`) — a `Vec` of spawned workers collected against a
//! result channel — generalized from a flat pool of generic workers to a
//! wave-bounded driver that pulls CRAFTER/GATE assignments from the
//! [`Coordinator`] state machine and runs each through an
//! [`forgewave_agent::AgentProvider`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use forgewave_agent::{AgentProvider, ToolContext};
use forgewave_kernel::{AgentStatus, Message, MessageRole, TaskStatus, VerificationVerdict};
use regex::Regex;
use uuid::Uuid;

use crate::coordinator::Coordinator;
use crate::error::Result;

/// Tunables for one [`Orchestrator::execute`] run.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Upper bound on wave iterations; correctness is wave-count-bounded
    /// rather than time-bounded.
    pub max_waves: u32,
    /// Tasks sharing the picked parallel group run concurrently up to this
    /// many at once, clamped to `[1, 5]`.
    pub max_parallelism: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_waves: 3,
            max_parallelism: 1,
        }
    }
}

/// The tagged result of one `execute` call.
#[derive(Debug, Clone)]
pub enum ExecuteOutcome {
    Success { completed_tasks: usize, waves: u32 },
    NoTasks,
    MaxWavesReached,
    Failed { reason: String },
}

const ROUTA_SYSTEM_PROMPT: &str = "You are ROUTA, a planning agent. Break the user's request into \
one or more @@@task blocks, each with a title, objective, scope, definition of done, and \
verification commands.";
const CRAFTER_SYSTEM_PROMPT: &str =
    "You are a CRAFTER agent. Complete the assigned task, then call report_to_parent with a \
summary of what you did.";
const GATE_SYSTEM_PROMPT: &str = "You are GATE, a verification agent. Judge whether the reviewed \
task(s) meet their acceptance criteria. State your verdict clearly as APPROVED or NOT APPROVED.";

/// Drives one workspace's orchestration end to end.
pub struct Orchestrator {
    coordinator: Coordinator,
    routa_provider: Arc<AgentProvider>,
    crafter_provider: Arc<AgentProvider>,
    gate_provider: Arc<AgentProvider>,
    config: OrchestratorConfig,
    workspace_root: std::path::PathBuf,
    cancelled: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(
        coordinator: Coordinator,
        routa_provider: Arc<AgentProvider>,
        crafter_provider: Arc<AgentProvider>,
        gate_provider: Arc<AgentProvider>,
        config: OrchestratorConfig,
        workspace_root: std::path::PathBuf,
    ) -> Self {
        Self {
            coordinator,
            routa_provider,
            crafter_provider,
            gate_provider,
            config,
            workspace_root,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cooperative cancellation: sets a flag every active provider call
    /// observes at its next loop or tool boundary.
    pub fn stop_execution(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// The workspace's coordination state machine, for callers that need to
    /// inspect or extend store state (e.g. an external request-tracking task)
    /// alongside a driven `execute` run.
    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    fn tool_context(&self, agent_id: Uuid) -> ToolContext {
        ToolContext {
            workspace_id: self.coordinator.workspace_id().to_string(),
            agent_id,
            workspace_root: self.workspace_root.clone(),
            agents: self.coordinator.agents().clone(),
            tasks: self.coordinator.tasks().clone(),
            conversations: self.coordinator.conversations().clone(),
            events: self.coordinator.events().clone(),
        }
    }

    pub async fn execute(&self, user_request: &str) -> Result<ExecuteOutcome> {
        let routa_id = self.coordinator.initialize();
        let routa_ctx = self.tool_context(routa_id);

        let plan_text = match self
            .routa_provider
            .run(&routa_ctx, ROUTA_SYSTEM_PROMPT, user_request, &self.cancelled)
            .await
        {
            Ok(text) => text,
            Err(e) => return Ok(ExecuteOutcome::Failed { reason: e.to_string() }),
        };

        let task_ids = self.coordinator.register_tasks(&plan_text);
        if task_ids.is_empty() {
            return Ok(ExecuteOutcome::NoTasks);
        }

        for wave in 1..=self.config.max_waves {
            if self.cancelled.load(Ordering::Relaxed) {
                return Ok(ExecuteOutcome::Failed {
                    reason: "execution cancelled".to_string(),
                });
            }

            let delegations = self.coordinator.execute_next_wave()?;
            if delegations.is_empty() {
                // Nothing newly ready; fall through to reconciliation in
                // case a prior round already finished everything.
                if self.coordinator.reconcile() == forgewave_kernel::CoordinationPhase::Completed {
                    let completed = self.count_completed();
                    return Ok(ExecuteOutcome::Success { completed_tasks: completed, waves: wave - 1 });
                }
                continue;
            }

            if self.cancelled.load(Ordering::Relaxed) {
                return Ok(ExecuteOutcome::Failed {
                    reason: "execution cancelled mid-wave".to_string(),
                });
            }

            // Every task in `delegations` shares this wave's parallel group,
            // so their CRAFTERs run concurrently (bounded by max_parallelism
            // at delegation time in `execute_next_wave`) rather than one at a
            // time — a delegation list longer than 1 only ever arises when
            // the coordinator judged those tasks safe to run together.
            let mut runs = Vec::with_capacity(delegations.len());
            for (crafter_id, task_id) in delegations.iter().copied() {
                let context = self
                    .coordinator
                    .build_agent_context(crafter_id)?
                    .unwrap_or_default();
                let crafter_ctx = self.tool_context(crafter_id);
                let provider = Arc::clone(&self.crafter_provider);
                let cancelled = Arc::clone(&self.cancelled);
                runs.push(async move {
                    let output = provider
                        .run(&crafter_ctx, CRAFTER_SYSTEM_PROMPT, &context, &cancelled)
                        .await;
                    (crafter_id, task_id, output)
                });
            }

            for (crafter_id, task_id, output) in futures::future::join_all(runs).await {
                match output {
                    Ok(text) => self.ensure_crafter_report(crafter_id, task_id, &text)?,
                    Err(e) => {
                        return Ok(ExecuteOutcome::Failed { reason: e.to_string() });
                    }
                }
            }

            let Some(gate_id) = self.coordinator.start_verification()? else {
                // No task ended up REVIEW_REQUIRED; reconcile and continue.
                if self.coordinator.reconcile() == forgewave_kernel::CoordinationPhase::Completed {
                    let completed = self.count_completed();
                    return Ok(ExecuteOutcome::Success { completed_tasks: completed, waves: wave });
                }
                continue;
            };

            let gate_context = self
                .coordinator
                .build_agent_context(gate_id)?
                .unwrap_or_default();
            let gate_ctx = self.tool_context(gate_id);
            let gate_output = self
                .gate_provider
                .run(&gate_ctx, GATE_SYSTEM_PROMPT, &gate_context, &self.cancelled)
                .await;
            match gate_output {
                Ok(text) => self.ensure_gate_report(gate_id, &text)?,
                Err(e) => return Ok(ExecuteOutcome::Failed { reason: e.to_string() }),
            }

            let phase = self.coordinator.reconcile();
            if phase == forgewave_kernel::CoordinationPhase::Completed {
                let completed = self.count_completed();
                return Ok(ExecuteOutcome::Success { completed_tasks: completed, waves: wave });
            }
        }

        Ok(ExecuteOutcome::MaxWavesReached)
    }

    fn count_completed(&self) -> usize {
        self.coordinator
            .get_task_summary()
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count()
    }

    /// Safety net for a CRAFTER that never called `report_to_parent`:
    /// synthesize a completion report from its raw text output and move the
    /// task to REVIEW_REQUIRED. A no-op if the agent is already COMPLETED
    /// (the tool-calling loop already reported).
    fn ensure_crafter_report(&self, crafter_id: Uuid, task_id: Uuid, output: &str) -> Result<()> {
        if self.coordinator.agents().get(crafter_id)?.status == AgentStatus::Completed {
            return Ok(());
        }

        let mut task = self.coordinator.tasks().get(task_id)?;
        task.completion_summary = Some(synthesize_summary(output));
        task.status = TaskStatus::ReviewRequired;
        task.updated_at = chrono::Utc::now();
        self.coordinator.tasks().save(task);

        self.coordinator.agents().update_status(crafter_id, AgentStatus::Completed)?;
        self.coordinator.conversations().append(Message::new(
            crafter_id,
            MessageRole::Assistant,
            output,
        ));
        Ok(())
    }

    /// Safety net for a GATE that never called a verdict-recording tool:
    /// parse APPROVED/NOT APPROVED out of its raw text and apply it to every
    /// currently REVIEW_REQUIRED task. A no-op if the agent is already
    /// COMPLETED.
    fn ensure_gate_report(&self, gate_id: Uuid, output: &str) -> Result<()> {
        if self.coordinator.agents().get(gate_id)?.status == AgentStatus::Completed {
            return Ok(());
        }

        let verdict = parse_verdict(output);
        let review_tasks = self
            .coordinator
            .tasks()
            .list_by_status(self.coordinator.workspace_id(), TaskStatus::ReviewRequired);
        for mut task in review_tasks {
            task.verification_report = Some(output.to_string());
            task.verification_verdict = Some(verdict);
            task.status = match verdict {
                VerificationVerdict::Approved => TaskStatus::Completed,
                VerificationVerdict::NotApproved => TaskStatus::NeedsFix,
                VerificationVerdict::Blocked => TaskStatus::Blocked,
            };
            task.updated_at = chrono::Utc::now();
            self.coordinator.tasks().save(task);
        }

        self.coordinator.agents().update_status(gate_id, AgentStatus::Completed)?;
        self.coordinator.conversations().append(Message::new(
            gate_id,
            MessageRole::Assistant,
            output,
        ));
        Ok(())
    }
}

fn synthesize_summary(output: &str) -> String {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(3)
        .collect::<Vec<_>>()
        .join("\n")
}

fn file_path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|[\s`'\"])((?:src|tests?|docs?|crates)/[\w./-]+\.\w+)").unwrap()
    })
}

/// Heuristically recover file paths touched by a CRAFTER, for callers that
/// want a files-modified list without the agent explicitly reporting one.
pub fn extract_file_paths(output: &str) -> Vec<String> {
    file_path_regex()
        .captures_iter(output)
        .map(|c| c[1].to_string())
        .collect()
}

fn parse_verdict(output: &str) -> VerificationVerdict {
    let upper = output.to_ascii_uppercase();
    let not_approved = upper.contains("NOT APPROVED") || upper.contains("NOT_APPROVED");
    if !not_approved && upper.contains("APPROVED") {
        VerificationVerdict::Approved
    } else if not_approved {
        VerificationVerdict::NotApproved
    } else {
        VerificationVerdict::NotApproved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_verdict_approved() {
        assert!(matches!(parse_verdict("\u{2705} APPROVED"), VerificationVerdict::Approved));
    }

    #[test]
    fn parse_verdict_not_approved_wins_over_approved_substring() {
        assert!(matches!(
            parse_verdict("This is NOT APPROVED, issues remain (also contains APPROVED text)"),
            VerificationVerdict::NotApproved
        ));
    }

    #[test]
    fn parse_verdict_defaults_to_not_approved_when_ambiguous() {
        assert!(matches!(parse_verdict("looks fine to me"), VerificationVerdict::NotApproved));
    }

    #[test]
    fn extract_file_paths_finds_src_tree_prefixes() {
        let output = "Updated `src/lib.rs` and tests/integration.rs, all green.";
        let paths = extract_file_paths(output);
        assert_eq!(paths, vec!["src/lib.rs", "tests/integration.rs"]);
    }

    #[test]
    fn synthesize_summary_takes_first_three_nonempty_lines() {
        let output = "Added README\n\nAll tests pass\nExtra detail\nMore detail";
        assert_eq!(synthesize_summary(output), "Added README\nAll tests pass\nExtra detail");
    }

    fn new_orchestrator(
        routa_text: &str,
        crafter_text: &str,
        gate_text: &str,
        max_waves: u32,
    ) -> (Orchestrator, tempfile::TempDir) {
        use forgewave_agent::{AgentProviderConfig, EchoProvider, ToolRegistry};
        use forgewave_kernel::{AgentStore, ConversationStore, EventBus, TaskStore};

        let dir = tempfile::tempdir().unwrap();
        let coordinator = Coordinator::new(
            "ws1",
            AgentStore::new(),
            TaskStore::new(),
            ConversationStore::new(),
            EventBus::new(64),
            1,
        );
        let routa_provider = Arc::new(AgentProvider::new(
            Arc::new(EchoProvider::new(routa_text)),
            ToolRegistry::with_builtins(),
            AgentProviderConfig::default(),
        ));
        let crafter_provider = Arc::new(AgentProvider::new(
            Arc::new(EchoProvider::new(crafter_text)),
            ToolRegistry::with_builtins(),
            AgentProviderConfig::default(),
        ));
        let gate_provider = Arc::new(AgentProvider::new(
            Arc::new(EchoProvider::new(gate_text)),
            ToolRegistry::with_builtins(),
            AgentProviderConfig::default(),
        ));
        let orchestrator = Orchestrator::new(
            coordinator,
            routa_provider,
            crafter_provider,
            gate_provider,
            OrchestratorConfig {
                max_waves,
                max_parallelism: 1,
            },
            dir.path().to_path_buf(),
        );
        (orchestrator, dir)
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

    #[tokio::test]
    async fn execute_single_task_happy_path_reaches_success() {
        let (orchestrator, _dir) = new_orchestrator(
            SINGLE_TASK_PLAN,
            "Added README\nAll tests pass",
            "\u{2705} APPROVED",
            3,
        );
        let outcome = orchestrator.execute("add a README").await.unwrap();
        assert!(matches!(
            outcome,
            ExecuteOutcome::Success { completed_tasks: 1, .. }
        ));
    }

    #[tokio::test]
    async fn execute_with_no_tasks_in_plan_returns_no_tasks() {
        let (orchestrator, _dir) = new_orchestrator(
            "I have no tasks for this request.",
            "unused",
            "unused",
            3,
        );
        let outcome = orchestrator.execute("do nothing in particular").await.unwrap();
        assert!(matches!(outcome, ExecuteOutcome::NoTasks));
    }

    #[tokio::test]
    async fn execute_reaches_max_waves_when_gate_never_approves() {
        let (orchestrator, _dir) = new_orchestrator(
            SINGLE_TASK_PLAN,
            "Added README",
            "NOT APPROVED, missing usage section",
            2,
        );
        let outcome = orchestrator.execute("add a README").await.unwrap();
        assert!(matches!(outcome, ExecuteOutcome::MaxWavesReached));
    }

    const TWO_TASK_PLAN: &str = "\
@@@task
# Add README
## Objective
Document the project
@@@
@@@task
# Add LICENSE
## Objective
Add a license file
@@@
";

    #[tokio::test]
    async fn execute_runs_two_same_group_tasks_in_one_concurrent_wave() {
        use forgewave_agent::{AgentProviderConfig, EchoProvider, ToolRegistry};
        use forgewave_kernel::{AgentStore, ConversationStore, EventBus, TaskStore};

        let dir = tempfile::tempdir().unwrap();
        let coordinator = Coordinator::new(
            "ws1",
            AgentStore::new(),
            TaskStore::new(),
            ConversationStore::new(),
            EventBus::new(64),
            2,
        );
        let routa_provider = Arc::new(AgentProvider::new(
            Arc::new(EchoProvider::new(TWO_TASK_PLAN)),
            ToolRegistry::with_builtins(),
            AgentProviderConfig::default(),
        ));
        let crafter_provider = Arc::new(AgentProvider::new(
            Arc::new(EchoProvider::new("Done\nAll tests pass")),
            ToolRegistry::with_builtins(),
            AgentProviderConfig::default(),
        ));
        let gate_provider = Arc::new(AgentProvider::new(
            Arc::new(EchoProvider::new("\u{2705} APPROVED")),
            ToolRegistry::with_builtins(),
            AgentProviderConfig::default(),
        ));
        let orchestrator = Orchestrator::new(
            coordinator,
            routa_provider,
            crafter_provider,
            gate_provider,
            OrchestratorConfig { max_waves: 3, max_parallelism: 2 },
            dir.path().to_path_buf(),
        );

        let outcome = orchestrator.execute("add a README and a LICENSE").await.unwrap();
        assert!(matches!(
            outcome,
            ExecuteOutcome::Success { completed_tasks: 2, waves: 1 }
        ));
    }

    #[tokio::test]
    async fn execute_stops_when_cancelled_before_running() {
        let (orchestrator, _dir) =
            new_orchestrator(SINGLE_TASK_PLAN, "Added README", "\u{2705} APPROVED", 3);
        orchestrator.stop_execution();
        let outcome = orchestrator.execute("add a README").await.unwrap();
        assert!(matches!(outcome, ExecuteOutcome::Failed { .. }));
    }
}
