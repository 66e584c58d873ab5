//! `forgewave run` subcommand: drive one orchestration pass to completion
//! and print the outcome.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use forgewave_agent::{AgentProvider, AgentProviderConfig, AgentRuntimeConfig, ToolRegistry};
use forgewave_coordinator::{Coordinator, ExecuteOutcome, Orchestrator, OrchestratorConfig};
use forgewave_kernel::{AgentStore, ConversationStore, EventBus, TaskStore};
use tracing::info;

use crate::helpers::{init_tracing, resolve_transport};

const EVENT_BUS_CAPACITY: usize = 256;

pub async fn cmd_run(
    request: Option<String>,
    workspace_root: String,
    max_waves: u32,
    max_parallelism: u32,
) -> Result<()> {
    init_tracing("info");

    let request = match request {
        Some(r) => r,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf.trim().to_string()
        }
    };
    if request.is_empty() {
        anyhow::bail!("no request text provided (pass an argument or pipe one in on stdin)");
    }

    let runtime_config = AgentRuntimeConfig::from_env();
    let transport = resolve_transport(runtime_config.model_transport_timeout_secs)?;

    let coordinator = Coordinator::new(
        "default",
        AgentStore::new(),
        TaskStore::new(),
        ConversationStore::new(),
        EventBus::new(EVENT_BUS_CAPACITY),
        max_parallelism,
    );

    let provider_config = AgentProviderConfig {
        max_iterations: runtime_config.max_iterations,
    };
    let make_provider = || {
        Arc::new(AgentProvider::new(
            Arc::clone(&transport),
            ToolRegistry::with_builtins(),
            provider_config.clone(),
        ))
    };

    let orchestrator = Orchestrator::new(
        coordinator,
        make_provider(),
        make_provider(),
        make_provider(),
        OrchestratorConfig {
            max_waves,
            max_parallelism,
        },
        PathBuf::from(workspace_root),
    );

    info!(max_waves, max_parallelism, "starting orchestration run");
    match orchestrator.execute(&request).await? {
        ExecuteOutcome::Success { completed_tasks, waves } => {
            println!("done: {completed_tasks} task(s) completed in {waves} wave(s)");
        }
        ExecuteOutcome::NoTasks => {
            println!("ROUTA produced no tasks for this request");
        }
        ExecuteOutcome::MaxWavesReached => {
            println!("gave up after {max_waves} wave(s) without full verification");
            std::process::exit(1);
        }
        ExecuteOutcome::Failed { reason } => {
            println!("execution failed: {reason}");
            std::process::exit(1);
        }
    }

    Ok(())
}
