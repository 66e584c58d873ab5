//! `forgewave serve` subcommand: start the A2A JSON-RPC HTTP server.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use forgewave_agent::{AgentProvider, AgentProviderConfig, AgentRuntimeConfig, ToolRegistry};
use forgewave_coordinator::{Coordinator, Orchestrator, OrchestratorConfig};
use forgewave_kernel::{AgentStore, ConversationStore, EventBus, TaskStore};
use forgewave_web::{WebConfig, WebServer};
use tracing::info;

use crate::helpers::{init_tracing, resolve_transport};

const EVENT_BUS_CAPACITY: usize = 256;

pub async fn cmd_serve(
    bind: String,
    port: u16,
    workspace_root: String,
    max_waves: u32,
    max_parallelism: u32,
) -> Result<()> {
    init_tracing("info");

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

    let config = WebConfig { bind_addr: bind, port };

    println!();
    println!("  forgewave v{}", env!("CARGO_PKG_VERSION"));
    println!("  A2A endpoint: http://{}:{}/a2a", config.bind_addr, config.port);
    println!(
        "  Agent card:   http://{}:{}/.well-known/agent.json",
        config.bind_addr, config.port
    );
    println!();

    info!("starting forgewave web server");
    let server = WebServer::new(config, orchestrator);
    server.start().await.map_err(|e| anyhow::anyhow!("{e}"))?;

    Ok(())
}
