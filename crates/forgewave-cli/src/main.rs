//! CLI entry point for forgewave.
//!
//! Provides the `forgewave` command with subcommands for running one
//! orchestration pass and for serving the A2A JSON-RPC endpoint.

mod cli;
mod helpers;
mod http_transport;
mod run;
mod serve;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            request,
            workspace_root,
            max_waves,
            max_parallelism,
        } => run::cmd_run(request, workspace_root, max_waves, max_parallelism).await,
        Commands::Serve {
            bind,
            port,
            workspace_root,
            max_waves,
            max_parallelism,
        } => serve::cmd_serve(bind, port, workspace_root, max_waves, max_parallelism).await,
    }
}
