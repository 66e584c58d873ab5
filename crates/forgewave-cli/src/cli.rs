//! Command-line argument definitions.
//!
//! Grounded in the donor CLI's `cli.rs` clap-derive layout, trimmed to the
//! two surfaces this system actually exposes: running one orchestration
//! pass, and serving the A2A HTTP endpoint.

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "forgewave", version, about = "Wave-based multi-agent orchestrator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run one orchestration pass against a request and print the outcome.
    Run {
        /// The request text. Reads from stdin if omitted.
        request: Option<String>,

        /// Directory filesystem tools are confined to.
        #[arg(long, default_value = ".")]
        workspace_root: String,

        /// Maximum number of plan→execute→verify waves before giving up.
        #[arg(long, default_value_t = 3)]
        max_waves: u32,

        /// Maximum number of tasks delegated concurrently within one wave.
        #[arg(long, default_value_t = 1)]
        max_parallelism: u32,
    },

    /// Start the A2A JSON-RPC HTTP server.
    Serve {
        /// Address to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,

        /// Port to listen on.
        #[arg(long, default_value_t = 3000)]
        port: u16,

        /// Directory filesystem tools are confined to.
        #[arg(long, default_value = ".")]
        workspace_root: String,

        /// Maximum number of plan→execute→verify waves before giving up, per request.
        #[arg(long, default_value_t = 5)]
        max_waves: u32,

        /// Maximum number of tasks delegated concurrently within one wave.
        #[arg(long, default_value_t = 2)]
        max_parallelism: u32,
    },
}
