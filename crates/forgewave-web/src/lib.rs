//! HTTP and A2A surface for an orchestration workspace.
//!
//! Exposes one workspace's [`forgewave_coordinator::Coordinator`] over an
//! A2A-flavored JSON-RPC endpoint (`POST /a2a`) plus a discovery document
//! at `/.well-known/agent.json`, following the donor web crate's
//! router/state split (`server.rs` + `state.rs`).

pub mod a2a;
pub mod api;
pub mod server;
pub mod state;

pub use a2a::{
    agent_card, map_task_status, A2aServer, ExternalTaskState, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse,
};
pub use server::WebServer;
pub use state::AppState;

/// Bind address and port configuration for [`WebServer`].
#[derive(Debug, Clone)]
pub struct WebConfig {
    pub bind_addr: String,
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}
