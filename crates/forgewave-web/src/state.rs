//! Shared axum state.
//!
//! Grounded in the donor web crate's `AppState` (a plain `Clone` struct of
//! `Arc`-wrapped handles plus config, passed to every handler via
//! `.with_state()`).

use std::sync::Arc;

use forgewave_coordinator::Orchestrator;

use crate::a2a::A2aServer;
use crate::WebConfig;

#[derive(Clone)]
pub struct AppState {
    pub a2a: Arc<A2aServer>,
    pub config: WebConfig,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, config: WebConfig) -> Self {
        Self {
            a2a: Arc::new(A2aServer::new(Arc::new(orchestrator))),
            config,
        }
    }
}
