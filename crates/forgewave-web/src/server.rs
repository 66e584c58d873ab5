//! Main web server setup and startup.
//!
//! [`WebServer`] composes the axum router, registers all routes, and starts
//! the HTTP listener. Grounded in the donor web crate's `server.rs`.

use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use forgewave_coordinator::Orchestrator;

use crate::api;
use crate::state::AppState;
use crate::WebConfig;

pub struct WebServer {
    config: WebConfig,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: WebConfig, orchestrator: Orchestrator) -> Self {
        let state = Arc::new(AppState::new(orchestrator, config.clone()));
        Self { config, state }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.config.bind_addr, self.config.port)
    }

    fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin("*".parse::<HeaderValue>().unwrap())
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(tower_http::cors::Any);

        Router::new()
            .route("/api/status", get(api::status))
            .route("/.well-known/agent.json", get(api::agent_card))
            .route("/a2a", post(api::handle_a2a_request))
            .layer(cors)
            .with_state(Arc::clone(&self.state))
    }

    /// Start the server and block until it is shut down.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot be bound.
    pub async fn start(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = self.addr();
        let router = self.router();

        tracing::info!(addr = %addr, "starting web server");

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
