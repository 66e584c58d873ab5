//! HTTP handlers: the A2A JSON-RPC endpoint and the discovery/agent-card
//! endpoint. Grounded in the donor web crate's `mcp.rs::handle_mcp_request`
//! (single-or-batch JSON body handling over one POST endpoint).

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::Value;

use crate::a2a::{self, JsonRpcRequest, JsonRpcResponse};
use crate::state::AppState;

/// `POST /a2a` — accepts either a single JSON-RPC request object or a batch
/// (JSON array) of them, mirroring the donor's MCP endpoint.
pub async fn handle_a2a_request(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    if let Some(batch) = body.as_array() {
        let mut responses = Vec::with_capacity(batch.len());
        for item in batch {
            responses.push(dispatch_one(&state, item.clone()).await);
        }
        return Json(serde_json::to_value(responses).unwrap_or(Value::Null));
    }

    let response = dispatch_one(&state, body).await;
    Json(serde_json::to_value(response).unwrap_or(Value::Null))
}

async fn dispatch_one(state: &AppState, raw: Value) -> JsonRpcResponse {
    match serde_json::from_value::<JsonRpcRequest>(raw) {
        Ok(request) => state.a2a.handle_request(request).await,
        Err(e) => JsonRpcResponse::error(None, a2a::PARSE_ERROR, e.to_string()),
    }
}

/// `GET /.well-known/agent.json` — the agent-card discovery document.
pub async fn agent_card(State(_state): State<Arc<AppState>>) -> Json<Value> {
    Json(a2a::agent_card(
        "forgewave",
        "Multi-agent orchestrator that plans, executes, and verifies tasks in waves",
    ))
}

/// `GET /api/status` — a minimal liveness probe.
pub async fn status() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
