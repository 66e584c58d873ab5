//! Shared helper functions used across CLI subcommands.
//!
//! Grounded in the donor CLI's `helpers.rs`: tracing initialization follows
//! the same `EnvFilter`-with-fallback pattern; transport resolution follows
//! the same env-var-cascade shape as `resolve_llm_config`, trimmed to the
//! one provider this crate ships a transport for.

use std::sync::Arc;

use forgewave_agent::{EchoProvider, ModelTransport};
use tracing_subscriber::EnvFilter;

use crate::http_transport::AnthropicTransport;

/// Initialize the tracing subscriber with the given default log level.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

/// Read a non-empty environment variable, returning `None` if unset or empty.
pub fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Resolve which model transport to drive agents with.
///
/// If `ANTHROPIC_API_KEY` is set, builds an [`AnthropicTransport`] (model
/// overridable with `FORGEWAVE_MODEL`). Otherwise falls back to
/// [`EchoProvider`] so `forgewave run` remains usable without credentials,
/// for local smoke-testing of the coordinator/provider wiring.
pub fn resolve_transport(timeout_secs: u64) -> anyhow::Result<Arc<dyn ModelTransport>> {
    let model = env_non_empty("FORGEWAVE_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());

    if let Some(key) = env_non_empty("ANTHROPIC_API_KEY") {
        tracing::info!(model = %model, "using Anthropic transport");
        let transport = AnthropicTransport::new(key, model, timeout_secs)
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        return Ok(Arc::new(transport));
    }

    tracing::warn!("no ANTHROPIC_API_KEY set, falling back to a no-op echo transport");
    Ok(Arc::new(EchoProvider::new(
        "no model transport configured; set ANTHROPIC_API_KEY",
    )))
}
