//! Agent runtime configuration.
//!
//! Grounded in the donor CLI's `resolve_llm_config` cascade in `helpers.rs`:
//! environment variables first, with defaults for everything unset, and no
//! file-watching. The donor's `config/mod.rs` hot-reload machinery (a
//! `notify` file watcher plus a broadcast change channel) is not carried
//! over here — there is no on-disk config format in this domain for it to
//! watch, so it would add a dependency without a user.

use std::path::PathBuf;

/// Tunables for one [`crate::provider::AgentProvider`] run, resolved from
/// `FORGEWAVE_*` environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct AgentRuntimeConfig {
    /// Hard cap on model-call iterations per agent run.
    pub max_iterations: u32,
    /// Timeout budget a [`crate::llm::ModelTransport`] implementation should
    /// honor for one call; the transport itself enforces it, not this crate.
    pub model_transport_timeout_secs: u64,
    /// Root directory filesystem tools are confined to.
    pub workspace_root: PathBuf,
}

impl Default for AgentRuntimeConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            model_transport_timeout_secs: 60,
            workspace_root: PathBuf::from("."),
        }
    }
}

impl AgentRuntimeConfig {
    /// Resolve configuration from the environment, falling back to defaults
    /// for anything unset or unparseable. Call [`dotenvy::dotenv`] before
    /// this if a `.env` file should be considered part of the environment.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_iterations: std::env::var("FORGEWAVE_MAX_ITERATIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_iterations),
            model_transport_timeout_secs: std::env::var("FORGEWAVE_TRANSPORT_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.model_transport_timeout_secs),
            workspace_root: std::env::var("FORGEWAVE_WORKSPACE_ROOT")
                .ok()
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace_root),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_env_unset() {
        std::env::remove_var("FORGEWAVE_MAX_ITERATIONS");
        std::env::remove_var("FORGEWAVE_TRANSPORT_TIMEOUT_SECS");
        std::env::remove_var("FORGEWAVE_WORKSPACE_ROOT");
        let config = AgentRuntimeConfig::from_env();
        assert_eq!(config.max_iterations, 25);
        assert_eq!(config.model_transport_timeout_secs, 60);
    }

    #[test]
    fn reads_overrides_from_environment() {
        std::env::set_var("FORGEWAVE_MAX_ITERATIONS", "7");
        let config = AgentRuntimeConfig::from_env();
        assert_eq!(config.max_iterations, 7);
        std::env::remove_var("FORGEWAVE_MAX_ITERATIONS");
    }
}
