//! Agent crate error types.
//!
//! Mirrors the kernel crate's taxonomy: one `thiserror` enum, grouped by
//! subsystem, with a crate-local [`Result`] alias. Tool-call and coordination
//! tool failures never reach Rust callers as an `Err` — they are converted
//! into `{success: false, error}` envelopes at the tool boundary (see
//! [`crate::tools`]); this type exists for the layers beneath that boundary.

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    // -- Plan parser errors -------------------------------------------------
    #[error("plan parsing failed: {reason}")]
    PlanParseFailed { reason: String },

    // -- Tool errors ----------------------------------------------------------
    #[error("unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    #[error("tool `{tool_name}` execution failed: {reason}")]
    ToolExecutionFailed { tool_name: String, reason: String },

    // -- Provider loop errors -------------------------------------------------
    #[error("agent {agent_id} exceeded max iterations ({max_iterations})")]
    MaxIterationsExceeded { agent_id: Uuid, max_iterations: u32 },

    #[error("model transport failed: {reason}")]
    TransportFailed { reason: String },

    #[error("agent {agent_id} run was cancelled")]
    Cancelled { agent_id: Uuid },

    // -- Upstream crate errors --------------------------------------------
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("kernel error: {0}")]
    Kernel(#[from] forgewave_kernel::KernelError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // -- Generic --------------------------------------------------------------
    #[error("internal agent error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;
