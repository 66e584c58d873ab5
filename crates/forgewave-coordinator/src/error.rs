//! Coordinator crate error types.

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("coordinator for workspace {workspace_id} has not been initialized")]
    NotInitialized { workspace_id: String },

    #[error("no ROUTA agent registered for this workspace")]
    MissingRouta,

    #[error("agent {agent_id} has no assigned task to build context for")]
    NoAssignedTask { agent_id: Uuid },

    #[error("agent error: {0}")]
    Agent(#[from] forgewave_agent::AgentError),

    #[error("kernel error: {0}")]
    Kernel(#[from] forgewave_kernel::KernelError),
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
