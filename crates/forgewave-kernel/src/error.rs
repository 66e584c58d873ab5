//! Kernel error types.
//!
//! All store and event-bus APIs surface errors through [`KernelError`], the
//! single error type returned by every public function in this crate.

use uuid::Uuid;

/// Unified error type for the forgewave kernel (stores + event bus).
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    // -- Store errors --------------------------------------------------
    /// The referenced agent does not exist.
    #[error("agent not found: {agent_id}")]
    AgentNotFound { agent_id: Uuid },

    /// The referenced task does not exist.
    #[error("task not found: {task_id}")]
    TaskNotFound { task_id: Uuid },

    /// An entity transition was requested that the current status forbids.
    #[error("invalid status transition for {entity} {id}: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        id: Uuid,
        from: String,
        to: String,
    },

    // -- Event bus errors ------------------------------------------------
    /// The subscriber handle no longer exists (already unsubscribed).
    #[error("event bus subscriber not found: {0}")]
    SubscriberNotFound(Uuid),

    // -- Generic ----------------------------------------------------------
    /// Catch-all for invariant violations that are bugs, not user error.
    #[error("internal kernel error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the kernel crate.
pub type Result<T> = std::result::Result<T, KernelError>;
