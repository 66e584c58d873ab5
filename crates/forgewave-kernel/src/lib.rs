//! Forgewave kernel: in-memory entity stores and the coordination event bus.
//!
//! This crate holds the data the rest of the orchestrator reasons about —
//! [`Agent`], [`Task`], [`Message`] — plus the two primitives that give
//! concurrent access to that data a defined shape:
//!
//! - **[`bus`]** -- per-subscriber bounded event fan-out (drop-oldest on
//!   overflow, non-blocking emission).
//! - **[`stores`]** -- `DashMap`-backed `AgentStore`/`TaskStore`/
//!   `ConversationStore`, ephemeral and in-memory by design.
//! - **[`types`]** -- the entity and coordination-phase types shared by both.
//! - **[`error`]** -- the unified kernel error type.

pub mod bus;
pub mod error;
pub mod stores;
pub mod types;

pub use bus::{Event, EventBus, EventReceiver};
pub use error::{KernelError, Result};
pub use stores::{AgentStore, ConversationStore, TaskStore};
pub use types::{
    Agent, AgentRole, AgentStatus, CompletionReport, CoordinationPhase, CoordinationState,
    Message, MessageRole, ModelTier, Task, TaskStatus, VerificationVerdict, WorkspaceId,
};
