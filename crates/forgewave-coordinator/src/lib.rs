//! Wave-based coordinator state machine and orchestrator driver.
//!
//! [`coordinator::Coordinator`] is the phase machine (§C8): it owns no
//! agent-running logic, only task/agent bookkeeping and phase transitions.
//! [`driver::Orchestrator`] (§C9) drives one `execute` pass by alternating
//! coordinator calls with [`forgewave_agent::AgentProvider`] runs for
//! ROUTA/CRAFTER/GATE.

pub mod coordinator;
pub mod driver;
pub mod error;

pub use coordinator::{Coordinator, TaskSummary};
pub use driver::{extract_file_paths, ExecuteOutcome, Orchestrator, OrchestratorConfig};
pub use error::{CoordinatorError, Result};
