//! Runtime for executing conversation turns
//!
//! The orchestrator walks the node graph for one turn; the thread manager
//! wraps it with checkpoint loading and saving per thread.

mod nodes;
mod orchestrator;
mod threads;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use orchestrator::{Orchestrator, OrchestratorConfig, RunEvent, DEFAULT_MAX_STEPS};
pub use threads::ThreadManager;
pub use traits::*;

/// Thread manager wired to the real model, tools, and database
pub type ProductionThreads =
    ThreadManager<RegistryLlmClient, ToolRegistryExecutor, DatabaseCheckpointStore>;
