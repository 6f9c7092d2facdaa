//! Wires adapters, the LLM stages, and the ranker into one orchestrator
//! pass, and the scheduler that drives it on an interval.

pub mod pipeline;
pub mod scheduler;

pub use pipeline::{Orchestrator, OrchestratorDeps};
pub use scheduler::Scheduler;
