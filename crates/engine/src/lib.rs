//! `engine` crate — automation model, graph validation, and the execution
//! engine (orchestrator, delay bridge, run recorder, resume worker).

pub mod adapters;
pub mod config;
pub mod dag;
pub mod delay;
pub mod error;
pub mod executor;
pub mod models;
pub mod recorder;
pub mod worker;

pub use config::ExecutorConfig;
pub use dag::validate_graph;
pub use error::EngineError;
pub use executor::{AutomationExecutor, ExecutionOutcome, RunStatus};
pub use models::Automation;

#[cfg(test)]
mod executor_tests;
