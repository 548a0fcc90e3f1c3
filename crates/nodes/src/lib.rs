//! `nodes` crate — node definitions, the execution context, and the built-in
//! node executors.
//!
//! Every linear node kind implements [`ExecutableNode`]. Graph-aware kinds
//! (`condition`, `delay`) only expose their evaluation here; the engine crate
//! owns traversal and suspension.

pub mod condition;
pub mod contacts;
pub mod context;
pub mod definition;
pub mod email;
pub mod error;
pub mod expr;
pub mod http;
pub mod mass_email;
pub mod mock;
pub mod path;
pub mod template;
pub mod traits;
pub mod transform;

pub use context::{ExecutionContext, LogEntry, LogLevel};
pub use definition::{Node, NodeKind};
pub use error::NodeError;
pub use traits::{ExecutableNode, Services};
