//! Engine-level error types.

use thiserror::Error;

use nodes::NodeError;

/// Errors produced by the automation engine (validation + execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Validation errors ------

    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// A successor list references a node ID that doesn't exist.
    #[error("node '{from}' references unknown successor '{to}'")]
    UnknownSuccessor { from: String, to: String },

    #[error("automation has no trigger nodes")]
    NoTriggerNodes,

    /// Topological sort detected a cycle.
    #[error("automation graph contains a cycle")]
    CycleDetected,

    /// The stored node list could not be decoded.
    #[error("invalid automation definition: {0}")]
    InvalidDefinition(String),

    // ------ Execution errors ------

    /// A node executor failed; the whole run is aborted.
    #[error("node '{node_id}' failed: {source}")]
    NodeFailed {
        node_id: String,
        #[source]
        source: NodeError,
    },

    /// Persistence error from the db crate.
    #[error("database error: {0}")]
    Database(#[from] db::DbError),

    /// The delayed-job scheduler refused a continuation.
    #[error("scheduler error: {0}")]
    Scheduler(#[from] queue::QueueError),
}
