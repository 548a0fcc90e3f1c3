//! Node-level error type.

use thiserror::Error;

use crate::expr::ExprError;

/// Errors returned by a node executor or one of its collaborators.
///
/// The engine never retries: every variant aborts the run unless the node
/// itself tolerates it (transform expressions, mass-email recipients).
#[derive(Debug, Error, Clone)]
pub enum NodeError {
    /// The node definition is unusable (bad method, bad URL, ...).
    #[error("invalid node configuration: {0}")]
    InvalidConfig(String),

    /// Network-level failure (DNS, timeout, connection refused).
    #[error("transport error: {0}")]
    Transport(String),

    /// An email or WhatsApp message could not be handed off.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// The contact or list store failed.
    #[error("store error: {0}")]
    Store(String),

    /// A transform expression could not be parsed or evaluated.
    #[error("expression error: {0}")]
    Expression(#[from] ExprError),
}
