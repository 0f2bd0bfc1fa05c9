//! Client-visible engine errors.

use opal_core::{DownstreamError, TypeTag};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A textual type tag did not resolve to a registered CRDT type.
    #[error("unknown type tag: {0}")]
    UnknownType(String),

    /// The operation is not defined for the key's CRDT type.
    #[error("operation {op} is not valid for {tag}")]
    InvalidOp { op: &'static str, tag: TypeTag },

    /// A CRDT rejected the operation at the origin; the batch aborted.
    #[error("update rejected at origin: {0}")]
    DownstreamFailed(String),

    /// A durability write failed.
    #[error("durability write failed: {0}")]
    IoFailed(String),

    /// The request's causal dependencies were not satisfied in time.
    #[error("causal dependency not satisfied within the deadline")]
    CausalTimeout,

    /// The replica actor has stopped.
    #[error("replica is shutting down")]
    Shutdown,
}

impl From<DownstreamError> for EngineError {
    fn from(err: DownstreamError) -> Self {
        match err {
            DownstreamError::InvalidOp { op, tag } => EngineError::InvalidOp { op, tag },
            other => EngineError::DownstreamFailed(other.to_string()),
        }
    }
}
