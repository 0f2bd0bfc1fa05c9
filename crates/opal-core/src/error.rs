//! Error types for the CRDT library.

use crate::key::TypeTag;
use thiserror::Error;

/// Rejection of an operation at its origin, before any effect exists.
///
/// An origin rejection aborts the whole client batch; effects that were
/// successfully produced never fail on apply.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DownstreamError {
    #[error("element was already removed")]
    AlreadyRemoved,

    #[error("element was never added")]
    NotAdded,

    #[error("amount must be at least 1")]
    ZeroAmount,

    #[error("operation {op} is not valid for {tag}")]
    InvalidOp { op: &'static str, tag: TypeTag },
}

/// An effect was routed to a state of a different CRDT type.
///
/// The engine dispatches effects by the type tag embedded in the object
/// key, so this only occurs on a corrupted log or a programming error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("effect {effect} cannot apply to {tag} state")]
pub struct TypeMismatch {
    pub tag: TypeTag,
    pub effect: &'static str,
}
