//! The causal broadcast layer.
//!
//! This crate moves effect envelopes between replicas: the engine hands
//! an envelope to [`Broadcaster::broadcast`], which returns immediately;
//! a pump task fans the envelope out to every peer the membership
//! service reports. Delivery is best-effort — unreachable peers are
//! skipped and counted, never retried. Causal ordering is not this
//! layer's job; it only promises to carry the engine's clock verbatim
//! and to keep same-origin envelopes in send order.

pub mod broadcaster;
pub mod envelope;
pub mod membership;
pub mod transport;

pub use broadcaster::{BroadcastStats, Broadcaster};
pub use envelope::Envelope;
pub use membership::{Membership, StaticMembership};
pub use transport::{MemoryHub, MemoryTransport, Transport, TransportError};
