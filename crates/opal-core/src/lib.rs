//! Core types for the Opal replicated store: vector clocks, object
//! identity, and the CRDT type library.
//!
//! Every data type here is a pure value: no I/O, no channels, no global
//! state. The replica engine owns the mutation schedule; this crate only
//! answers "what effect does this operation produce?" and "what does this
//! state look like after applying that effect?".

pub mod awset;
pub mod clock;
pub mod counter;
pub mod error;
pub mod ewflag;
pub mod key;
pub mod mvreg;
pub mod pncounter;
pub mod state;
pub mod token;
pub mod tpset;

pub use clock::{ClockOrder, ReplicaId, VectorClock};
pub use error::{DownstreamError, TypeMismatch};
pub use key::{ObjectKey, TypeTag};
pub use state::{requires_state_for_downstream, CrdtOp, CrdtState, Effect, Elem, StoredObject, Value};
pub use token::{Dot, Token};
