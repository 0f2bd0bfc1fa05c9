//! The replica engine.
//!
//! One engine owns one replica's objects, vector clock, wait queue, and
//! effect buffer. All mutation happens on a single actor task: client
//! commands arrive on a channel, remote envelopes on another, and the
//! actor interleaves them one at a time, so no in-process locking is
//! needed anywhere in the engine.
//!
//! Remote delivery is strict: an envelope whose clock is ahead of what
//! this replica has seen from other replicas is parked until its causal
//! predecessors arrive. Client requests carrying a dependency clock the
//! local clock does not yet dominate are parked the same way and
//! answered once the clock catches up.

pub mod actor;
pub mod buffer;
pub mod config;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod store;

pub use actor::{spawn, Command, ReadReply, ReplicaHandle};
pub use buffer::{is_deliverable, EffectBuffer};
pub use config::EngineConfig;
pub use dedup::SeenSet;
pub use engine::{EngineStats, ReplicaEngine, Update};
pub use error::EngineError;
pub use store::ObjectStore;
