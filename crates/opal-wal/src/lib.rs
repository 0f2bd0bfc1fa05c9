//! Durability for Opal replicas: a segmented write-ahead operation log
//! plus a single overwriting snapshot record.
//!
//! The log is written before effects are broadcast, so a crash never
//! loses an update that peers might already have applied. Recovery is
//! snapshot load followed by replay of every log record with a sequence
//! above the snapshot's.

pub mod error;
pub mod log;
pub mod snapshot;

pub use error::WalError;
pub use log::{LogConfig, LogRecord, OpLog};
pub use snapshot::{SnapshotRecord, SnapshotStore};
