//! Error type for log and snapshot I/O.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WalError {
    #[error("log I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("record encoding failed: {0}")]
    Encode(#[from] bincode::Error),

    #[error("snapshot file is corrupt: {0}")]
    CorruptSnapshot(String),
}
