//! Engine tuning knobs.

use opal_wal::LogConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for one replica engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Directory holding this replica's log segments and snapshot.
    pub data_dir: PathBuf,
    /// A snapshot is written every this many logged batches. Zero
    /// disables interval snapshots (on-demand still works).
    pub snapshot_interval: u64,
    /// Log segment sizing and retention.
    pub log: LogConfig,
    /// How long a causally gated request may wait before failing with
    /// a timeout. `None` waits forever.
    pub wait_deadline: Option<Duration>,
    /// Envelope ids remembered for duplicate suppression.
    pub dedup_capacity: usize,
}

impl EngineConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        EngineConfig {
            data_dir: data_dir.into(),
            snapshot_interval: 100,
            log: LogConfig::default(),
            wait_deadline: None,
            dedup_capacity: 4096,
        }
    }
}
