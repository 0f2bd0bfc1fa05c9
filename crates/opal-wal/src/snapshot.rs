//! The snapshot store: one overwriting on-disk record per replica.
//!
//! A snapshot captures the whole object map, the replica clock, and the
//! log sequence it reflects. Replacement is atomic: the new record is
//! written to a temporary file, synced, then renamed over the old one,
//! so a crash mid-snapshot leaves the previous snapshot intact.

use crate::error::WalError;
use opal_core::{ObjectKey, StoredObject, VectorClock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

const SNAPSHOT_FILE: &str = "snapshot.db";
const SNAPSHOT_TMP: &str = "snapshot.tmp";

/// A durable checkpoint of a replica's full state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Every live object with its bookkeeping version.
    pub objects: BTreeMap<ObjectKey, StoredObject>,
    /// The replica clock at snapshot time.
    pub clock: VectorClock,
    /// Log records with sequence at or below this are reflected here.
    pub log_sequence: u64,
}

/// Reads and atomically replaces the snapshot file for one replica.
#[derive(Debug)]
pub struct SnapshotStore {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl SnapshotStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, WalError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(SnapshotStore {
            path: dir.join(SNAPSHOT_FILE),
            tmp_path: dir.join(SNAPSHOT_TMP),
        })
    }

    /// Load the current snapshot, `None` if none was ever written.
    pub fn load(&self) -> Result<Option<SnapshotRecord>, WalError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record = bincode::deserialize(&bytes)
            .map_err(|e| WalError::CorruptSnapshot(e.to_string()))?;
        Ok(Some(record))
    }

    /// Replace the snapshot with `record`, atomically.
    pub fn save(&self, record: &SnapshotRecord) -> Result<(), WalError> {
        let bytes = bincode::serialize(record)?;

        let mut tmp = std::fs::File::create(&self.tmp_path)?;
        tmp.write_all(&bytes)?;
        tmp.sync_all()?;
        drop(tmp);

        std::fs::rename(&self.tmp_path, &self.path)?;
        info!(
            log_sequence = record.log_sequence,
            objects = record.objects.len(),
            "snapshot written"
        );
        Ok(())
    }
}
