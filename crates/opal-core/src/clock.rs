//! Vector clocks: per-replica logical counters with a causal partial order.
//!
//! A clock maps replica ids to the number of update batches observed from
//! that replica. A missing entry is semantically zero, so clocks stay
//! compact while the set of replicas grows.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Replica identifier.
pub type ReplicaId = String;

/// Outcome of comparing two vector clocks under the causal partial order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockOrder {
    /// Identical on every position.
    Equal,
    /// Strictly dominated: at least one position less, none greater.
    Before,
    /// Strictly dominating: at least one position greater, none less.
    After,
    /// Incomparable: some positions less, some greater.
    Concurrent,
}

/// A vector clock tracking the highest batch counter seen per replica.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClock {
    entries: BTreeMap<ReplicaId, u64>,
}

impl VectorClock {
    /// Create an empty clock.
    pub fn new() -> Self {
        VectorClock {
            entries: BTreeMap::new(),
        }
    }

    /// Create a clock from `(replica, counter)` pairs. Zero entries are
    /// dropped so that explicit zeros and missing entries compare equal.
    pub fn from_entries(entries: impl IntoIterator<Item = (ReplicaId, u64)>) -> Self {
        VectorClock {
            entries: entries.into_iter().filter(|(_, n)| *n > 0).collect(),
        }
    }

    /// Get the counter for a replica, zero if absent.
    pub fn get(&self, replica_id: &str) -> u64 {
        self.entries.get(replica_id).copied().unwrap_or(0)
    }

    /// Increment the counter for a replica, returning the new value.
    pub fn increment(&mut self, replica_id: impl Into<ReplicaId>) -> u64 {
        let entry = self.entries.entry(replica_id.into()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Merge another clock into this one (elementwise max).
    pub fn merge(&mut self, other: &VectorClock) {
        for (replica_id, &counter) in &other.entries {
            let current = self.entries.entry(replica_id.clone()).or_insert(0);
            *current = (*current).max(counter);
        }
    }

    /// Create a merged clock without modifying self.
    pub fn merged_with(&self, other: &VectorClock) -> VectorClock {
        let mut result = self.clone();
        result.merge(other);
        result
    }

    /// Compare two clocks over the union of their keys.
    pub fn compare(&self, other: &VectorClock) -> ClockOrder {
        let mut less = false;
        let mut greater = false;

        for replica_id in self.entries.keys().chain(other.entries.keys()) {
            let a = self.get(replica_id);
            let b = other.get(replica_id);
            if a < b {
                less = true;
            } else if a > b {
                greater = true;
            }
        }

        match (less, greater) {
            (false, false) => ClockOrder::Equal,
            (true, false) => ClockOrder::Before,
            (false, true) => ClockOrder::After,
            (true, true) => ClockOrder::Concurrent,
        }
    }

    /// True if `self[r] >= other[r]` for every replica.
    pub fn dominates(&self, other: &VectorClock) -> bool {
        !matches!(
            self.compare(other),
            ClockOrder::Before | ClockOrder::Concurrent
        )
    }

    /// Iterate over the non-zero entries.
    pub fn iter(&self) -> impl Iterator<Item = (&ReplicaId, &u64)> {
        self.entries.iter()
    }

    /// Number of replicas tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no replica has been observed yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
