//! State-based PN-Counter.
//!
//! Two per-replica buckets, one for increments and one for decrements;
//! the value is `sum(increments) - sum(decrements)`. Effects add into
//! the origin's bucket; merge takes the componentwise max. Both are
//! monotone on the bucket lattice, so effect delivery and full-state
//! merge can be mixed freely.

use crate::clock::ReplicaId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Direction of a counter shift.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CounterDir {
    Increment,
    Decrement,
}

/// A state-based positive-negative counter.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PnCounter {
    /// Per-replica increment totals.
    increments: BTreeMap<ReplicaId, u64>,
    /// Per-replica decrement totals.
    decrements: BTreeMap<ReplicaId, u64>,
}

impl PnCounter {
    pub fn new() -> Self {
        PnCounter {
            increments: BTreeMap::new(),
            decrements: BTreeMap::new(),
        }
    }

    /// Apply a shift effect: add `amount` into the origin's bucket.
    pub fn apply(&mut self, dir: CounterDir, origin: &str, amount: u64) {
        let bucket = match dir {
            CounterDir::Increment => &mut self.increments,
            CounterDir::Decrement => &mut self.decrements,
        };
        let entry = bucket.entry(origin.to_string()).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    /// Current value: total increments minus total decrements.
    pub fn value(&self) -> i64 {
        let inc: u64 = self.increments.values().sum();
        let dec: u64 = self.decrements.values().sum();
        (inc as i64).saturating_sub(dec as i64)
    }

    /// Increment total recorded for a replica.
    pub fn get_increment(&self, replica_id: &str) -> u64 {
        self.increments.get(replica_id).copied().unwrap_or(0)
    }

    /// Decrement total recorded for a replica.
    pub fn get_decrement(&self, replica_id: &str) -> u64 {
        self.decrements.get(replica_id).copied().unwrap_or(0)
    }

    /// Merge another counter into this one, componentwise max per bucket.
    pub fn merge(&mut self, other: &PnCounter) {
        for (replica_id, &n) in &other.increments {
            let entry = self.increments.entry(replica_id.clone()).or_insert(0);
            *entry = (*entry).max(n);
        }
        for (replica_id, &n) in &other.decrements {
            let entry = self.decrements.entry(replica_id.clone()).or_insert(0);
            *entry = (*entry).max(n);
        }
    }
}
