//! Operation-based PN-Counter.
//!
//! The state is a single integer; each increment or decrement produces a
//! signed delta that every replica adds in. Deltas commute, so replicas
//! that apply the same set of deltas agree on the total regardless of
//! order. Duplicate suppression is the engine's job: applying the same
//! delta twice double-counts.

use serde::{Deserialize, Serialize};

/// An operation-based positive-negative counter.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpCounter {
    total: i64,
}

impl OpCounter {
    pub fn new() -> Self {
        OpCounter { total: 0 }
    }

    /// Current value.
    pub fn value(&self) -> i64 {
        self.total
    }

    /// The downstream effect of `increment(amount)` or `decrement(amount)`.
    /// No state is consulted.
    pub fn delta(amount: u64, negate: bool) -> i64 {
        let n = amount.min(i64::MAX as u64) as i64;
        if negate {
            -n
        } else {
            n
        }
    }

    /// Apply a signed delta.
    pub fn apply(&mut self, delta: i64) {
        self.total = self.total.saturating_add(delta);
    }
}
