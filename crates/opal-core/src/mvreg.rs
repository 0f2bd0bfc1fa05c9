//! Multi-value register.
//!
//! Each assign supersedes exactly the versions its origin had observed.
//! Concurrent assigns of different values therefore coexist until a
//! later assign observes them both.

use crate::clock::ReplicaId;
use crate::state::Elem;
use crate::token::Dot;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The downstream effect of one `assign`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterWrite {
    /// The assigned value.
    pub value: Elem,
    /// Fresh version minted for this write.
    pub version: Dot,
    /// Every version visible at the origin when the write happened.
    pub observed: BTreeSet<Dot>,
}

/// A multi-value register over byte-string values.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MvRegister {
    /// Surviving values, each carried by at least one version.
    values: BTreeMap<Elem, BTreeSet<Dot>>,
}

impl MvRegister {
    pub fn new() -> Self {
        MvRegister {
            values: BTreeMap::new(),
        }
    }

    /// Build the effect of `assign(value)` at this origin: a fresh
    /// version plus the full set of versions currently visible here.
    pub fn assign_effect(&self, origin: &ReplicaId, value: Elem) -> RegisterWrite {
        let observed = self
            .values
            .values()
            .flat_map(|dots| dots.iter().cloned())
            .collect();

        RegisterWrite {
            value,
            version: Dot::mint(origin.clone()),
            observed,
        }
    }

    /// Apply a write: retire every observed version, drop values left
    /// with no versions, then record the write's own version.
    pub fn apply(&mut self, write: &RegisterWrite) {
        for dots in self.values.values_mut() {
            dots.retain(|d| !write.observed.contains(d));
        }
        self.values.retain(|_, dots| !dots.is_empty());

        self.values
            .entry(write.value.clone())
            .or_default()
            .insert(write.version.clone());
    }

    /// The surviving values, deduplicated, in value order.
    pub fn values(&self) -> Vec<Elem> {
        self.values.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
