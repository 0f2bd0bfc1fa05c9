//! Add-wins set (observed-remove).
//!
//! Each add mints a unique token; a remove cancels only the add tokens
//! the origin had observed. A concurrent add and remove of the same
//! element leaves the element present, because the fresh add token is
//! not in the remove's observed set.

use crate::clock::ReplicaId;
use crate::state::Elem;
use crate::token::Token;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Add and remove tokens recorded for one element.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct TokenEntry {
    adds: BTreeSet<Token>,
    removes: BTreeSet<Token>,
}

impl TokenEntry {
    /// An element is live while it has an add token no remove observed.
    fn is_live(&self) -> bool {
        self.adds.difference(&self.removes).next().is_some()
    }
}

/// An add-wins set over byte-string elements.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwSet {
    entries: BTreeMap<Elem, TokenEntry>,
}

impl AwSet {
    pub fn new() -> Self {
        AwSet {
            entries: BTreeMap::new(),
        }
    }

    /// Mint one fresh token per element for an add or add-all.
    pub fn add_effect(origin: &ReplicaId, elems: &[Elem]) -> Vec<(Elem, Token)> {
        elems
            .iter()
            .map(|e| (e.clone(), Token::mint(origin.clone())))
            .collect()
    }

    /// Collect the observed add tokens for each element of a remove or
    /// remove-all. The observed set may be empty (removing an element
    /// this replica has never seen added), which makes the remove a
    /// no-op everywhere.
    pub fn remove_effect(&self, elems: &[Elem]) -> Vec<(Elem, BTreeSet<Token>)> {
        elems
            .iter()
            .map(|e| {
                let observed = self
                    .entries
                    .get(e)
                    .map(|entry| entry.adds.clone())
                    .unwrap_or_default();
                (e.clone(), observed)
            })
            .collect()
    }

    /// A reset removes every element currently present at the origin.
    pub fn reset_effect(&self) -> Vec<(Elem, BTreeSet<Token>)> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.is_live())
            .map(|(e, entry)| (e.clone(), entry.adds.clone()))
            .collect()
    }

    /// Apply an add effect: record each token under its element.
    pub fn apply_add(&mut self, pairs: &[(Elem, Token)]) {
        for (elem, token) in pairs {
            self.entries
                .entry(elem.clone())
                .or_default()
                .adds
                .insert(token.clone());
        }
    }

    /// Apply a remove effect: union the observed tokens into the
    /// element's remove set.
    pub fn apply_remove(&mut self, pairs: &[(Elem, BTreeSet<Token>)]) {
        for (elem, observed) in pairs {
            if observed.is_empty() {
                continue;
            }
            self.entries
                .entry(elem.clone())
                .or_default()
                .removes
                .extend(observed.iter().cloned());
        }
    }

    /// Membership test against the live view.
    pub fn contains(&self, elem: &Elem) -> bool {
        self.entries.get(elem).is_some_and(TokenEntry::is_live)
    }

    /// The live elements, in element order.
    pub fn elements(&self) -> Vec<Elem> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.is_live())
            .map(|(e, _)| e.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.values().filter(|e| e.is_live()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elem(s: &str) -> Elem {
        s.as_bytes().to_vec()
    }

    #[test]
    fn test_add_then_remove() {
        let mut set = AwSet::new();

        let add = AwSet::add_effect(&"r1".to_string(), &[elem("x")]);
        set.apply_add(&add);
        assert!(set.contains(&elem("x")));

        let remove = set.remove_effect(&[elem("x")]);
        set.apply_remove(&remove);
        assert!(!set.contains(&elem("x")));
        assert!(set.is_empty());
    }

    #[test]
    fn test_concurrent_add_wins_over_remove() {
        // a adds "x"; b removes "x" concurrently with an empty observed set.
        let mut a = AwSet::new();
        let mut b = AwSet::new();

        let add = AwSet::add_effect(&"a".to_string(), &[elem("x")]);
        let remove = b.remove_effect(&[elem("x")]);

        a.apply_add(&add);
        a.apply_remove(&remove);
        b.apply_remove(&remove);
        b.apply_add(&add);

        assert!(a.contains(&elem("x")));
        assert!(b.contains(&elem("x")));
        assert_eq!(a.elements(), b.elements());
    }

    #[test]
    fn test_remove_cancels_only_observed_adds() {
        let mut a = AwSet::new();
        let first = AwSet::add_effect(&"a".to_string(), &[elem("x")]);
        a.apply_add(&first);

        // Remove observes the first add only; a re-add survives it.
        let remove = a.remove_effect(&[elem("x")]);
        let second = AwSet::add_effect(&"a".to_string(), &[elem("x")]);

        a.apply_remove(&remove);
        a.apply_add(&second);
        assert!(a.contains(&elem("x")));
    }

    #[test]
    fn test_reset_clears_present_elements() {
        let mut set = AwSet::new();
        let add = AwSet::add_effect(&"r1".to_string(), &[elem("x"), elem("y")]);
        set.apply_add(&add);

        let reset = set.reset_effect();
        set.apply_remove(&reset);
        assert!(set.is_empty());
    }

    #[test]
    fn test_apply_is_idempotent() {
        let mut set = AwSet::new();
        let add = AwSet::add_effect(&"r1".to_string(), &[elem("x")]);

        set.apply_add(&add);
        let once = set.clone();
        set.apply_add(&add);
        assert_eq!(set, once);

        let remove = set.remove_effect(&[elem("x")]);
        set.apply_remove(&remove);
        let removed_once = set.clone();
        set.apply_remove(&remove);
        assert_eq!(set, removed_once);
    }

    #[test]
    fn test_add_all_mints_distinct_tokens() {
        let add = AwSet::add_effect(&"r1".to_string(), &[elem("x"), elem("y")]);
        assert_eq!(add.len(), 2);
        assert_ne!(add[0].1, add[1].1);
    }
}
