//! Two-phase set.
//!
//! Two monotone halves: elements ever added and elements ever removed.
//! The value is their difference. Once removed, an element can never
//! reappear; a single-element re-add is rejected at the origin, while
//! the bulk operations silently drop offending elements.

use crate::error::DownstreamError;
use crate::state::Elem;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A two-phase set over byte-string elements.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TpSet {
    added: BTreeSet<Elem>,
    removed: BTreeSet<Elem>,
}

impl TpSet {
    pub fn new() -> Self {
        TpSet {
            added: BTreeSet::new(),
            removed: BTreeSet::new(),
        }
    }

    /// Effect of `add(e)`: rejected at origin if `e` was ever removed.
    pub fn add_effect(&self, elem: &Elem) -> Result<Vec<Elem>, DownstreamError> {
        if self.removed.contains(elem) {
            return Err(DownstreamError::AlreadyRemoved);
        }
        Ok(vec![elem.clone()])
    }

    /// Effect of `add_all(es)`: previously removed elements are dropped.
    pub fn add_all_effect(&self, elems: &[Elem]) -> Vec<Elem> {
        elems
            .iter()
            .filter(|e| !self.removed.contains(*e))
            .cloned()
            .collect()
    }

    /// Effect of `remove(e)`: rejected at origin if `e` was never added.
    pub fn remove_effect(&self, elem: &Elem) -> Result<Vec<Elem>, DownstreamError> {
        if !self.added.contains(elem) {
            return Err(DownstreamError::NotAdded);
        }
        Ok(vec![elem.clone()])
    }

    /// Effect of `remove_all(es)`: never-added elements are dropped.
    pub fn remove_all_effect(&self, elems: &[Elem]) -> Vec<Elem> {
        elems
            .iter()
            .filter(|e| self.added.contains(*e))
            .cloned()
            .collect()
    }

    /// Apply an add effect: union into the added half.
    pub fn apply_add(&mut self, elems: &[Elem]) {
        self.added.extend(elems.iter().cloned());
    }

    /// Apply a remove effect: union into the removed half.
    pub fn apply_remove(&mut self, elems: &[Elem]) {
        self.removed.extend(elems.iter().cloned());
    }

    pub fn contains(&self, elem: &Elem) -> bool {
        self.added.contains(elem) && !self.removed.contains(elem)
    }

    /// The visible elements: `added \ removed`.
    pub fn elements(&self) -> Vec<Elem> {
        self.added.difference(&self.removed).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.added.difference(&self.removed).count()
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
    fn test_add_remove_lifecycle() {
        let mut set = TpSet::new();

        let add = set.add_effect(&elem("u")).unwrap();
        set.apply_add(&add);
        assert!(set.contains(&elem("u")));

        let remove = set.remove_effect(&elem("u")).unwrap();
        set.apply_remove(&remove);
        assert!(!set.contains(&elem("u")));
    }

    #[test]
    fn test_readd_is_rejected_at_origin() {
        let mut set = TpSet::new();
        set.apply_add(&[elem("u")]);
        set.apply_remove(&[elem("u")]);

        assert_eq!(
            set.add_effect(&elem("u")),
            Err(DownstreamError::AlreadyRemoved)
        );
        assert!(set.is_empty());
    }

    #[test]
    fn test_remove_missing_is_rejected_at_origin() {
        let set = TpSet::new();
        assert_eq!(
            set.remove_effect(&elem("ghost")),
            Err(DownstreamError::NotAdded)
        );
    }

    #[test]
    fn test_bulk_ops_drop_offenders_silently() {
        let mut set = TpSet::new();
        set.apply_add(&[elem("a"), elem("b")]);
        set.apply_remove(&[elem("b")]);

        let added = set.add_all_effect(&[elem("b"), elem("c")]);
        assert_eq!(added, vec![elem("c")]);

        let removed = set.remove_all_effect(&[elem("a"), elem("ghost")]);
        assert_eq!(removed, vec![elem("a")]);
    }

    #[test]
    fn test_effects_commute() {
        let mut ab = TpSet::new();
        ab.apply_add(&[elem("x")]);
        ab.apply_remove(&[elem("x")]);

        let mut ba = TpSet::new();
        ba.apply_remove(&[elem("x")]);
        ba.apply_add(&[elem("x")]);

        assert_eq!(ab.elements(), ba.elements());
        assert!(ab.is_empty());
    }
}
