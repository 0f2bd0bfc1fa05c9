//! Enable-wins flag.
//!
//! Enables mint tokens; a disable cancels exactly the enable tokens its
//! origin observed. The flag reads true while some enable token has not
//! been observed by any disable, so a concurrent enable beats a
//! concurrent disable.

use crate::clock::ReplicaId;
use crate::token::Token;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An enable-wins boolean flag.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EwFlag {
    enables: BTreeSet<Token>,
    disables: BTreeSet<Token>,
}

impl EwFlag {
    pub fn new() -> Self {
        EwFlag {
            enables: BTreeSet::new(),
            disables: BTreeSet::new(),
        }
    }

    /// Mint the token carried by an enable effect. No state consulted.
    pub fn enable_effect(origin: &ReplicaId) -> Token {
        Token::mint(origin.clone())
    }

    /// The enable tokens observed at this origin, cancelled by a disable.
    pub fn disable_effect(&self) -> BTreeSet<Token> {
        self.enables.clone()
    }

    pub fn apply_enable(&mut self, token: &Token) {
        self.enables.insert(token.clone());
    }

    pub fn apply_disable(&mut self, observed: &BTreeSet<Token>) {
        self.disables.extend(observed.iter().cloned());
    }

    /// True while some enable token escaped every disable.
    pub fn value(&self) -> bool {
        !self.enables.is_subset(&self.disables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_disabled() {
        assert!(!EwFlag::new().value());
    }

    #[test]
    fn test_enable_then_disable() {
        let mut flag = EwFlag::new();

        let token = EwFlag::enable_effect(&"r1".to_string());
        flag.apply_enable(&token);
        assert!(flag.value());

        let observed = flag.disable_effect();
        flag.apply_disable(&observed);
        assert!(!flag.value());
    }

    #[test]
    fn test_concurrent_enable_wins() {
        let mut a = EwFlag::new();
        let mut b = EwFlag::new();

        // a enables; b disables concurrently having observed nothing.
        let token = EwFlag::enable_effect(&"a".to_string());
        let observed = b.disable_effect();

        a.apply_enable(&token);
        a.apply_disable(&observed);
        b.apply_disable(&observed);
        b.apply_enable(&token);

        assert!(a.value());
        assert!(b.value());
    }

    #[test]
    fn test_disable_cancels_only_observed_enables() {
        let mut flag = EwFlag::new();
        let first = EwFlag::enable_effect(&"r1".to_string());
        flag.apply_enable(&first);

        let observed = flag.disable_effect();
        let second = EwFlag::enable_effect(&"r1".to_string());

        flag.apply_disable(&observed);
        flag.apply_enable(&second);
        assert!(flag.value());
    }
}
