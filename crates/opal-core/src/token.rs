//! Unique tokens and dots minted at the origin of an effect.
//!
//! A token tags a single add (or enable) so that a later remove (or
//! disable) can name exactly the adds it observed. Uniqueness comes from
//! a ULID, which combines a millisecond timestamp with random bits; two
//! mints on the same replica in the same millisecond still differ.

use crate::clock::ReplicaId;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// A globally unique tag for one add or enable operation.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Token {
    /// The replica that minted this token.
    pub replica_id: ReplicaId,
    /// Unique identifier for this specific mint.
    pub unique_id: Ulid,
}

impl Token {
    pub fn mint(replica_id: impl Into<ReplicaId>) -> Self {
        Token {
            replica_id: replica_id.into(),
            unique_id: Ulid::new(),
        }
    }
}

/// A unique version identifier for one register write.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Dot {
    /// The replica that performed the write.
    pub replica_id: ReplicaId,
    /// Unique identifier for this specific write.
    pub unique_id: Ulid,
}

impl Dot {
    pub fn mint(replica_id: impl Into<ReplicaId>) -> Self {
        Dot {
            replica_id: replica_id.into(),
            unique_id: Ulid::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mints_are_unique() {
        let a = Token::mint("r1");
        let b = Token::mint("r1");
        assert_ne!(a, b);
    }

    #[test]
    fn test_token_serialization() {
        let token = Token::mint("r1");
        let bytes = bincode::serialize(&token).unwrap();
        let back: Token = bincode::deserialize(&bytes).unwrap();
        assert_eq!(token, back);
    }
}
