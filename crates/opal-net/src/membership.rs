//! The membership seam.
//!
//! Cluster membership is someone else's problem; the broadcast layer
//! only asks "who are my peers right now?". The static implementation
//! covers fixed clusters configured from a comma-separated peer list.

use opal_core::ReplicaId;

/// Source of the current peer set, excluding the local replica.
pub trait Membership: Send + Sync {
    fn other_members(&self) -> Vec<ReplicaId>;
}

/// A fixed peer set known at startup.
#[derive(Clone, Debug)]
pub struct StaticMembership {
    peers: Vec<ReplicaId>,
}

impl StaticMembership {
    /// Build from an explicit peer list; the local id is filtered out
    /// and duplicates collapse.
    pub fn new(local: &str, peers: impl IntoIterator<Item = ReplicaId>) -> Self {
        let mut peers: Vec<ReplicaId> = peers.into_iter().filter(|p| p != local).collect();
        peers.sort();
        peers.dedup();
        StaticMembership { peers }
    }

    /// Parse a comma-separated peer list, e.g. the value of a
    /// peer-discovery environment variable.
    pub fn from_peer_list(local: &str, list: &str) -> Self {
        Self::new(
            local,
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        )
    }
}

impl Membership for StaticMembership {
    fn other_members(&self) -> Vec<ReplicaId> {
        self.peers.clone()
    }
}
