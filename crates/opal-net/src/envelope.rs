//! The wire unit of dissemination: one effect with its causal metadata.

use opal_core::{Effect, ObjectKey, ReplicaId, VectorClock};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// One broadcast effect.
///
/// The clock is the origin's clock *after* the batch that produced the
/// effect; every envelope of a batch carries the same clock. The id is
/// unique per envelope and lets receivers drop duplicates, which the
/// transport is allowed to produce.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique identity of this envelope, minted at broadcast time.
    pub id: Ulid,
    /// The object the effect applies to.
    pub key: ObjectKey,
    /// The CRDT effect, opaque to this layer.
    pub effect: Effect,
    /// The replica the update originated on.
    pub origin: ReplicaId,
    /// The origin's clock after the originating batch.
    pub clock: VectorClock,
}

impl Envelope {
    pub fn new(key: ObjectKey, effect: Effect, origin: ReplicaId, clock: VectorClock) -> Self {
        Envelope {
            id: Ulid::new(),
            key,
            effect,
            origin,
            clock,
        }
    }
}
