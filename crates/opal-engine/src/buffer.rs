//! Out-of-order effect buffer and the strict delivery predicate.
//!
//! An envelope is deliverable when the local clock already covers its
//! causal context: at most one new batch from the envelope's origin and
//! nothing new from anyone else. Everything else parks here until the
//! clock advances.

use opal_core::VectorClock;
use opal_net::Envelope;

/// Strict delivery predicate.
///
/// For an envelope with clock `E` from origin `O`, delivery requires
/// `E[O] <= local[O] + 1` and `E[r] <= local[r]` for every other
/// replica `r`. The origin bound admits equality because a batch sends
/// one envelope per effect and all of them carry the batch's clock:
/// after the first one merges that clock, its siblings — and late
/// stragglers of older batches — must still pass.
pub fn is_deliverable(envelope: &Envelope, local: &VectorClock) -> bool {
    for (replica_id, &counter) in envelope.clock.iter() {
        let bound = if *replica_id == envelope.origin {
            local.get(replica_id) + 1
        } else {
            local.get(replica_id)
        };
        if counter > bound {
            return false;
        }
    }
    true
}

/// Envelopes waiting for their causal predecessors.
#[derive(Debug, Default)]
pub struct EffectBuffer {
    parked: Vec<Envelope>,
}

impl EffectBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn park(&mut self, envelope: Envelope) {
        self.parked.push(envelope);
    }

    /// Remove and return every envelope deliverable at `clock`, in
    /// arrival order. Callers loop: applying one round can unblock the
    /// next.
    pub fn take_ready(&mut self, clock: &VectorClock) -> Vec<Envelope> {
        let (ready, parked): (Vec<_>, Vec<_>) = std::mem::take(&mut self.parked)
            .into_iter()
            .partition(|env| is_deliverable(env, clock));
        self.parked = parked;
        ready
    }

    pub fn len(&self) -> usize {
        self.parked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parked.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opal_core::{Effect, ObjectKey, TypeTag};

    fn envelope(origin: &str, clock: &[(&str, u64)]) -> Envelope {
        Envelope::new(
            ObjectKey::new("ns", TypeTag::CounterOb, "c"),
            Effect::CounterDelta(1),
            origin.to_string(),
            VectorClock::from_entries(clock.iter().map(|(r, n)| (r.to_string(), *n))),
        )
    }

    fn clock(entries: &[(&str, u64)]) -> VectorClock {
        VectorClock::from_entries(entries.iter().map(|(r, n)| (r.to_string(), *n)))
    }

    #[test]
    fn test_next_batch_from_origin_is_deliverable() {
        let local = clock(&[("a", 1)]);
        assert!(is_deliverable(&envelope("a", &[("a", 2)]), &local));
    }

    #[test]
    fn test_gap_from_origin_parks() {
        let local = clock(&[("a", 1)]);
        assert!(!is_deliverable(&envelope("a", &[("a", 3)]), &local));
    }

    #[test]
    fn test_unseen_third_party_dependency_parks() {
        // b's batch depends on a batch from c we have not seen.
        let local = clock(&[("b", 0)]);
        assert!(!is_deliverable(
            &envelope("b", &[("b", 1), ("c", 1)]),
            &local
        ));
        assert!(is_deliverable(
            &envelope("b", &[("b", 1), ("c", 1)]),
            &clock(&[("c", 1)])
        ));
    }

    #[test]
    fn test_batch_siblings_stay_deliverable() {
        // Two envelopes of one batch share the clock; after the first
        // merges it, the second must still pass.
        let local = clock(&[("a", 2)]);
        assert!(is_deliverable(&envelope("a", &[("a", 2)]), &local));
    }

    #[test]
    fn test_take_ready_drains_in_waves() {
        let mut buffer = EffectBuffer::new();
        buffer.park(envelope("a", &[("a", 2)]));
        buffer.park(envelope("a", &[("a", 1)]));

        let ready = buffer.take_ready(&VectorClock::new());
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].clock.get("a"), 1);
        assert_eq!(buffer.len(), 1);

        let ready = buffer.take_ready(&clock(&[("a", 1)]));
        assert_eq!(ready.len(), 1);
        assert!(buffer.is_empty());
    }
}
