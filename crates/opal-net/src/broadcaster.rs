//! Fire-and-forget fan-out of effect envelopes.
//!
//! `broadcast` only enqueues; a single pump task drains the outbox and
//! sends each envelope to every current peer in order, so envelopes
//! from this origin reach any given peer in the order they were
//! broadcast. Send failures are counted and dropped (best-effort
//! delivery, no retransmission).

use crate::envelope::Envelope;
use crate::membership::Membership;
use crate::transport::Transport;
use opal_core::ReplicaId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Counters exposed through [`Broadcaster::stats`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BroadcastStats {
    /// Peers in the current membership view.
    pub peer_count: usize,
    /// Envelopes accepted for fan-out.
    pub enqueued: u64,
    /// Per-peer sends that failed and were dropped.
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    dropped: AtomicU64,
}

/// The engine-facing half of the broadcast layer.
#[derive(Clone)]
pub struct Broadcaster {
    origin: ReplicaId,
    membership: Arc<dyn Membership>,
    outbox: mpsc::UnboundedSender<Envelope>,
    counters: Arc<Counters>,
}

impl Broadcaster {
    /// Start the fan-out pump on the current runtime.
    pub fn spawn(
        origin: impl Into<ReplicaId>,
        membership: Arc<dyn Membership>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (outbox, rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());

        tokio::spawn(pump(rx, membership.clone(), transport, counters.clone()));

        Broadcaster {
            origin: origin.into(),
            membership,
            outbox,
            counters,
        }
    }

    /// The replica this broadcaster speaks for.
    pub fn origin(&self) -> &ReplicaId {
        &self.origin
    }

    /// Enqueue an envelope for fan-out and return immediately.
    pub fn broadcast(&self, envelope: Envelope) {
        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        // A closed outbox means the pump is gone (shutdown); nothing to do.
        let _ = self.outbox.send(envelope);
    }

    /// The current peer set, excluding this replica.
    pub fn members(&self) -> Vec<ReplicaId> {
        self.membership.other_members()
    }

    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            peer_count: self.membership.other_members().len(),
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

async fn pump(
    mut rx: mpsc::UnboundedReceiver<Envelope>,
    membership: Arc<dyn Membership>,
    transport: Arc<dyn Transport>,
    counters: Arc<Counters>,
) {
    while let Some(envelope) = rx.recv().await {
        for peer in membership.other_members() {
            if let Err(e) = transport.send(&peer, envelope.clone()).await {
                counters.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(peer = %peer, error = %e, "dropping envelope for peer");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::StaticMembership;
    use crate::transport::MemoryHub;
    use opal_core::{Effect, ObjectKey, TypeTag, VectorClock};

    fn envelope(n: i64) -> Envelope {
        Envelope::new(
            ObjectKey::new("ns", TypeTag::CounterOb, "c"),
            Effect::CounterDelta(n),
            "a".to_string(),
            VectorClock::new(),
        )
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_peer() {
        let hub = MemoryHub::new();
        let mut rx_b = hub.subscribe("b");
        let mut rx_c = hub.subscribe("c");

        let membership = Arc::new(StaticMembership::from_peer_list("a", "a,b,c"));
        let broadcaster = Broadcaster::spawn("a", membership, Arc::new(hub.transport()));

        broadcaster.broadcast(envelope(7));

        assert_eq!(rx_b.recv().await.unwrap().effect, Effect::CounterDelta(7));
        assert_eq!(rx_c.recv().await.unwrap().effect, Effect::CounterDelta(7));
    }

    #[tokio::test]
    async fn test_same_origin_order_is_preserved() {
        let hub = MemoryHub::new();
        let mut rx_b = hub.subscribe("b");

        let membership = Arc::new(StaticMembership::from_peer_list("a", "b"));
        let broadcaster = Broadcaster::spawn("a", membership, Arc::new(hub.transport()));

        for n in 1..=10 {
            broadcaster.broadcast(envelope(n));
        }
        for n in 1..=10 {
            assert_eq!(rx_b.recv().await.unwrap().effect, Effect::CounterDelta(n));
        }
    }

    #[tokio::test]
    async fn test_unreachable_peer_is_counted_not_fatal() {
        let hub = MemoryHub::new();
        let mut rx_b = hub.subscribe("b");

        // "ghost" has no receiver; "b" must still get everything.
        let membership = Arc::new(StaticMembership::from_peer_list("a", "b,ghost"));
        let broadcaster = Broadcaster::spawn("a", membership, Arc::new(hub.transport()));

        broadcaster.broadcast(envelope(1));
        assert_eq!(rx_b.recv().await.unwrap().effect, Effect::CounterDelta(1));

        let stats = broadcaster.stats();
        assert_eq!(stats.enqueued, 1);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.peer_count, 2);
    }
}
