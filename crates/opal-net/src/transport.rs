//! Transport abstraction and the in-memory implementation.
//!
//! A transport moves one envelope to one peer. The in-memory hub wires
//! a whole local cluster together through per-replica channels, which
//! keeps envelope order per sender and lets tests and single-process
//! clusters run without sockets.

use crate::envelope::Envelope;
use async_trait::async_trait;
use opal_core::ReplicaId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("peer {0} is unreachable")]
    Unreachable(ReplicaId),
}

/// Moves envelopes to peers. Implementations must preserve the order of
/// envelopes sent to the same peer.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, peer: &ReplicaId, envelope: Envelope) -> Result<(), TransportError>;
}

type ReceiverMap = HashMap<ReplicaId, Vec<mpsc::UnboundedSender<Envelope>>>;

/// In-memory switchboard connecting the replicas of one process.
///
/// Each replica registers one or more receivers; sending to a replica
/// hands the envelope to every receiver it registered. Registration and
/// removal never block senders.
#[derive(Clone, Default)]
pub struct MemoryHub {
    receivers: Arc<RwLock<ReceiverMap>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a receiver for a replica.
    pub fn register_receiver(&self, replica: &str, tx: mpsc::UnboundedSender<Envelope>) {
        self.receivers
            .write()
            .entry(replica.to_string())
            .or_default()
            .push(tx);
    }

    /// Register and return the receiving end in one step.
    pub fn subscribe(&self, replica: &str) -> mpsc::UnboundedReceiver<Envelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.register_receiver(replica, tx);
        rx
    }

    /// Drop every receiver of a replica (peer churn).
    pub fn remove(&self, replica: &str) {
        self.receivers.write().remove(replica);
    }

    /// Build the transport half for this hub.
    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport { hub: self.clone() }
    }
}

/// Transport view over a [`MemoryHub`].
#[derive(Clone)]
pub struct MemoryTransport {
    hub: MemoryHub,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, peer: &ReplicaId, envelope: Envelope) -> Result<(), TransportError> {
        let mut receivers = self.hub.receivers.write();
        let Some(txs) = receivers.get_mut(peer) else {
            return Err(TransportError::Unreachable(peer.clone()));
        };

        // Prune receivers whose engine has gone away.
        txs.retain(|tx| tx.send(envelope.clone()).is_ok());
        if txs.is_empty() {
            receivers.remove(peer);
            return Err(TransportError::Unreachable(peer.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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
    async fn test_send_reaches_registered_receiver() {
        let hub = MemoryHub::new();
        let mut rx = hub.subscribe("b");

        hub.transport()
            .send(&"b".to_string(), envelope(1))
            .await
            .unwrap();

        let got = rx.recv().await.unwrap();
        assert_eq!(got.effect, Effect::CounterDelta(1));
    }

    #[tokio::test]
    async fn test_send_preserves_order() {
        let hub = MemoryHub::new();
        let mut rx = hub.subscribe("b");
        let transport = hub.transport();

        for n in 1..=5 {
            transport.send(&"b".to_string(), envelope(n)).await.unwrap();
        }

        for n in 1..=5 {
            assert_eq!(rx.recv().await.unwrap().effect, Effect::CounterDelta(n));
        }
    }

    #[tokio::test]
    async fn test_unknown_peer_is_unreachable() {
        let hub = MemoryHub::new();
        let err = hub
            .transport()
            .send(&"ghost".to_string(), envelope(1))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Unreachable("ghost".to_string()));
    }

    #[tokio::test]
    async fn test_dropped_receiver_becomes_unreachable() {
        let hub = MemoryHub::new();
        let rx = hub.subscribe("b");
        drop(rx);

        let err = hub
            .transport()
            .send(&"b".to_string(), envelope(1))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Unreachable("b".to_string()));
    }
}
