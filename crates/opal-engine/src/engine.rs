//! The replica engine core: reads, update batches, remote delivery,
//! snapshots, and crash recovery.
//!
//! This type is synchronous and single-owner; the actor in
//! [`crate::actor`] serialises access to it. Every public method leaves
//! the engine consistent even when durability writes fail — the
//! in-memory state stays authoritative and I/O errors only degrade
//! durability until the next successful write.

use crate::buffer::{is_deliverable, EffectBuffer};
use crate::config::EngineConfig;
use crate::dedup::SeenSet;
use crate::error::EngineError;
use crate::store::ObjectStore;
use opal_core::{
    ClockOrder, CrdtOp, Effect, ObjectKey, ReplicaId, StoredObject, Value, VectorClock,
};
use opal_net::{Broadcaster, Envelope};
use opal_wal::{LogRecord, OpLog, SnapshotRecord, SnapshotStore, WalError};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// One update inside a client batch.
pub type Update = (ObjectKey, CrdtOp);

/// Point-in-time counters for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineStats {
    pub object_count: usize,
    pub log_sequence: u64,
    pub buffered_effects: usize,
    pub clock: VectorClock,
}

/// A single replica's engine state.
pub struct ReplicaEngine {
    id: ReplicaId,
    store: ObjectStore,
    clock: VectorClock,
    buffer: EffectBuffer,
    seen: SeenSet,
    log: OpLog,
    snapshots: SnapshotStore,
    log_sequence: u64,
    last_snapshot_seq: u64,
    last_snapshot_clock: VectorClock,
    broadcaster: Broadcaster,
    config: EngineConfig,
}

impl ReplicaEngine {
    /// Open the engine, running crash recovery against the data
    /// directory: load the snapshot if one exists, then replay every
    /// log record above its sequence without re-incrementing the clock
    /// and without re-broadcasting.
    pub fn open(
        id: impl Into<ReplicaId>,
        config: EngineConfig,
        broadcaster: Broadcaster,
    ) -> Result<Self, EngineError> {
        let id = id.into();
        let log = OpLog::open(config.data_dir.join("log"), config.log.clone()).map_err(io_err)?;
        let snapshots = SnapshotStore::open(&config.data_dir).map_err(io_err)?;

        let mut store = ObjectStore::new();
        let mut clock = VectorClock::new();
        let mut log_sequence = 0;
        let mut last_snapshot_seq = 0;
        let mut last_snapshot_clock = VectorClock::new();

        if let Some(snapshot) = snapshots.load().map_err(io_err)? {
            info!(
                replica = %id,
                log_sequence = snapshot.log_sequence,
                objects = snapshot.objects.len(),
                "loaded snapshot"
            );
            store = ObjectStore::from_objects(snapshot.objects);
            clock = snapshot.clock.clone();
            log_sequence = snapshot.log_sequence;
            last_snapshot_seq = snapshot.log_sequence;
            last_snapshot_clock = snapshot.clock;
        }

        let records = log.records_after(log_sequence).map_err(io_err)?;
        let replayed = records.len();
        for record in records {
            for (key, effect) in &record.effects {
                if let Err(e) = store.apply(key, effect) {
                    error!(key = %key, error = %e, "skipping mismatched effect during replay");
                }
            }
            clock.merge(&record.clock_after);
            log_sequence = record.sequence;
        }
        if replayed > 0 {
            info!(replica = %id, replayed, log_sequence, "replayed log records");
        }

        Ok(ReplicaEngine {
            id,
            store,
            clock,
            buffer: EffectBuffer::new(),
            seen: SeenSet::new(config.dedup_capacity),
            log,
            snapshots,
            log_sequence,
            last_snapshot_seq,
            last_snapshot_clock,
            broadcaster,
            config,
        })
    }

    pub fn id(&self) -> &ReplicaId {
        &self.id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &VectorClock {
        &self.clock
    }

    pub fn last_snapshot_clock(&self) -> &VectorClock {
        &self.last_snapshot_clock
    }

    /// Causal gating predicate: a request is ready unless its
    /// dependency clock is strictly ahead of the local clock.
    pub fn is_ready(&self, dependency: &VectorClock) -> bool {
        dependency.compare(&self.clock) != ClockOrder::After
    }

    /// Read the values of `keys`. The returned clock is the client's
    /// dependency clock merged with the local clock, for use as the
    /// dependency of the client's next request.
    pub fn read(
        &self,
        keys: &[ObjectKey],
        client_clock: &VectorClock,
    ) -> (Vec<(ObjectKey, Value)>, VectorClock) {
        let values = keys
            .iter()
            .map(|key| (key.clone(), self.store.value_of(key)))
            .collect();
        (values, client_clock.merged_with(&self.clock))
    }

    /// Execute a client update batch: merge the dependency clock, stage
    /// every effect, and only then commit, bump the clock once, log,
    /// and broadcast. The first origin rejection aborts the batch with
    /// no state change beyond the dependency merge.
    pub fn update(
        &mut self,
        batch: &[Update],
        client_clock: &VectorClock,
    ) -> Result<VectorClock, EngineError> {
        self.clock.merge(client_clock);

        let mut staged: BTreeMap<ObjectKey, StoredObject> = BTreeMap::new();
        let mut effects: Vec<(ObjectKey, Effect)> = Vec::new();

        for (key, op) in batch {
            let mut object = staged
                .remove(key)
                .or_else(|| self.store.get(key).cloned())
                .unwrap_or_else(|| StoredObject::new(key.tag));

            let effect = object.state.downstream(&self.id, op)?;
            object
                .state
                .apply(&effect)
                .map_err(|e| EngineError::InvalidOp {
                    op: op.name(),
                    tag: e.tag,
                })?;
            object.version += 1;

            staged.insert(key.clone(), object);
            effects.push((key.clone(), effect));
        }

        // The whole batch produced effects; commit it.
        for (key, object) in staged {
            self.store.insert(key, object);
        }
        self.clock.increment(self.id.clone());
        self.log_sequence += 1;

        let record = LogRecord {
            sequence: self.log_sequence,
            effects: effects.clone(),
            clock_after: self.clock.clone(),
        };
        if let Err(e) = self.log.append(&record) {
            // In-memory state stays authoritative; durability degrades
            // until the next successful write.
            error!(sequence = record.sequence, error = %e, "log append failed");
        }

        for (key, effect) in effects {
            self.broadcaster.broadcast(Envelope::new(
                key,
                effect,
                self.id.clone(),
                self.clock.clone(),
            ));
        }

        if self.config.snapshot_interval > 0 && self.log_sequence % self.config.snapshot_interval == 0
        {
            if let Err(e) = self.snapshot_now() {
                error!(error = %e, "interval snapshot failed");
            }
        }

        Ok(self.clock.clone())
    }

    /// Deliver a remote envelope. Duplicates are dropped, causally
    /// premature envelopes are parked, and every application drains the
    /// buffer to a fixpoint. Returns the number of effects applied; a
    /// non-zero return means the clock advanced and gated requests may
    /// have become ready.
    pub fn deliver(&mut self, envelope: Envelope) -> usize {
        if !self.seen.insert(envelope.id) {
            debug!(id = %envelope.id, origin = %envelope.origin, "dropping duplicate envelope");
            return 0;
        }

        if !is_deliverable(&envelope, &self.clock) {
            debug!(
                origin = %envelope.origin,
                buffered = self.buffer.len() + 1,
                "parking out-of-order envelope"
            );
            self.buffer.park(envelope);
            return 0;
        }

        let mut applied = self.apply_envelope(envelope);
        loop {
            let ready = self.buffer.take_ready(&self.clock);
            if ready.is_empty() {
                break;
            }
            for envelope in ready {
                applied += self.apply_envelope(envelope);
            }
        }
        applied
    }

    fn apply_envelope(&mut self, envelope: Envelope) -> usize {
        if let Err(e) = self.store.apply(&envelope.key, &envelope.effect) {
            // Effects are dispatched by the key's type tag, so only a
            // corrupted peer can produce a mismatch.
            error!(key = %envelope.key, error = %e, "ignoring mismatched remote effect");
            return 0;
        }
        self.clock.merge(&envelope.clock);
        1
    }

    /// Write a snapshot of the current state and recycle covered log
    /// segments.
    pub fn snapshot_now(&mut self) -> Result<(), EngineError> {
        let record = SnapshotRecord {
            objects: self.store.objects().clone(),
            clock: self.clock.clone(),
            log_sequence: self.log_sequence,
        };
        self.snapshots.save(&record).map_err(io_err)?;
        self.last_snapshot_seq = self.log_sequence;
        self.last_snapshot_clock = record.clock;

        if let Err(e) = self.log.recycle(self.last_snapshot_seq) {
            warn!(error = %e, "log recycling failed");
        }
        Ok(())
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            object_count: self.store.len(),
            log_sequence: self.log_sequence,
            buffered_effects: self.buffer.len(),
            clock: self.clock.clone(),
        }
    }
}

fn io_err(e: WalError) -> EngineError {
    EngineError::IoFailed(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opal_core::TypeTag;
    use opal_net::{MemoryHub, StaticMembership};
    use std::sync::Arc;

    fn engine_at(dir: &std::path::Path, id: &str) -> ReplicaEngine {
        let hub = MemoryHub::new();
        let membership = Arc::new(StaticMembership::from_peer_list(id, ""));
        let broadcaster = Broadcaster::spawn(id, membership, Arc::new(hub.transport()));
        ReplicaEngine::open(id, EngineConfig::new(dir), broadcaster).unwrap()
    }

    fn counter_key() -> ObjectKey {
        ObjectKey::new("ns", TypeTag::CounterOb, "c")
    }

    #[tokio::test]
    async fn test_update_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine_at(dir.path(), "a");

        let clock = engine
            .update(
                &[(counter_key(), CrdtOp::Increment { amount: 42 })],
                &VectorClock::new(),
            )
            .unwrap();
        assert_eq!(clock.get("a"), 1);

        let (values, read_clock) = engine.read(&[counter_key()], &VectorClock::new());
        assert_eq!(values[0].1, Value::Count(42));
        assert_eq!(read_clock.get("a"), 1);
    }

    #[tokio::test]
    async fn test_batch_is_atomic_on_rejection() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine_at(dir.path(), "a");
        let set_key = ObjectKey::new("ns", TypeTag::TpSet, "s");

        // Prime: add and remove "u" so a re-add rejects.
        engine
            .update(
                &[(set_key.clone(), CrdtOp::Add { elem: b"u".to_vec() })],
                &VectorClock::new(),
            )
            .unwrap();
        engine
            .update(
                &[(set_key.clone(), CrdtOp::Remove { elem: b"u".to_vec() })],
                &VectorClock::new(),
            )
            .unwrap();
        let clock_before = engine.clock().clone();

        // A batch whose second update rejects leaves no trace of its first.
        let err = engine
            .update(
                &[
                    (counter_key(), CrdtOp::Increment { amount: 5 }),
                    (set_key.clone(), CrdtOp::Add { elem: b"u".to_vec() }),
                ],
                &VectorClock::new(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::DownstreamFailed(_)));

        assert_eq!(engine.store.value_of(&counter_key()), Value::Count(0));
        assert_eq!(engine.clock(), &clock_before);
        assert_eq!(engine.stats().log_sequence, 2);
    }

    #[tokio::test]
    async fn test_clock_increments_once_per_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine_at(dir.path(), "a");

        let clock = engine
            .update(
                &[
                    (counter_key(), CrdtOp::Increment { amount: 1 }),
                    (counter_key(), CrdtOp::Increment { amount: 2 }),
                    (
                        ObjectKey::new("ns", TypeTag::EwFlag, "f"),
                        CrdtOp::Enable,
                    ),
                ],
                &VectorClock::new(),
            )
            .unwrap();

        assert_eq!(clock.get("a"), 1);
        assert_eq!(engine.store.value_of(&counter_key()), Value::Count(3));
    }

    #[tokio::test]
    async fn test_deliver_applies_and_merges_clock() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine_at(dir.path(), "a");

        let mut remote_clock = VectorClock::new();
        remote_clock.increment("b");
        let envelope = Envelope::new(
            counter_key(),
            Effect::CounterDelta(7),
            "b".to_string(),
            remote_clock.clone(),
        );

        assert_eq!(engine.deliver(envelope.clone()), 1);
        assert_eq!(engine.store.value_of(&counter_key()), Value::Count(7));
        assert_eq!(engine.clock().get("b"), 1);

        // The same envelope again is a duplicate.
        assert_eq!(engine.deliver(envelope), 0);
        assert_eq!(engine.store.value_of(&counter_key()), Value::Count(7));
    }

    #[tokio::test]
    async fn test_out_of_order_delivery_is_buffered() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine_at(dir.path(), "a");

        let clock1 = VectorClock::from_entries([("b".to_string(), 1)]);
        let clock2 = VectorClock::from_entries([("b".to_string(), 2)]);
        let first = Envelope::new(
            counter_key(),
            Effect::CounterDelta(1),
            "b".to_string(),
            clock1,
        );
        let second = Envelope::new(
            counter_key(),
            Effect::CounterDelta(10),
            "b".to_string(),
            clock2,
        );

        // Batch 2 before batch 1: parked.
        assert_eq!(engine.deliver(second), 0);
        assert_eq!(engine.stats().buffered_effects, 1);
        assert_eq!(engine.store.value_of(&counter_key()), Value::Count(0));

        // Batch 1 arrives and unblocks batch 2.
        assert_eq!(engine.deliver(first), 2);
        assert_eq!(engine.store.value_of(&counter_key()), Value::Count(11));
        assert_eq!(engine.clock().get("b"), 2);
        assert_eq!(engine.stats().buffered_effects, 0);
    }

    #[tokio::test]
    async fn test_gating_predicate() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine_at(dir.path(), "a");
        engine
            .update(
                &[(counter_key(), CrdtOp::Increment { amount: 1 })],
                &VectorClock::new(),
            )
            .unwrap();

        // Equal, before, and concurrent dependencies are ready.
        assert!(engine.is_ready(&VectorClock::new()));
        assert!(engine.is_ready(&VectorClock::from_entries([("a".to_string(), 1)])));
        assert!(engine.is_ready(&VectorClock::from_entries([
            ("a".to_string(), 1),
            ("b".to_string(), 1)
        ])));
        assert!(engine.is_ready(&VectorClock::from_entries([("b".to_string(), 1)])));

        // A dependency strictly ahead is not.
        assert!(!engine.is_ready(&VectorClock::from_entries([("a".to_string(), 2)])));
    }

    #[tokio::test]
    async fn test_recovery_from_log_replay() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut engine = engine_at(dir.path(), "a");
            for _ in 0..5 {
                engine
                    .update(
                        &[(counter_key(), CrdtOp::Increment { amount: 1 })],
                        &VectorClock::new(),
                    )
                    .unwrap();
            }
        }

        let engine = engine_at(dir.path(), "a");
        assert_eq!(engine.store.value_of(&counter_key()), Value::Count(5));
        assert_eq!(engine.clock().get("a"), 5);
        assert_eq!(engine.stats().log_sequence, 5);
    }

    #[tokio::test]
    async fn test_recovery_combines_snapshot_and_replay() {
        let dir = tempfile::tempdir().unwrap();
        {
            let hub = MemoryHub::new();
            let membership = Arc::new(StaticMembership::from_peer_list("a", ""));
            let broadcaster = Broadcaster::spawn("a", membership, Arc::new(hub.transport()));
            let mut config = EngineConfig::new(dir.path());
            config.snapshot_interval = 100;
            let mut engine = ReplicaEngine::open("a", config, broadcaster).unwrap();

            for _ in 0..105 {
                engine
                    .update(
                        &[(counter_key(), CrdtOp::Increment { amount: 1 })],
                        &VectorClock::new(),
                    )
                    .unwrap();
            }
            assert_eq!(engine.last_snapshot_clock().get("a"), 100);
        }

        // Snapshot at 100 plus five replayed records.
        let engine = engine_at(dir.path(), "a");
        assert_eq!(engine.store.value_of(&counter_key()), Value::Count(105));
        assert_eq!(engine.stats().log_sequence, 105);
    }

    #[tokio::test]
    async fn test_remote_effects_survive_via_snapshot_only() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut engine = engine_at(dir.path(), "a");
            let remote_clock = VectorClock::from_entries([("b".to_string(), 1)]);
            engine.deliver(Envelope::new(
                counter_key(),
                Effect::CounterDelta(9),
                "b".to_string(),
                remote_clock,
            ));
            engine.snapshot_now().unwrap();
        }

        let engine = engine_at(dir.path(), "a");
        assert_eq!(engine.store.value_of(&counter_key()), Value::Count(9));
        assert_eq!(engine.clock().get("b"), 1);
    }
}
