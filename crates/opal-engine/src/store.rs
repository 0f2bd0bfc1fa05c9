//! The per-replica object store.
//!
//! Objects are born lazily at first touch with their type's fresh state
//! and are never destroyed. Each object carries a per-key version that
//! counts applied effects; it is bookkeeping for diagnostics, not part
//! of convergence.

use opal_core::{CrdtState, Effect, ObjectKey, StoredObject, TypeMismatch, Value};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct ObjectStore {
    objects: BTreeMap<ObjectKey, StoredObject>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from a snapshot's object map.
    pub fn from_objects(objects: BTreeMap<ObjectKey, StoredObject>) -> Self {
        ObjectStore { objects }
    }

    pub fn get(&self, key: &ObjectKey) -> Option<&StoredObject> {
        self.objects.get(key)
    }

    /// Look up an object, creating it at first touch.
    pub fn get_or_create(&mut self, key: &ObjectKey) -> &mut StoredObject {
        self.objects
            .entry(key.clone())
            .or_insert_with(|| StoredObject::new(key.tag))
    }

    /// The observable value for a key. A key never touched reads as the
    /// type's fresh value without being materialised.
    pub fn value_of(&self, key: &ObjectKey) -> Value {
        match self.objects.get(key) {
            Some(object) => object.state.value(),
            None => CrdtState::new_for(key.tag).value(),
        }
    }

    /// Apply one effect to the keyed object, bumping its version.
    pub fn apply(&mut self, key: &ObjectKey, effect: &Effect) -> Result<(), TypeMismatch> {
        let object = self.get_or_create(key);
        object.state.apply(effect)?;
        object.version += 1;
        Ok(())
    }

    /// Replace an object wholesale (commit of a staged batch).
    pub fn insert(&mut self, key: ObjectKey, object: StoredObject) {
        self.objects.insert(key, object);
    }

    /// The full object map, for snapshots.
    pub fn objects(&self) -> &BTreeMap<ObjectKey, StoredObject> {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
