//! The materialized snapshot: an ordered key-to-value map.
//!
//! The store is a plain container: it is only ever mutated by applying a
//! fully drained pending batch (see the batcher), or cleared wholesale when
//! the source set changes. Reads clone values out; nothing observes the map
//! in place.

use std::collections::BTreeMap;

use crate::event::{ChangeEvent, ObjectKey, ObjectValue};

// ---------------------------------------------------------------------------
// SnapshotStore
// ---------------------------------------------------------------------------

/// Ordered mapping from object key to the object's current value.
///
/// Add events insert or replace, delete events remove if present. Deleting
/// an unknown key is a no-op, so tombstones are idempotent.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    entries: BTreeMap<ObjectKey, ObjectValue>,
}

impl SnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one drained event.
    pub fn apply(&mut self, event: ChangeEvent) {
        match event {
            ChangeEvent::Add { key, value } => {
                self.entries.insert(key, value);
            }
            ChangeEvent::Delete { key } => {
                self.entries.remove(&key);
            }
        }
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns the value stored under `key`, if any.
    #[must_use]
    pub fn get(&self, key: &ObjectKey) -> Option<&ObjectValue> {
        self.entries.get(key)
    }

    /// Returns a clone of every stored value, in key order.
    #[must_use]
    pub fn values(&self) -> Vec<ObjectValue> {
        self.entries.values().cloned().collect()
    }

    /// Returns every stored key, in order.
    #[must_use]
    pub fn keys(&self) -> Vec<ObjectKey> {
        self.entries.keys().cloned().collect()
    }

    /// Returns the number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the store holds no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // --- Apply semantics ---

    #[test]
    fn test_add_inserts_and_replaces() {
        let mut store = SnapshotStore::new();
        store.apply(ChangeEvent::add("a", json!(1)));
        assert_eq!(store.get(&"a".into()), Some(&json!(1)));

        store.apply(ChangeEvent::add("a", json!(2)));
        assert_eq!(store.get(&"a".into()), Some(&json!(2)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_delete_removes() {
        let mut store = SnapshotStore::new();
        store.apply(ChangeEvent::add("a", json!(1)));
        store.apply(ChangeEvent::delete("a"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_delete_unknown_key_is_noop() {
        let mut store = SnapshotStore::new();
        store.apply(ChangeEvent::delete("ghost"));
        assert!(store.is_empty());

        store.apply(ChangeEvent::add("a", json!(1)));
        store.apply(ChangeEvent::delete("ghost"));
        assert_eq!(store.len(), 1);
    }

    // --- Reads ---

    #[test]
    fn test_values_in_key_order() {
        let mut store = SnapshotStore::new();
        store.apply(ChangeEvent::add("b", json!("beta")));
        store.apply(ChangeEvent::add("a", json!("alpha")));
        store.apply(ChangeEvent::add("c", json!("gamma")));

        assert_eq!(store.values(), vec![json!("alpha"), json!("beta"), json!("gamma")]);
        assert_eq!(
            store.keys(),
            vec![ObjectKey::from("a"), "b".into(), "c".into()]
        );
    }

    #[test]
    fn test_clear() {
        let mut store = SnapshotStore::new();
        store.apply(ChangeEvent::add("a", json!(1)));
        store.apply(ChangeEvent::add("b", json!(2)));
        store.clear();
        assert!(store.is_empty());
        assert!(store.values().is_empty());
    }
}
