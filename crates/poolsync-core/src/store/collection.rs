// ── Ordered reactive resource collection ──
//
// The accumulated view of one logical list. Pagers replace it, the push
// reconciler patches it, and screens subscribe to its snapshots through
// `watch` channels.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use tokio::sync::watch;

use crate::model::{Resource, ResourceId};
use crate::stream::CollectionStream;

/// An ordered, identity-keyed, reactive collection for one resource list.
///
/// Insertion order is fetch order; updates keep an item's position. Every
/// mutation bumps a version counter and republishes the snapshot that
/// subscribers receive.
pub struct ResourceCollection<T: Resource + Send + Sync + 'static> {
    /// Primary storage, in display order.
    entries: Mutex<IndexMap<ResourceId, Arc<T>>>,

    /// Version counter, bumped on every mutation.
    version: watch::Sender<u64>,

    /// Full snapshot, rebuilt on mutation for efficient subscription.
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
}

impl<T: Resource + Send + Sync + 'static> Default for ResourceCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Resource + Send + Sync + 'static> ResourceCollection<T> {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            entries: Mutex::new(IndexMap::new()),
            version,
            snapshot,
        }
    }

    /// Insert or update an entity. Returns `true` if the identity was new.
    pub fn upsert(&self, entity: T) -> bool {
        let mut entries = self.lock();
        let is_new = entries
            .insert(entity.resource_id(), Arc::new(entity))
            .is_none();
        self.publish(&entries);
        is_new
    }

    /// Replace an entity only if its identity is already present.
    pub fn update_existing(&self, entity: T) -> bool {
        let mut entries = self.lock();
        let Some(slot) = entries.get_mut(&entity.resource_id()) else {
            return false;
        };
        *slot = Arc::new(entity);
        self.publish(&entries);
        true
    }

    /// Remove an entity by identity. Order of the remaining items is kept.
    pub fn remove(&self, id: &ResourceId) -> Option<Arc<T>> {
        let mut entries = self.lock();
        let removed = entries.shift_remove(id);
        if removed.is_some() {
            self.publish(&entries);
        }
        removed
    }

    /// Replace the whole collection with `items`, deduplicating by identity.
    pub fn replace_all(&self, items: impl IntoIterator<Item = T>) -> usize {
        let mut entries = self.lock();
        entries.clear();
        for item in items {
            entries.insert(item.resource_id(), Arc::new(item));
        }
        self.publish(&entries);
        entries.len()
    }

    pub fn get(&self, id: &ResourceId) -> Option<Arc<T>> {
        self.lock().get(id).map(Arc::clone)
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.lock().contains_key(id)
    }

    /// Get the current snapshot (cheap `Arc` clone).
    pub fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> CollectionStream<T> {
        CollectionStream::new(self.snapshot.subscribe())
    }

    /// Monotonic mutation counter.
    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    /// Remove all entities.
    pub fn clear(&self) {
        let mut entries = self.lock();
        entries.clear();
        self.publish(&entries);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// All identities, in display order.
    pub fn ids(&self) -> Vec<ResourceId> {
        self.lock().keys().cloned().collect()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, IndexMap<ResourceId, Arc<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rebuild the snapshot while the entry lock is held so publications
    /// are observed in mutation order.
    fn publish(&self, entries: &IndexMap<ResourceId, Arc<T>>) {
        let values: Vec<Arc<T>> = entries.values().map(Arc::clone).collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
        self.version.send_modify(|v| *v += 1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, PartialEq)]
    struct Vm {
        id: u64,
        name: &'static str,
    }

    impl Resource for Vm {
        fn resource_id(&self) -> ResourceId {
            ResourceId::Numeric(self.id)
        }
    }

    fn vm(id: u64, name: &'static str) -> Vm {
        Vm { id, name }
    }

    fn names(col: &ResourceCollection<Vm>) -> Vec<&'static str> {
        col.snapshot().iter().map(|v| v.name).collect()
    }

    #[test]
    fn upsert_reports_new_identities() {
        let col = ResourceCollection::new();
        assert!(col.upsert(vm(1, "a")));
        assert!(!col.upsert(vm(1, "a2")));
        assert_eq!(col.len(), 1);
        assert_eq!(col.get(&ResourceId::Numeric(1)).unwrap().name, "a2");
    }

    #[test]
    fn updates_keep_position() {
        let col = ResourceCollection::new();
        col.upsert(vm(1, "a"));
        col.upsert(vm(2, "b"));
        col.upsert(vm(3, "c"));
        col.upsert(vm(2, "b2"));
        assert_eq!(names(&col), vec!["a", "b2", "c"]);
    }

    #[test]
    fn update_existing_ignores_absent_items() {
        let col = ResourceCollection::new();
        assert!(!col.update_existing(vm(9, "ghost")));
        assert!(col.is_empty());
    }

    #[test]
    fn remove_preserves_order_of_the_rest() {
        let col = ResourceCollection::new();
        col.replace_all(vec![vm(1, "a"), vm(2, "b"), vm(3, "c")]);
        let removed = col.remove(&ResourceId::Numeric(2));
        assert_eq!(removed.unwrap().name, "b");
        assert_eq!(names(&col), vec!["a", "c"]);
        assert!(col.remove(&ResourceId::Numeric(2)).is_none());
    }

    #[test]
    fn replace_all_drops_previous_items() {
        let col = ResourceCollection::new();
        col.upsert(vm(1, "a"));
        col.upsert(vm(2, "b"));
        assert_eq!(col.replace_all(vec![vm(3, "c"), vm(3, "c2")]), 1);
        assert_eq!(names(&col), vec!["c2"]);
    }

    #[test]
    fn every_mutation_bumps_version() {
        let col = ResourceCollection::new();
        let v0 = col.version();
        col.upsert(vm(1, "a"));
        col.remove(&ResourceId::Numeric(1));
        col.clear();
        assert_eq!(col.version(), v0 + 3);
        assert!(col.snapshot().is_empty());
    }
}
