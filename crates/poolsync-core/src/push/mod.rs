// ── Push reconciliation ──
//
// Applies server-originated change events to a collection the pager also
// writes to. Deliveries are deduplicated against a ledger owned by the
// reconciler; a key stays live until it is dismissed, its resource is
// deleted, or a newer content-keyed event for the resource supersedes it.

mod hub;
mod ledger;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::model::{PushEvent, PushOperation, Resource, ResourceKind};
use crate::store::ResourceCollection;

pub use hub::PushHub;
pub use ledger::{DeliveryKey, DeliveryLedger, LiveEvent};

/// Subscription capability for one kind of resource.
///
/// Dropping the returned stream unsubscribes.
pub trait PushSource<T>: Send + Sync + 'static {
    fn subscribe(&self, kind: &ResourceKind) -> BoxStream<'static, Arc<PushEvent<T>>>;
}

/// What a delivery did to the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Effect {
    Inserted,
    Updated,
    Removed,
}

/// Outcome of [`PushReconciler::deliver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Applied(Effect),
    /// The key is live; nothing happened.
    Duplicate,
    /// Accepted but had no effect: update or delete of an absent item, an
    /// event without payload, or a torn-down reconciler.
    Ignored,
}

/// Running counters, mostly for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PushStats {
    pub delivered: u64,
    pub duplicates: u64,
    pub applied: u64,
    pub ignored: u64,
    pub dismissed: u64,
}

type DismissListener<T> = Arc<dyn Fn(&LiveEvent<T>) + Send + Sync>;

/// Reconciles push events into a [`ResourceCollection`].
///
/// Cloning yields another handle to the same reconciler. Attached delivery
/// tasks stop once [`teardown`](Self::teardown) is called or every handle
/// is dropped.
pub struct PushReconciler<T: Resource + Serialize + Clone + Send + Sync + 'static> {
    inner: Arc<Inner<T>>,
}

impl<T: Resource + Serialize + Clone + Send + Sync + 'static> Clone for PushReconciler<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<T: Resource + Send + Sync + 'static> {
    collection: Arc<ResourceCollection<T>>,
    ledger: Mutex<DeliveryLedger<T>>,
    live: watch::Sender<Arc<Vec<LiveEvent<T>>>>,
    stats: watch::Sender<PushStats>,
    listeners: Mutex<Vec<DismissListener<T>>>,
    mounted: CancellationToken,
}

impl<T: Resource + Serialize + Clone + Send + Sync + 'static> PushReconciler<T> {
    pub fn new(collection: Arc<ResourceCollection<T>>) -> Self {
        let (live, _) = watch::channel(Arc::new(Vec::new()));
        let (stats, _) = watch::channel(PushStats::default());
        Self {
            inner: Arc::new(Inner {
                collection,
                ledger: Mutex::new(DeliveryLedger::new()),
                live,
                stats,
                listeners: Mutex::new(Vec::new()),
                mounted: CancellationToken::new(),
            }),
        }
    }

    pub fn collection(&self) -> &Arc<ResourceCollection<T>> {
        &self.inner.collection
    }

    pub fn deliver(&self, event: PushEvent<T>) -> Delivery {
        self.inner.deliver(Arc::new(event))
    }

    /// Settle a live event. A later delivery with the same key is new.
    pub fn dismiss(&self, key: &DeliveryKey) -> bool {
        let removed = {
            let mut ledger = self.inner.ledger();
            let removed = ledger.dismiss(key);
            if removed.is_some() {
                self.inner.publish_live(&ledger);
            }
            removed
        };
        match removed {
            Some(entry) => {
                trace!(%key, "push event dismissed");
                self.inner.notify_dismissed(std::slice::from_ref(&entry));
                true
            }
            None => false,
        }
    }

    /// Run `listener` for every dismissed live event, including those
    /// evicted by a delete. Called with no reconciler lock held.
    pub fn on_dismiss(&self, listener: impl Fn(&LiveEvent<T>) + Send + Sync + 'static) {
        self.inner.listeners().push(Arc::new(listener));
    }

    /// Deliver every `kind` event from `source` until teardown.
    pub fn attach(
        &self,
        source: &dyn PushSource<T>,
        kind: impl Into<ResourceKind>,
    ) -> JoinHandle<()> {
        let kind = kind.into();
        let mut events = source.subscribe(&kind);
        let weak: Weak<Inner<T>> = Arc::downgrade(&self.inner);
        let mounted = self.inner.mounted.clone();
        debug!(%kind, "push source attached");
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    () = mounted.cancelled() => break,
                    event = events.next() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.deliver(event);
            }
            debug!(%kind, "push source detached");
        })
    }

    /// Snapshot of live events, oldest first.
    pub fn live_events(&self) -> Arc<Vec<LiveEvent<T>>> {
        self.inner.live.borrow().clone()
    }

    pub fn stats(&self) -> PushStats {
        *self.inner.stats.borrow()
    }

    pub fn subscribe_stats(&self) -> watch::Receiver<PushStats> {
        self.inner.stats.subscribe()
    }

    pub fn ledger_len(&self) -> usize {
        self.inner.ledger().len()
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.mounted.is_cancelled()
    }

    /// Stop attached sources, clear the ledger and drop listeners.
    pub fn teardown(&self) {
        self.inner.mounted.cancel();
        {
            let mut ledger = self.inner.ledger();
            ledger.clear();
            self.inner.publish_live(&ledger);
        }
        self.inner.listeners().clear();
        debug!("push reconciler torn down");
    }
}

impl<T: Resource + Serialize + Clone + Send + Sync + 'static> Inner<T> {
    fn deliver(&self, event: Arc<PushEvent<T>>) -> Delivery {
        if self.mounted.is_cancelled() {
            trace!(kind = %event.kind, id = %event.resource_id, "delivery after teardown");
            return Delivery::Ignored;
        }

        let key = DeliveryKey::for_event(event.as_ref());
        let mut evicted = Vec::new();
        let outcome = {
            let mut ledger = self.ledger();
            if key.as_ref().is_some_and(|key| ledger.contains(key)) {
                trace!(key = ?key, "duplicate delivery");
                Delivery::Duplicate
            } else {
                let outcome = match event.operation {
                    PushOperation::Delete => {
                        evicted = ledger.evict_resource(&event.kind, &event.resource_id);
                        self.apply_delete(&event)
                    }
                    PushOperation::Create | PushOperation::Update => {
                        evicted = ledger.supersede(&event.kind, &event.resource_id);
                        if let Some(key) = key {
                            ledger.record(key, Arc::clone(&event));
                        }
                        self.apply_upsert(&event)
                    }
                };
                self.publish_live(&ledger);
                outcome
            }
        };

        self.stats.send_modify(|s| {
            s.delivered += 1;
            match outcome {
                Delivery::Applied(_) => s.applied += 1,
                Delivery::Duplicate => s.duplicates += 1,
                Delivery::Ignored => s.ignored += 1,
            }
        });
        if !evicted.is_empty() {
            self.notify_dismissed(&evicted);
        }
        outcome
    }

    fn apply_delete(&self, event: &PushEvent<T>) -> Delivery {
        match self.collection.remove(&event.resource_id) {
            Some(_) => {
                debug!(kind = %event.kind, id = %event.resource_id, "push delete applied");
                Delivery::Applied(Effect::Removed)
            }
            None => {
                trace!(kind = %event.kind, id = %event.resource_id, "delete of absent item");
                Delivery::Ignored
            }
        }
    }

    fn apply_upsert(&self, event: &PushEvent<T>) -> Delivery {
        let Some(payload) = event.payload.clone() else {
            warn!(
                kind = %event.kind,
                id = %event.resource_id,
                operation = %event.operation,
                "push event without payload"
            );
            return Delivery::Ignored;
        };
        if payload.resource_id() != event.resource_id {
            warn!(
                kind = %event.kind,
                id = %event.resource_id,
                payload_id = %payload.resource_id(),
                "push payload identity mismatch"
            );
            return Delivery::Ignored;
        }

        let effect = match event.operation {
            PushOperation::Create => {
                if self.collection.upsert(payload) {
                    Effect::Inserted
                } else {
                    Effect::Updated
                }
            }
            PushOperation::Update | PushOperation::Delete => {
                if !self.collection.update_existing(payload) {
                    // The next pull returns the current server state.
                    debug!(
                        kind = %event.kind,
                        id = %event.resource_id,
                        "update of absent item dropped"
                    );
                    return Delivery::Ignored;
                }
                Effect::Updated
            }
        };
        debug!(kind = %event.kind, id = %event.resource_id, %effect, "push event applied");
        Delivery::Applied(effect)
    }

    fn notify_dismissed(&self, entries: &[LiveEvent<T>]) {
        let dismissed = u64::try_from(entries.len()).unwrap_or(u64::MAX);
        self.stats.send_modify(|s| s.dismissed += dismissed);
        let listeners: Vec<DismissListener<T>> = self.listeners().clone();
        for entry in entries {
            for listener in &listeners {
                listener(entry);
            }
        }
    }

    fn publish_live(&self, ledger: &DeliveryLedger<T>) {
        let live = Arc::new(ledger.live());
        self.live.send_modify(|snap| *snap = live);
    }

    fn ledger(&self) -> MutexGuard<'_, DeliveryLedger<T>> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listeners(&self) -> MutexGuard<'_, Vec<DismissListener<T>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Resource + Send + Sync + 'static> Drop for Inner<T> {
    fn drop(&mut self) {
        self.mounted.cancel();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use serde::Deserialize;

    use super::*;
    use crate::model::ResourceId;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Vm {
        id: u64,
        state: String,
    }

    impl Resource for Vm {
        fn resource_id(&self) -> ResourceId {
            ResourceId::Numeric(self.id)
        }
    }

    fn vm(id: u64, state: &str) -> Vm {
        Vm {
            id,
            state: state.to_owned(),
        }
    }

    fn reconciler_with(ids: &[u64]) -> PushReconciler<Vm> {
        let collection = Arc::new(ResourceCollection::new());
        collection.replace_all(ids.iter().map(|&id| vm(id, "running")));
        PushReconciler::new(collection)
    }

    fn state_of(reconciler: &PushReconciler<Vm>, id: u64) -> Option<String> {
        reconciler
            .collection()
            .get(&ResourceId::Numeric(id))
            .map(|v| v.state.clone())
    }

    #[test]
    fn duplicate_delivery_is_a_no_op() {
        let reconciler = reconciler_with(&[1]);
        let event = PushEvent::update("vm", 1u64, vm(1, "poweroff")).with_delivery_id("d-7");

        assert_eq!(
            reconciler.deliver(event.clone()),
            Delivery::Applied(Effect::Updated)
        );
        let version = reconciler.collection().version();
        assert_eq!(reconciler.deliver(event), Delivery::Duplicate);
        assert_eq!(reconciler.collection().version(), version);
        assert_eq!(reconciler.stats().duplicates, 1);
    }

    #[test]
    fn redelivery_after_dismiss_is_new() {
        let reconciler = reconciler_with(&[1]);
        let event = PushEvent::update("vm", 1u64, vm(1, "poweroff"));
        reconciler.deliver(event.clone());

        let key = DeliveryKey::for_event(&event).unwrap();
        assert!(reconciler.dismiss(&key));
        assert!(!reconciler.dismiss(&key));
        assert_eq!(
            reconciler.deliver(event),
            Delivery::Applied(Effect::Updated)
        );
    }

    #[test]
    fn delete_removes_the_item_and_evicts_its_keys() {
        let reconciler = reconciler_with(&[1, 2]);
        for (n, (id, state)) in [(1, "poweroff"), (1, "suspended"), (2, "poweroff")]
            .into_iter()
            .enumerate()
        {
            let event = PushEvent::update("vm", id, vm(id, state));
            reconciler.deliver(event.with_delivery_id(format!("d-{n}")));
        }
        assert_eq!(reconciler.ledger_len(), 3);

        assert_eq!(
            reconciler.deliver(PushEvent::delete("vm", 1u64)),
            Delivery::Applied(Effect::Removed)
        );
        assert_eq!(state_of(&reconciler, 1), None);
        assert_eq!(reconciler.ledger_len(), 1);
        assert_eq!(reconciler.stats().dismissed, 2);

        let live = reconciler.live_events();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].event.resource_id, ResourceId::Numeric(2));
    }

    #[test]
    fn item_state_machine_edges() {
        let reconciler = reconciler_with(&[]);

        assert_eq!(
            reconciler.deliver(PushEvent::update("vm", 5u64, vm(5, "running"))),
            Delivery::Ignored,
            "update on absent is dropped"
        );
        assert_eq!(
            reconciler.deliver(PushEvent::delete("vm", 5u64)),
            Delivery::Ignored,
            "delete on absent is a no-op"
        );
        assert_eq!(
            reconciler.deliver(PushEvent::create("vm", 5u64, vm(5, "pending"))),
            Delivery::Applied(Effect::Inserted)
        );
        assert_eq!(
            reconciler.deliver(PushEvent::create("vm", 5u64, vm(5, "running"))),
            Delivery::Applied(Effect::Updated),
            "create on present acts as update"
        );
        assert_eq!(state_of(&reconciler, 5).as_deref(), Some("running"));
        assert_eq!(reconciler.collection().len(), 1);
    }

    #[test]
    fn created_items_are_appended() {
        let reconciler = reconciler_with(&[1, 2]);
        reconciler.deliver(PushEvent::create("vm", 9u64, vm(9, "pending")));
        let ids = reconciler.collection().ids();
        assert_eq!(
            ids,
            vec![
                ResourceId::Numeric(1),
                ResourceId::Numeric(2),
                ResourceId::Numeric(9)
            ]
        );
    }

    #[test]
    fn listener_may_deliver_reentrantly() {
        let reconciler = reconciler_with(&[1]);
        let handle = reconciler.clone();
        reconciler.on_dismiss(move |entry| {
            if entry.event.delivery_id.as_deref() == Some("first") {
                handle.deliver(
                    PushEvent::update("vm", 1u64, vm(1, "follow-up")).with_delivery_id("second"),
                );
            }
        });

        let first = PushEvent::update("vm", 1u64, vm(1, "poweroff")).with_delivery_id("first");
        reconciler.deliver(first.clone());
        assert!(reconciler.dismiss(&DeliveryKey::for_event(&first).unwrap()));

        assert_eq!(state_of(&reconciler, 1).as_deref(), Some("follow-up"));
        assert_eq!(reconciler.ledger_len(), 1);
        reconciler.teardown();
    }

    #[test]
    fn ledger_is_bounded_by_live_events() {
        let reconciler = reconciler_with(&[1]);
        for n in 0..100 {
            let event = PushEvent::update("vm", 1u64, vm(1, "running"))
                .with_delivery_id(format!("d-{n}"));
            let key = DeliveryKey::for_event(&event).unwrap();
            reconciler.deliver(event);
            reconciler.dismiss(&key);
        }
        assert_eq!(reconciler.ledger_len(), 0);
        assert_eq!(reconciler.stats().applied, 100);
    }

    #[test]
    fn ledgers_are_per_instance() {
        let a = reconciler_with(&[1]);
        let b = reconciler_with(&[1]);
        let event = PushEvent::update("vm", 1u64, vm(1, "poweroff")).with_delivery_id("d-1");

        assert_ne!(a.deliver(event.clone()), Delivery::Duplicate);
        assert_ne!(b.deliver(event), Delivery::Duplicate);
    }

    #[test]
    fn state_flapping_back_is_applied() {
        let reconciler = reconciler_with(&[1]);
        let dismissed = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&dismissed);
        reconciler.on_dismiss(move |entry| {
            seen.lock().unwrap().push(entry.event.payload.clone());
        });

        for state in ["poweroff", "running", "poweroff"] {
            assert_eq!(
                reconciler.deliver(PushEvent::update("vm", 1u64, vm(1, state))),
                Delivery::Applied(Effect::Updated),
                "{state}"
            );
        }
        assert_eq!(state_of(&reconciler, 1).as_deref(), Some("poweroff"));
        assert_eq!(reconciler.ledger_len(), 1);
        assert_eq!(reconciler.stats().dismissed, 2);
        assert_eq!(
            *dismissed.lock().unwrap(),
            vec![Some(vm(1, "poweroff")), Some(vm(1, "running"))]
        );

        assert_eq!(
            reconciler.deliver(PushEvent::update("vm", 1u64, vm(1, "poweroff"))),
            Delivery::Duplicate,
            "back-to-back repeat is still a duplicate"
        );
    }

    #[derive(Debug, Clone)]
    struct Sealed {
        id: u64,
    }

    impl Resource for Sealed {
        fn resource_id(&self) -> ResourceId {
            ResourceId::Numeric(self.id)
        }
    }

    impl Serialize for Sealed {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("sealed"))
        }
    }

    #[test]
    fn unserializable_payloads_skip_dedup() {
        let collection = Arc::new(ResourceCollection::new());
        let reconciler = PushReconciler::new(collection);
        let event = PushEvent::create("vm", 1u64, Sealed { id: 1 });

        assert_eq!(
            reconciler.deliver(event.clone()),
            Delivery::Applied(Effect::Inserted)
        );
        assert_eq!(reconciler.deliver(event), Delivery::Applied(Effect::Updated));
        assert_eq!(reconciler.ledger_len(), 0);
        assert_eq!(reconciler.stats().duplicates, 0);
    }

    #[tokio::test]
    async fn attached_hub_feeds_the_collection_until_teardown() {
        let reconciler = reconciler_with(&[1]);
        let hub = PushHub::new();
        let task = reconciler.attach(&hub, "vm");

        hub.publish(PushEvent::create("vm", 2u64, vm(2, "pending")));
        hub.publish(PushEvent::update("host", 1u64, vm(1, "maintenance")));
        hub.publish(PushEvent::delete("vm", 1u64));

        let mut snapshots = reconciler.collection().subscribe();
        while snapshots.current().iter().map(|v| v.id).ne([2u64]) {
            tokio::time::timeout(Duration::from_secs(5), snapshots.changed())
                .await
                .unwrap()
                .unwrap();
        }

        reconciler.teardown();
        task.await.unwrap();
        hub.publish(PushEvent::create("vm", 3u64, vm(3, "pending")));
        assert_eq!(
            reconciler.deliver(PushEvent::create("vm", 4u64, vm(4, "pending"))),
            Delivery::Ignored
        );
        assert_eq!(reconciler.collection().len(), 1);
        assert_eq!(reconciler.ledger_len(), 0);
    }
}
