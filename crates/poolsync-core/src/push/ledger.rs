// ── Delivery ledger ──
//
// Idempotency keys of push events that are still live, in arrival order.
// Entries leave the ledger through dismissal, a delete of the same
// resource, or a newer content-keyed event for that resource.

use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;

use crate::model::{PushEvent, ResourceId, ResourceKind};

/// Idempotency key of one delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeliveryKey {
    /// Keyed by the transport's delivery id.
    Delivery {
        kind: ResourceKind,
        resource_id: ResourceId,
        delivery_id: String,
    },
    /// Keyed by event content when the transport gives no delivery id.
    Fingerprint {
        kind: ResourceKind,
        resource_id: ResourceId,
        digest: u64,
    },
}

impl DeliveryKey {
    /// Key an event by delivery id, else by content. `None` when the event
    /// has no delivery id and its payload cannot be serialized.
    pub fn for_event<T: Serialize>(event: &PushEvent<T>) -> Option<Self> {
        let kind = event.kind.clone();
        let resource_id = event.resource_id.clone();
        let key = match &event.delivery_id {
            Some(delivery_id) => Self::Delivery {
                kind,
                resource_id,
                delivery_id: delivery_id.clone(),
            },
            None => Self::Fingerprint {
                digest: fingerprint(event)?,
                kind,
                resource_id,
            },
        };
        Some(key)
    }

    pub fn kind(&self) -> &ResourceKind {
        match self {
            Self::Delivery { kind, .. } | Self::Fingerprint { kind, .. } => kind,
        }
    }

    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Self::Delivery { resource_id, .. } | Self::Fingerprint { resource_id, .. } => {
                resource_id
            }
        }
    }

    pub fn is_fingerprint(&self) -> bool {
        matches!(self, Self::Fingerprint { .. })
    }

    fn same_resource(&self, kind: &ResourceKind, id: &ResourceId) -> bool {
        self.kind() == kind && self.resource_id() == id
    }
}

impl fmt::Display for DeliveryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delivery {
                kind,
                resource_id,
                delivery_id,
            } => write!(f, "{kind}/{resource_id}#{delivery_id}"),
            Self::Fingerprint {
                kind,
                resource_id,
                digest,
            } => write!(f, "{kind}/{resource_id}~{digest:016x}"),
        }
    }
}

fn fingerprint<T: Serialize>(event: &PushEvent<T>) -> Option<u64> {
    let bytes = match serde_json::to_vec(&event.payload) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(
                kind = %event.kind,
                id = %event.resource_id,
                error = %err,
                "push payload not serializable, delivering without dedup"
            );
            return None;
        }
    };
    let mut hasher = DefaultHasher::new();
    event.operation.hash(&mut hasher);
    bytes.hash(&mut hasher);
    Some(hasher.finish())
}

/// A push event still shown as a notification.
#[derive(Debug)]
pub struct LiveEvent<T> {
    pub key: DeliveryKey,
    pub event: Arc<PushEvent<T>>,
    pub received_at: DateTime<Utc>,
}

impl<T> Clone for LiveEvent<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            event: Arc::clone(&self.event),
            received_at: self.received_at,
        }
    }
}

/// Live delivery keys of one reconciler.
#[derive(Debug)]
pub struct DeliveryLedger<T> {
    entries: IndexMap<DeliveryKey, LiveEvent<T>>,
}

impl<T> Default for DeliveryLedger<T> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<T> DeliveryLedger<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &DeliveryKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Record a delivery. Returns `false` if the key was already live.
    pub fn record(&mut self, key: DeliveryKey, event: Arc<PushEvent<T>>) -> bool {
        if self.entries.contains_key(&key) {
            return false;
        }
        let entry = LiveEvent {
            key: key.clone(),
            event,
            received_at: Utc::now(),
        };
        self.entries.insert(key, entry);
        true
    }

    pub fn dismiss(&mut self, key: &DeliveryKey) -> Option<LiveEvent<T>> {
        self.entries.shift_remove(key)
    }

    /// Evict every live key of one resource.
    pub fn evict_resource(&mut self, kind: &ResourceKind, id: &ResourceId) -> Vec<LiveEvent<T>> {
        self.evict_where(|key| key.same_resource(kind, id))
    }

    fn evict_where(&mut self, evict: impl Fn(&DeliveryKey) -> bool) -> Vec<LiveEvent<T>> {
        let mut evicted = Vec::new();
        self.entries.retain(|key, entry| {
            if evict(key) {
                evicted.push(entry.clone());
                false
            } else {
                true
            }
        });
        evicted
    }

    /// Evict the content-keyed entries of one resource. A newer event for
    /// the resource makes them stale, so the same content may apply again.
    pub fn supersede(&mut self, kind: &ResourceKind, id: &ResourceId) -> Vec<LiveEvent<T>> {
        self.evict_where(|key| key.is_fingerprint() && key.same_resource(kind, id))
    }

    /// Live events, oldest first.
    pub fn live(&self) -> Vec<LiveEvent<T>> {
        self.entries.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
