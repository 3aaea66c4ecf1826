// ── Reactive collection streams ──
//
// Subscription handles for consuming collection changes.

use std::sync::Arc;

use tokio::sync::watch;

type Snapshot<T> = Arc<Vec<Arc<T>>>;

/// A subscription to a [`ResourceCollection`](crate::store::ResourceCollection).
///
/// Offers the snapshot seen at creation and change notification via
/// [`changed`](Self::changed).
pub struct CollectionStream<T: Send + Sync + 'static> {
    current: Snapshot<T>,
    receiver: watch::Receiver<Snapshot<T>>,
}

impl<T: Send + Sync + 'static> CollectionStream<T> {
    pub(crate) fn new(receiver: watch::Receiver<Snapshot<T>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Snapshot as of creation or the last [`changed`](Self::changed).
    pub fn current(&self) -> &Snapshot<T> {
        &self.current
    }

    /// Wait for the next change, returning the new snapshot.
    /// Returns `None` once the collection has been dropped.
    pub async fn changed(&mut self) -> Option<Snapshot<T>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = Arc::clone(&snap);
        Some(snap)
    }
}
