// ── Push hub ──
//
// In-process fan-out of push events. Stands in for the websocket or
// message-bus subscription a host wires up in production.

use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::future::ready;
use futures_util::stream::BoxStream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{trace, warn};

use super::PushSource;
use crate::model::{PushEvent, ResourceKind};

const DEFAULT_CAPACITY: usize = 1024;

/// Broadcast-backed [`PushSource`].
///
/// Subscribers only see events of the kind they asked for. A subscriber
/// that falls more than `capacity` events behind skips the overflow and
/// logs a warning.
pub struct PushHub<T> {
    sender: broadcast::Sender<Arc<PushEvent<T>>>,
}

impl<T: Send + Sync + 'static> Default for PushHub<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> PushHub<T> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event. Returns the number of subscribers it reached.
    pub fn publish(&self, event: PushEvent<T>) -> usize {
        let kind = event.kind.clone();
        // No subscribers is not an error: nobody is looking at that pool.
        let reached = self.sender.send(Arc::new(event)).unwrap_or(0);
        trace!(%kind, reached, "push event published");
        reached
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T: Send + Sync + 'static> PushSource<T> for PushHub<T> {
    fn subscribe(&self, kind: &ResourceKind) -> BoxStream<'static, Arc<PushEvent<T>>> {
        let kind = kind.clone();
        BroadcastStream::new(self.sender.subscribe())
            .filter_map(move |received| {
                let event = match received {
                    Ok(event) if event.kind == kind => Some(event),
                    Ok(_) => None,
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(%kind, skipped, "push subscriber lagged");
                        None
                    }
                };
                ready(event)
            })
            .boxed()
    }
}
