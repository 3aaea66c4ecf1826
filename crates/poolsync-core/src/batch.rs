// ── Batch runner ──
//
// All-or-nothing concurrent fetch for widgets that need several resources
// at once. Shares debounce and unmount handling with the request runner.

use std::time::Duration;

use futures_util::future::{BoxFuture, try_join_all};
use tokio::sync::watch;

use crate::config::SyncTuning;
use crate::error::SyncError;
use crate::request::{FetchOptions, RequestState, Runner};

/// One member of a batch.
pub type BatchRequest<T> = BoxFuture<'static, Result<Option<T>, SyncError>>;

/// Runs a fixed set of requests concurrently behind a single state.
///
/// `data` is the results in input order, and only appears when every
/// request succeeded. The first failure fails the whole batch. A batch
/// superseded inside the debounce window is dropped without being polled.
pub struct BatchRunner<T> {
    runner: Runner<Vec<T>>,
}

impl<T: Send + Sync + 'static> BatchRunner<T> {
    pub fn new(tuning: &SyncTuning) -> Self {
        Self::with_debounce(tuning.debounce)
    }

    pub fn with_debounce(debounce: Duration) -> Self {
        Self {
            runner: Runner::new("batch", debounce),
        }
    }

    pub fn fetch_request_all(&self, requests: Vec<BatchRequest<T>>) {
        self.fetch_request_all_with(requests, FetchOptions::default());
    }

    pub fn fetch_request_all_with(&self, requests: Vec<BatchRequest<T>>, options: FetchOptions) {
        let size = requests.len();
        self.runner.launch(size, options, None, move |_| {
            Box::pin(async move {
                let slots = requests.into_iter().enumerate().map(|(slot, request)| async move {
                    request.await?.ok_or_else(|| {
                        SyncError::malformed(format!("batch slot {slot} returned no data"))
                    })
                });
                try_join_all(slots).await.map(Some)
            })
        });
    }

    pub fn state(&self) -> RequestState<Vec<T>> {
        self.runner.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<RequestState<Vec<T>>> {
        self.runner.subscribe()
    }

    pub async fn settled(&self) -> RequestState<Vec<T>> {
        self.runner.settled().await
    }

    pub fn is_mounted(&self) -> bool {
        self.runner.is_mounted()
    }

    pub fn unmount(&self) {
        self.runner.unmount();
    }
}
