// ── Request runner ──
//
// Runs one asynchronous fetch at a time on behalf of a screen and exposes
// its progress as a reactive `RequestState`.

mod runner;
mod source;
mod state;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::config::SyncTuning;
use crate::error::SyncError;
use crate::model::RequestPayload;

pub(crate) use runner::Runner;
pub use runner::SettleHook;
pub use source::PageSource;
pub use state::{FetchOptions, RequestState, RequestStatus};

/// Fire-and-forget fetch runner with debounce and unmount guard.
///
/// - [`fetch_request`](Self::fetch_request) flags `loading` (or
///   `reloading`) before returning, then fetches after the debounce window.
///   Triggers inside the window collapse to the last payload.
/// - Once [`unmount`](Self::unmount)ed (or dropped), late results are
///   discarded and the published state never changes again.
/// - Failures never escape: they land in [`RequestState::error`].
///
/// Two fetches that both clear the debounce are not sequenced against each
/// other; whichever resolves last owns `data`. Callers that need
/// issue-order semantics must tag their payloads.
pub struct RequestRunner<T> {
    runner: Runner<T>,
    source: Arc<dyn PageSource<T>>,
    hook: Option<SettleHook<RequestPayload, T>>,
}

impl<T: Send + Sync + 'static> RequestRunner<T> {
    pub fn new(source: impl PageSource<T>, tuning: &SyncTuning) -> Self {
        Self::with_debounce(source, tuning.debounce)
    }

    pub fn with_debounce(source: impl PageSource<T>, debounce: Duration) -> Self {
        Self {
            runner: Runner::new("request", debounce),
            source: Arc::new(source),
            hook: None,
        }
    }

    /// Observe every outcome that is about to be applied.
    #[must_use]
    pub fn on_settle(
        mut self,
        hook: impl Fn(&RequestPayload, Result<&Arc<T>, &SyncError>) + Send + Sync + 'static,
    ) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    pub fn fetch_request(&self, payload: impl Into<RequestPayload>, options: FetchOptions) {
        let source = Arc::clone(&self.source);
        self.runner.launch(
            payload.into(),
            options,
            self.hook.clone(),
            move |payload| source.fetch(payload.clone()),
        );
    }

    pub fn state(&self) -> RequestState<T> {
        self.runner.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<RequestState<T>> {
        self.runner.subscribe()
    }

    /// Wait for the in-flight fetch (if any) to settle.
    pub async fn settled(&self) -> RequestState<T> {
        self.runner.settled().await
    }

    pub fn is_mounted(&self) -> bool {
        self.runner.is_mounted()
    }

    pub fn unmount(&self) {
        self.runner.unmount();
    }
}
