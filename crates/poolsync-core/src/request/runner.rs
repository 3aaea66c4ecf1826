// ── Shared runner core ──
//
// Debounce, unmount guard and state bookkeeping used by both the single
// request runner and the batch runner. A trigger bumps the generation,
// flags the state busy, and spawns a task that sleeps through the debounce
// window; only the task whose generation is still current issues a fetch.

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::state::{FetchOptions, RequestState};
use crate::error::SyncError;

pub(crate) type Fetch<T> = BoxFuture<'static, Result<Option<T>, SyncError>>;

/// Observer invoked with each applied outcome, before it is published.
pub type SettleHook<P, T> = Arc<dyn Fn(&P, Result<&Arc<T>, &SyncError>) + Send + Sync>;

pub(crate) struct Runner<T> {
    shared: Arc<Shared<T>>,
}

struct Shared<T> {
    state: watch::Sender<RequestState<T>>,
    generation: AtomicU64,
    /// Cancelled on unmount. A settle only applies while this is live.
    mounted: CancellationToken,
    debounce: Duration,
    name: &'static str,
}

impl<T: Send + Sync + 'static> Runner<T> {
    pub(crate) fn new(name: &'static str, debounce: Duration) -> Self {
        let (state, _) = watch::channel(RequestState::default());
        Self {
            shared: Arc::new(Shared {
                state,
                generation: AtomicU64::new(0),
                mounted: CancellationToken::new(),
                debounce,
                name,
            }),
        }
    }

    pub(crate) fn state(&self) -> RequestState<T> {
        self.shared.state.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<RequestState<T>> {
        self.shared.state.subscribe()
    }

    pub(crate) fn is_mounted(&self) -> bool {
        !self.shared.mounted.is_cancelled()
    }

    pub(crate) fn unmount(&self) {
        // Cancel under the state lock so no settle can interleave with it.
        self.shared.state.send_if_modified(|_| {
            self.shared.mounted.cancel();
            false
        });
        debug!(runner = self.shared.name, "unmounted");
    }

    /// Wait until neither `loading` nor `reloading` is set.
    ///
    /// Returns early with the current state if the runner is unmounted, since
    /// a pending result will never be applied.
    pub(crate) async fn settled(&self) -> RequestState<T> {
        let mut rx = self.shared.state.subscribe();
        tokio::select! {
            biased;
            () = self.shared.mounted.cancelled() => self.state(),
            res = rx.wait_for(|s| !s.is_busy()) => match res {
                Ok(s) => RequestState::clone(&s),
                Err(_) => self.state(),
            },
        }
    }

    pub(crate) fn launch<P, F>(
        &self,
        payload: P,
        options: FetchOptions,
        hook: Option<SettleHook<P, T>>,
        make: F,
    ) where
        P: Debug + Send + Sync + 'static,
        F: FnOnce(&P) -> Fetch<T> + Send + 'static,
    {
        let shared = &self.shared;
        if shared.mounted.is_cancelled() {
            debug!(runner = shared.name, ?payload, "trigger ignored after unmount");
            return;
        }

        let delay = options.delay().unwrap_or_else(|err| {
            warn!(runner = shared.name, error = %err, "ignoring invalid fetch delay");
            Duration::ZERO
        });

        let generation = shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        shared.state.send_modify(|s| {
            if options.reload {
                s.reloading = true;
            } else {
                s.loading = true;
            }
        });
        trace!(runner = shared.name, generation, ?payload, "trigger queued");

        let shared = Arc::clone(shared);
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = shared.mounted.cancelled() => return,
                () = tokio::time::sleep(shared.debounce + delay) => {}
            }
            if shared.generation.load(Ordering::Acquire) != generation {
                trace!(runner = shared.name, generation, "trigger superseded");
                return;
            }

            debug!(runner = shared.name, ?payload, "fetch started");
            // The transport is never aborted; a late answer is dropped on settle.
            let outcome = make(&payload).await;
            shared.settle(generation, &payload, outcome, hook.as_deref());
        });
    }
}

impl<T> Drop for Runner<T> {
    fn drop(&mut self) {
        self.shared.mounted.cancel();
    }
}

impl<T: Send + Sync + 'static> Shared<T> {
    fn settle<P: Debug>(
        &self,
        generation: u64,
        payload: &P,
        outcome: Result<Option<T>, SyncError>,
        hook: Option<&(dyn Fn(&P, Result<&Arc<T>, &SyncError>) + Send + Sync)>,
    ) {
        if self.mounted.is_cancelled() {
            debug!(runner = self.name, ?payload, "dropping result after unmount");
            return;
        }

        let result = match outcome {
            Ok(Some(value)) => Ok(Arc::new(value)),
            Ok(None) => Err(SyncError::malformed(format!(
                "empty response for {payload:?}"
            ))),
            Err(err) => Err(err),
        };

        if let Some(hook) = hook {
            hook(payload, result.as_ref());
        }

        // Busy flags belong to the newest trigger; an older fetch that
        // resolves late still writes its data (last-resolved-wins).
        let latest = self.generation.load(Ordering::Acquire) == generation;
        let applied = self.state.send_if_modified(|s| {
            if self.mounted.is_cancelled() {
                return false;
            }
            match &result {
                Ok(data) => {
                    s.data = Some(Arc::clone(data));
                    s.error = None;
                }
                Err(err) => {
                    s.data = None;
                    s.error = Some(err.clone());
                }
            }
            if latest {
                s.loading = false;
                s.reloading = false;
            }
            true
        });

        match (&result, applied) {
            (_, false) => debug!(runner = self.name, ?payload, "dropping result after unmount"),
            (Ok(_), true) => debug!(runner = self.name, ?payload, latest, "fetch settled"),
            (Err(err), true) => {
                warn!(runner = self.name, ?payload, error = %err, "fetch failed");
            }
        }
    }
}
