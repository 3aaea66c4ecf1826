// ── Pool pager ──
//
// Cursor-based pagination over a pool. The pool answers every range with
// its cumulative window, which replaces the shared `ResourceCollection`
// wholesale; the pager stops once an answer comes back short or a request
// fails.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::config::SyncTuning;
use crate::error::SyncError;
use crate::model::{FilterQuery, Page, PageRange, RequestPayload, Resource};
use crate::request::{FetchOptions, PageSource, RequestRunner, RequestState};
use crate::store::ResourceCollection;

/// Which request an answer belongs to. Every answer replaces the
/// collection; this only drives the page count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Apply {
    First,
    Append,
    /// Current window re-fetched; the cursor stays put.
    Refresh,
}

#[derive(Debug, Clone, PartialEq)]
struct Pending {
    payload: RequestPayload,
    /// Cursor recorded once the answer is applied.
    cursor: PageRange,
    apply: Apply,
}

/// Published cursor state of a [`PageLoader`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PagerState {
    range: Option<PageRange>,
    pending: Option<Pending>,
    failed: Option<Pending>,
    filter: Option<FilterQuery>,
    pages: usize,
    last_page_len: Option<usize>,
    exhausted: bool,
    epoch: u64,
}

impl PagerState {
    /// Cursor: range of the last applied page.
    pub fn range(&self) -> Option<PageRange> {
        self.range
    }

    pub fn filter(&self) -> Option<&FilterQuery> {
        self.filter.as_ref()
    }

    /// Pages applied since the last reset.
    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn last_page_len(&self) -> Option<usize> {
        self.last_page_len
    }

    /// The pool reported its end.
    pub fn exhausted(&self) -> bool {
        self.exhausted
    }

    /// The last request failed; only [`PageLoader::retry`] clears this.
    pub fn errored(&self) -> bool {
        self.failed.is_some()
    }

    pub fn in_flight(&self) -> bool {
        self.pending.is_some()
    }

    /// Bumped on every reset.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn can_fetch_more(&self) -> bool {
        self.pages > 0 && !self.exhausted && self.failed.is_none()
    }
}

/// Incremental loader for one pool list.
///
/// [`load`](Self::load) fetches `(0, -page_size)`; each
/// [`fetch_more`](Self::fetch_more) advances the cursor one page, which
/// extends the window. The pool answers with everything from the head up
/// to the window's extent, and that answer replaces
/// [`collection`](Self::collection) wholesale. Items deleted on the server
/// between pulls therefore disappear; merging push events is left to
/// [`PushReconciler`](crate::push::PushReconciler).
///
/// The pool is exhausted once an answer is shorter than the extent of the
/// range it answered.
pub struct PageLoader<T: Resource + Clone + Send + Sync + 'static> {
    runner: RequestRunner<Page<T>>,
    inner: Arc<Inner<T>>,
    page_size: u32,
}

struct Inner<T: Resource + Send + Sync + 'static> {
    collection: Arc<ResourceCollection<T>>,
    state: watch::Sender<PagerState>,
}

impl<T: Resource + Clone + Send + Sync + 'static> PageLoader<T> {
    pub fn new(source: impl PageSource<Page<T>>, tuning: &SyncTuning) -> Self {
        Self::with_params(source, tuning.page_size, tuning.debounce)
    }

    pub fn with_params(
        source: impl PageSource<Page<T>>,
        page_size: u32,
        debounce: Duration,
    ) -> Self {
        let (state, _) = watch::channel(PagerState::default());
        let inner = Arc::new(Inner {
            collection: Arc::new(ResourceCollection::new()),
            state,
        });
        let hook_inner = Arc::clone(&inner);
        let runner = RequestRunner::with_debounce(source, debounce)
            .on_settle(move |payload, outcome| hook_inner.apply(payload, outcome));
        Self {
            runner,
            inner,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Shared collection the pages accumulate into.
    pub fn collection(&self) -> Arc<ResourceCollection<T>> {
        Arc::clone(&self.inner.collection)
    }

    /// Fetch the first page.
    pub fn load(&self) {
        let first = PageRange::first(self.page_size);
        self.issue(first, first, Apply::First, FetchOptions::default());
    }

    /// Request the next page. Returns `false` (no-op) while a request is in
    /// flight, before the first page, or once the pool is exhausted or
    /// errored.
    pub fn fetch_more(&self) -> bool {
        let next = {
            let state = self.inner.state.borrow();
            if state.in_flight() || !state.can_fetch_more() {
                trace!(
                    in_flight = state.in_flight(),
                    exhausted = state.exhausted,
                    errored = state.errored(),
                    "fetch_more ignored"
                );
                return false;
            }
            state.range.map(|r| r.advance(self.page_size))
        };
        match next {
            Some(next) => self.issue(next, next, Apply::Append, FetchOptions::default()),
            None => false,
        }
    }

    /// Start over with a new filter: clears the collection and the cursor,
    /// then loads the first page.
    pub fn reset(&self, filter: Option<FilterQuery>) {
        self.inner.collection.clear();
        self.inner.state.send_modify(|s| {
            *s = PagerState {
                filter,
                epoch: s.epoch + 1,
                ..PagerState::default()
            };
            debug!(epoch = s.epoch, filter = ?s.filter, "pager reset");
        });
        self.load();
    }

    /// Re-fetch everything loaded so far with `reload = true`. Loads the
    /// first page when nothing is loaded yet.
    pub fn reload(&self) -> bool {
        let cursor = self.inner.state.borrow().range;
        match cursor {
            Some(cursor) => self.issue(
                PageRange::new(0, cursor.end),
                cursor,
                Apply::Refresh,
                FetchOptions::reload(),
            ),
            None => {
                self.load();
                true
            }
        }
    }

    /// Re-issue the request that failed. Returns `false` if nothing failed
    /// or a request is already in flight.
    pub fn retry(&self) -> bool {
        let failed = {
            let state = self.inner.state.borrow();
            if state.in_flight() {
                return false;
            }
            state.failed.clone()
        };
        let Some(failed) = failed else {
            return false;
        };
        debug!(payload = ?failed.payload, "retrying pool request");
        self.submit(failed, FetchOptions::default())
    }

    pub fn state(&self) -> PagerState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PagerState> {
        self.inner.state.subscribe()
    }

    /// Underlying request state (last page, loading flags, error).
    pub fn request_state(&self) -> RequestState<Page<T>> {
        self.runner.state()
    }

    /// Wait for the in-flight request to settle.
    pub async fn settled(&self) -> PagerState {
        self.runner.settled().await;
        self.state()
    }

    pub fn is_mounted(&self) -> bool {
        self.runner.is_mounted()
    }

    pub fn unmount(&self) {
        self.runner.unmount();
    }

    fn issue(&self, range: PageRange, cursor: PageRange, apply: Apply, options: FetchOptions) -> bool {
        let filter = self.inner.state.borrow().filter.clone();
        let pending = Pending {
            payload: RequestPayload::scoped(range, filter.as_ref()),
            cursor,
            apply,
        };
        self.submit(pending, options)
    }

    fn submit(&self, pending: Pending, options: FetchOptions) -> bool {
        if !self.runner.is_mounted() {
            return false;
        }
        let payload = pending.payload.clone();
        trace!(?payload, apply = ?pending.apply, "pool request issued");
        self.inner.state.send_modify(|s| {
            s.pending = Some(pending);
            s.failed = None;
        });
        self.runner.fetch_request(payload, options);
        true
    }
}

impl<T: Resource + Clone + Send + Sync + 'static> Inner<T> {
    fn apply(&self, payload: &RequestPayload, outcome: Result<&Arc<Page<T>>, &SyncError>) {
        let collection = &self.collection;
        self.state.send_if_modified(|s| {
            let Some(pending) = s.pending.take_if(|p| &p.payload == payload) else {
                debug!(?payload, "dropping page for a superseded request");
                return false;
            };

            let page = match outcome {
                Ok(page) => page,
                Err(err) => {
                    warn!(?payload, error = %err, "pool request failed");
                    s.failed = Some(pending);
                    return true;
                }
            };

            let requested = payload.range().unwrap_or(pending.cursor);
            let received = page.len();
            collection.replace_all(page.items.iter().cloned());
            match pending.apply {
                Apply::First => s.pages = 1,
                Apply::Append => s.pages += 1,
                Apply::Refresh => {}
            }
            s.range = Some(pending.cursor);
            s.last_page_len = Some(received);
            s.exhausted = received < requested.extent();
            debug!(
                cursor = %pending.cursor,
                received,
                total = collection.len(),
                exhausted = s.exhausted,
                "page applied"
            );
            true
        });
    }
}
