// ── Windowed list ──
//
// Incremental rendering over a list that is already fully in memory. The
// visible prefix grows in paced steps; growth requests that arrive while a
// step is settling are dropped, since the viewport trigger fires again on
// its next check.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::SyncTuning;

/// Published state of a [`WindowedList`].
#[derive(Debug)]
pub struct WindowState<T> {
    full: Arc<Vec<T>>,
    length: usize,
    shown: usize,
    finish: bool,
    loading: bool,
    loading_next_page: bool,
    epoch: u64,
}

impl<T> Clone for WindowState<T> {
    fn clone(&self) -> Self {
        Self {
            full: Arc::clone(&self.full),
            length: self.length,
            shown: self.shown,
            finish: self.finish,
            loading: self.loading,
            loading_next_page: self.loading_next_page,
            epoch: self.epoch,
        }
    }
}

impl<T> WindowState<T> {
    fn empty(length: usize) -> Self {
        let mut state = Self {
            full: Arc::new(Vec::new()),
            length,
            shown: 0,
            finish: false,
            loading: true,
            loading_next_page: false,
            epoch: 0,
        };
        state.recompute();
        state
    }

    /// The visible prefix of the full list.
    pub fn short_list(&self) -> &[T] {
        self.full.get(..self.shown).unwrap_or_default()
    }

    pub fn full_list(&self) -> &Arc<Vec<T>> {
        &self.full
    }

    /// Requested window length; may exceed the full list.
    pub fn length(&self) -> usize {
        self.length
    }

    /// True once the whole list is visible.
    pub fn finish(&self) -> bool {
        self.finish
    }

    /// True until a list has been provided.
    pub fn loading(&self) -> bool {
        self.loading
    }

    /// True while a growth step is settling.
    pub fn loading_next_page(&self) -> bool {
        self.loading_next_page
    }

    /// Identity of the current full list; bumped on every reset.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    fn recompute(&mut self) {
        self.shown = self.length.min(self.full.len());
        self.finish = self.shown >= self.full.len();
    }
}

/// A growing prefix over a fully loaded list.
pub struct WindowedList<T> {
    state: Arc<watch::Sender<WindowState<T>>>,
    init_length: usize,
    step: usize,
    settle: Duration,
    mounted: CancellationToken,
}

impl<T: Send + Sync + 'static> WindowedList<T> {
    pub fn new(tuning: &SyncTuning) -> Self {
        Self::with_params(tuning.window_init_length, tuning.window_step, tuning.window_settle)
    }

    pub fn with_params(init_length: usize, step: usize, settle: Duration) -> Self {
        let (state, _) = watch::channel(WindowState::empty(init_length));
        Self {
            state: Arc::new(state),
            init_length,
            step,
            settle,
            mounted: CancellationToken::new(),
        }
    }

    /// Replace the full list and show its first `init_length` items.
    pub fn reset(&self, list: Vec<T>) {
        let init_length = self.init_length;
        self.state.send_modify(|s| {
            s.epoch += 1;
            s.full = Arc::new(list);
            s.length = init_length;
            s.loading = false;
            s.loading_next_page = false;
            s.recompute();
            debug!(epoch = s.epoch, total = s.full.len(), shown = s.shown, "window reset");
        });
    }

    /// Forget the current list until the next [`reset`](Self::reset).
    pub fn invalidate(&self) {
        let init_length = self.init_length;
        self.state.send_modify(|s| {
            *s = WindowState {
                epoch: s.epoch + 1,
                ..WindowState::empty(init_length)
            };
        });
    }

    /// Grow the window after the settle delay.
    ///
    /// Returns `false` (and does nothing) while a previous step is settling,
    /// before any list is loaded, once the window is finished, or after
    /// [`unmount`](Self::unmount). The window never shrinks: an updater
    /// returning less than the current length is ignored.
    pub fn set_length(&self, updater: impl FnOnce(usize) -> usize + Send + 'static) -> bool {
        if self.mounted.is_cancelled() {
            trace!("window growth after unmount");
            return false;
        }
        let mut epoch = None;
        self.state.send_if_modified(|s| {
            if s.loading || s.loading_next_page || s.finish {
                return false;
            }
            s.loading_next_page = true;
            epoch = Some(s.epoch);
            true
        });
        let Some(epoch) = epoch else {
            trace!("window growth dropped");
            return false;
        };

        let state = Arc::clone(&self.state);
        let mounted = self.mounted.clone();
        let settle = self.settle;
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = mounted.cancelled() => {
                    state.send_if_modified(|s| {
                        let abandoned = s.epoch == epoch && s.loading_next_page;
                        if abandoned {
                            s.loading_next_page = false;
                        }
                        abandoned
                    });
                    return;
                }
                () = tokio::time::sleep(settle) => {}
            }
            state.send_if_modified(|s| {
                if s.epoch != epoch {
                    return false;
                }
                s.length = updater(s.length).max(s.length);
                s.loading_next_page = false;
                s.recompute();
                trace!(epoch, length = s.length, shown = s.shown, finish = s.finish, "window grew");
                true
            });
        });
        true
    }

    /// Grow by the configured step.
    pub fn next_page(&self) -> bool {
        let step = self.step;
        self.set_length(move |length| length.saturating_add(step))
    }

    pub fn state(&self) -> WindowState<T> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WindowState<T>> {
        self.state.subscribe()
    }

    /// Wait until no growth step is settling, or until unmount.
    pub async fn settled(&self) -> WindowState<T> {
        let mut rx = self.state.subscribe();
        tokio::select! {
            biased;
            settled = rx.wait_for(|s| !s.loading_next_page) => match settled {
                Ok(s) => WindowState::clone(&s),
                Err(_) => self.state(),
            },
            () = self.mounted.cancelled() => self.state(),
        }
    }

    pub fn unmount(&self) {
        self.mounted.cancel();
    }
}

impl<T> Drop for WindowedList<T> {
    fn drop(&mut self) {
        self.mounted.cancel();
    }
}
