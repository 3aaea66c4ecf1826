// ── Viewport trigger ──
//
// Tracks whether a sentinel sits within `distance` of the viewport and
// turns that into "load more" signals. The host platform supplies the
// actual intersection observations through `ViewportObserver`.

mod scroll;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::SyncTuning;

pub use scroll::ScrollViewport;

// ── Sentinel & observations ─────────────────────────────────────────

/// Handle to an element whose proximity to the viewport is observed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SentinelRef(Arc<str>);

impl SentinelRef {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SentinelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One intersection report for an observed sentinel.
#[derive(Debug, Clone, PartialEq)]
pub struct IntersectionEntry {
    pub target: SentinelRef,
    /// Distance in pixels between the sentinel and the viewport edge;
    /// zero when the sentinel is inside the viewport.
    pub gap: f64,
}

/// Platform capability: observe one sentinel.
///
/// Dropping the returned stream disposes the observation.
pub trait ViewportObserver: Send + Sync + 'static {
    fn observe(&self, target: &SentinelRef) -> BoxStream<'static, IntersectionEntry>;
}

// ── Trigger ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct TriggerOptions {
    /// Margin (px) within which the sentinel counts as near.
    pub distance: f64,
    /// Disconnect after the first near transition.
    pub once: bool,
    /// Observe this sentinel instead of the trigger's own fallback.
    pub external_ref: Option<SentinelRef>,
}

impl TriggerOptions {
    pub fn from_tuning(tuning: &SyncTuning) -> Self {
        Self {
            distance: tuning.viewport_distance,
            once: tuning.viewport_once,
            external_ref: None,
        }
    }

    #[must_use]
    pub fn with_external_ref(mut self, sentinel: SentinelRef) -> Self {
        self.external_ref = Some(sentinel);
        self
    }
}

impl Default for TriggerOptions {
    fn default() -> Self {
        Self::from_tuning(&SyncTuning::default())
    }
}

/// Exposes `is_near_screen` for one sentinel.
///
/// With `once`, the observation is dropped on the first near report and
/// the flag latches. Otherwise the flag follows the sentinel both ways and
/// every near report bumps [`near_checks`](Self::near_checks), which
/// [`drive`](Self::drive) turns into repeated load-more calls.
pub struct ViewportTrigger {
    observer: Arc<dyn ViewportObserver>,
    distance: f64,
    once: bool,
    fallback: SentinelRef,
    attached: Mutex<Option<Attachment>>,
    near: Arc<watch::Sender<bool>>,
    checks: Arc<watch::Sender<u64>>,
    fired: Arc<AtomicBool>,
    mounted: CancellationToken,
}

struct Attachment {
    target: SentinelRef,
    cancel: CancellationToken,
}

impl ViewportTrigger {
    /// Create the trigger and start observing. Must be called inside a
    /// tokio runtime.
    pub fn new(observer: Arc<dyn ViewportObserver>, options: TriggerOptions) -> Self {
        let fallback = SentinelRef::new(format!("sentinel-{}", uuid::Uuid::new_v4()));
        let (near, _) = watch::channel(false);
        let (checks, _) = watch::channel(0u64);
        let trigger = Self {
            observer,
            distance: options.distance,
            once: options.once,
            fallback,
            attached: Mutex::new(None),
            near: Arc::new(near),
            checks: Arc::new(checks),
            fired: Arc::new(AtomicBool::new(false)),
            mounted: CancellationToken::new(),
        };
        trigger.attach(options.external_ref.unwrap_or_else(|| trigger.fallback.clone()));
        trigger
    }

    /// The internal sentinel observed when no external one is set.
    pub fn fallback_ref(&self) -> &SentinelRef {
        &self.fallback
    }

    /// The sentinel currently observed, if any.
    pub fn target(&self) -> Option<SentinelRef> {
        self.lock().as_ref().map(|a| a.target.clone())
    }

    pub fn is_near_screen(&self) -> bool {
        *self.near.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.near.subscribe()
    }

    /// Counter bumped on every near report.
    pub fn near_checks(&self) -> watch::Receiver<u64> {
        self.checks.subscribe()
    }

    /// Switch observation to `sentinel` (or back to the fallback).
    ///
    /// The previous observation is disposed first. Re-pointing at the same
    /// sentinel is a no-op.
    pub fn set_external_ref(&self, sentinel: Option<SentinelRef>) {
        let target = sentinel.unwrap_or_else(|| self.fallback.clone());
        if self.target().as_ref() == Some(&target) {
            return;
        }
        self.attach(target);
    }

    /// Run `action` on every near report until the trigger is dropped.
    pub fn drive(&self, action: impl Fn() + Send + 'static) -> JoinHandle<()> {
        let mut checks = self.checks.subscribe();
        let near = Arc::clone(&self.near);
        let mounted = self.mounted.clone();
        tokio::spawn(async move {
            if *near.borrow() {
                action();
            }
            checks.borrow_and_update();
            loop {
                tokio::select! {
                    biased;
                    () = mounted.cancelled() => break,
                    changed = checks.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if *near.borrow() {
                            action();
                        }
                    }
                }
            }
        })
    }

    /// Stop observing for good.
    pub fn disconnect(&self) {
        self.mounted.cancel();
        if let Some(prev) = self.lock().take() {
            prev.cancel.cancel();
        }
    }

    fn attach(&self, target: SentinelRef) {
        let mut attached = self.lock();
        if let Some(prev) = attached.take() {
            prev.cancel.cancel();
            trace!(sentinel = %prev.target, "observation disposed");
        }
        if self.mounted.is_cancelled() || (self.once && self.fired.load(Ordering::Acquire)) {
            return;
        }

        let cancel = self.mounted.child_token();
        let mut entries = self.observer.observe(&target);
        let near = Arc::clone(&self.near);
        let checks = Arc::clone(&self.checks);
        let fired = Arc::clone(&self.fired);
        let (distance, once) = (self.distance, self.once);
        let task_cancel = cancel.clone();
        let task_target = target.clone();
        debug!(sentinel = %target, distance, once, "observing sentinel");

        tokio::spawn(async move {
            loop {
                let entry = tokio::select! {
                    biased;
                    () = task_cancel.cancelled() => break,
                    entry = entries.next() => match entry {
                        Some(entry) => entry,
                        None => break,
                    },
                };
                if entry.target != task_target {
                    continue;
                }

                let is_near = entry.gap <= distance;
                near.send_if_modified(|current| {
                    let changed = *current != is_near;
                    *current = is_near;
                    changed
                });
                if !is_near {
                    continue;
                }
                checks.send_modify(|n| *n += 1);
                if once {
                    fired.store(true, Ordering::Release);
                    trace!(sentinel = %task_target, "near once, disconnecting");
                    break;
                }
            }
        });

        *attached = Some(Attachment { target, cancel });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Attachment>> {
        self.attached.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ViewportTrigger {
    fn drop(&mut self) {
        self.mounted.cancel();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;

    fn options(once: bool) -> TriggerOptions {
        TriggerOptions {
            distance: 50.0,
            once,
            external_ref: Some(SentinelRef::new("tail")),
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn toggles_both_ways_without_once() {
        let viewport = Arc::new(ScrollViewport::new(400.0));
        viewport.place(SentinelRef::new("tail"), 1000.0);
        let trigger = ViewportTrigger::new(viewport.clone(), options(false));
        settle().await;
        assert!(!trigger.is_near_screen());

        viewport.scroll_to(580.0);
        settle().await;
        assert!(trigger.is_near_screen(), "within 50px of the bottom edge");

        viewport.scroll_to(0.0);
        settle().await;
        assert!(!trigger.is_near_screen());

        viewport.scroll_to(700.0);
        settle().await;
        assert!(trigger.is_near_screen());
    }

    #[tokio::test(start_paused = true)]
    async fn once_latches_and_stops_observing() {
        let viewport = Arc::new(ScrollViewport::new(400.0));
        viewport.place(SentinelRef::new("tail"), 1000.0);
        let trigger = ViewportTrigger::new(viewport.clone(), options(true));
        let checks = trigger.near_checks();

        viewport.scroll_to(700.0);
        settle().await;
        assert!(trigger.is_near_screen());

        viewport.scroll_to(0.0);
        settle().await;
        viewport.scroll_to(700.0);
        settle().await;
        assert!(trigger.is_near_screen());
        assert_eq!(*checks.borrow(), 1);

        trigger.set_external_ref(Some(SentinelRef::new("other")));
        assert!(trigger.target().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn switching_refs_reattaches() {
        let viewport = Arc::new(ScrollViewport::new(400.0));
        viewport.place(SentinelRef::new("tail"), 5000.0);
        let trigger = ViewportTrigger::new(viewport.clone(), options(false));
        assert_eq!(trigger.target(), Some(SentinelRef::new("tail")));

        let fallback = trigger.fallback_ref().clone();
        viewport.place(fallback.clone(), 100.0);
        trigger.set_external_ref(None);
        settle().await;
        assert_eq!(trigger.target(), Some(fallback));
        assert!(trigger.is_near_screen());

        trigger.set_external_ref(Some(SentinelRef::new("tail")));
        viewport.scroll_to(10.0);
        settle().await;
        assert!(!trigger.is_near_screen(), "old fallback sentinel no longer observed");
    }

    #[tokio::test(start_paused = true)]
    async fn drive_fires_on_every_near_report() {
        let viewport = Arc::new(ScrollViewport::new(400.0));
        viewport.place(SentinelRef::new("tail"), 1000.0);
        let trigger = ViewportTrigger::new(viewport.clone(), options(false));
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let _driver = trigger.drive(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        viewport.scroll_to(600.0);
        settle().await;
        viewport.scroll_to(620.0);
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        trigger.disconnect();
        viewport.scroll_to(640.0);
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }
}
