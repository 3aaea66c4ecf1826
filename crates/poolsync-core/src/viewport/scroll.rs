// ── Scroll geometry observer ──
//
// A headless `ViewportObserver`: a one-dimensional scroll container with
// named sentinel positions. Hosts without a real layout engine (the CLI
// replay, tests) drive the trigger through it.

use std::collections::HashMap;

use futures_util::StreamExt;
use futures_util::future::ready;
use futures_util::stream::BoxStream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use super::{IntersectionEntry, SentinelRef, ViewportObserver};

#[derive(Debug, Clone, Default)]
struct Geometry {
    offset: f64,
    height: f64,
    sentinels: HashMap<SentinelRef, f64>,
}

impl Geometry {
    fn gap(&self, target: &SentinelRef) -> Option<f64> {
        let position = *self.sentinels.get(target)?;
        let bottom = self.offset + self.height;
        let gap = if position < self.offset {
            self.offset - position
        } else if position > bottom {
            position - bottom
        } else {
            0.0
        };
        Some(gap)
    }
}

/// Vertical scroll container with sentinels at fixed positions.
#[derive(Debug)]
pub struct ScrollViewport {
    geometry: watch::Sender<Geometry>,
}

impl ScrollViewport {
    pub fn new(height: f64) -> Self {
        let (geometry, _) = watch::channel(Geometry {
            height: height.max(0.0),
            ..Geometry::default()
        });
        Self { geometry }
    }

    pub fn offset(&self) -> f64 {
        self.geometry.borrow().offset
    }

    pub fn height(&self) -> f64 {
        self.geometry.borrow().height
    }

    pub fn scroll_to(&self, offset: f64) {
        self.geometry.send_modify(|g| g.offset = offset.max(0.0));
    }

    pub fn scroll_by(&self, delta: f64) {
        self.geometry.send_modify(|g| g.offset = (g.offset + delta).max(0.0));
    }

    pub fn resize(&self, height: f64) {
        self.geometry.send_modify(|g| g.height = height.max(0.0));
    }

    /// Place (or move) a sentinel at `position`.
    pub fn place(&self, sentinel: SentinelRef, position: f64) {
        self.geometry.send_modify(|g| {
            g.sentinels.insert(sentinel, position);
        });
    }

    pub fn remove(&self, sentinel: &SentinelRef) {
        self.geometry.send_if_modified(|g| g.sentinels.remove(sentinel).is_some());
    }

    /// Current gap between `sentinel` and the visible area.
    pub fn gap(&self, sentinel: &SentinelRef) -> Option<f64> {
        self.geometry.borrow().gap(sentinel)
    }
}

impl ViewportObserver for ScrollViewport {
    fn observe(&self, target: &SentinelRef) -> BoxStream<'static, IntersectionEntry> {
        let target = target.clone();
        WatchStream::new(self.geometry.subscribe())
            .filter_map(move |geometry| {
                let entry = geometry.gap(&target).map(|gap| IntersectionEntry {
                    target: target.clone(),
                    gap,
                });
                ready(entry)
            })
            .boxed()
    }
}
