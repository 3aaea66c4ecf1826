//! Resource synchronization layer between a pool backend and list screens.
//!
//! This crate owns the client-side machinery that keeps large, server-held
//! resource pools (VMs, hosts, clusters, ...) in sync with what a screen
//! shows:
//!
//! - **[`RequestRunner`]** / **[`BatchRunner`]**: Fire-and-forget fetches
//!   with a trailing debounce, `loading` / `reloading` / `error` published
//!   through `tokio::sync::watch`, and an unmount guard that discards late
//!   results.
//!
//! - **[`PageLoader`]**: Cursor pagination over a pool. Each answer is the
//!   cumulative window and replaces a [`ResourceCollection`]; a short
//!   answer ends the list.
//!
//! - **[`WindowedList`]**: Paced, incremental rendering of a list that is
//!   already in memory.
//!
//! - **[`ViewportTrigger`]**: Turns sentinel proximity to the viewport into
//!   load-more signals. [`ScrollViewport`] supplies observations for hosts
//!   without a layout engine.
//!
//! - **[`PushReconciler`]**: Applies create / update / delete push events
//!   to the same collection, deduplicated per delivery.
//!
//! Transports stay outside: fetches go through [`PageSource`], push events
//! through [`PushSource`].

pub mod batch;
pub mod config;
pub mod error;
pub mod model;
pub mod pager;
pub mod push;
pub mod request;
pub mod store;
pub mod stream;
pub mod viewport;
pub mod window;

// ── Primary re-exports ──────────────────────────────────────────────
pub use batch::{BatchRequest, BatchRunner};
pub use config::SyncTuning;
pub use error::SyncError;
pub use pager::{PageLoader, PagerState};
pub use push::{
    Delivery, DeliveryKey, DeliveryLedger, Effect, LiveEvent, PushHub, PushReconciler,
    PushSource, PushStats,
};
pub use request::{
    FetchOptions, PageSource, RequestRunner, RequestState, RequestStatus, SettleHook,
};
pub use store::ResourceCollection;
pub use stream::CollectionStream;
pub use viewport::{
    IntersectionEntry, ScrollViewport, SentinelRef, TriggerOptions, ViewportObserver,
    ViewportTrigger,
};
pub use window::{WindowState, WindowedList};

pub use model::{
    FilterQuery, Page, PageRange, PushEvent, PushOperation, RequestPayload, Resource, ResourceId,
    ResourceKind,
};
