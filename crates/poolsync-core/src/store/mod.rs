// ── Reactive collection store ──
//
// Ordered entity storage with push-based change notification.

mod collection;

pub use collection::ResourceCollection;
