// ── Domain model ──
//
// Identity, request shapes, pages, and push events. Resource payloads
// themselves are generic: the layer only needs a stable identity.

pub mod event;
pub mod identity;
pub mod page;

pub use event::{PushEvent, PushOperation};
pub use identity::{Resource, ResourceId, ResourceKind};
pub use page::{FilterQuery, Page, PageRange, RequestPayload};
