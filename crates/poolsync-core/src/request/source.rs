// ── Fetch capability ──
//
// The transport is an external collaborator. Runners only see this trait.

use std::future::Future;

use futures_util::future::BoxFuture;

use crate::error::SyncError;
use crate::model::RequestPayload;

/// A single asynchronous read against the backend.
///
/// `Ok(None)` means the backend answered without a usable body; runners
/// treat it as a malformed response.
pub trait PageSource<T>: Send + Sync + 'static {
    fn fetch(&self, payload: RequestPayload) -> BoxFuture<'static, Result<Option<T>, SyncError>>;
}

impl<T, F, Fut> PageSource<T> for F
where
    F: Fn(RequestPayload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<T>, SyncError>> + Send + 'static,
{
    fn fetch(&self, payload: RequestPayload) -> BoxFuture<'static, Result<Option<T>, SyncError>> {
        Box::pin(self(payload))
    }
}
