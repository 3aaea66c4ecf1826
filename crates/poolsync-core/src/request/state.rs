// ── Request state and options ──

use std::sync::Arc;
use std::time::Duration;

use crate::error::SyncError;

/// Coarse status of a runner, derived from [`RequestState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum RequestStatus {
    Idle,
    Loading,
    Reloading,
    Error,
}

/// The reactive view a runner publishes.
///
/// `loading` marks a fetch with no data to show yet; `reloading` marks a
/// background refresh while the last good `data` stays on screen.
#[derive(Debug)]
pub struct RequestState<T> {
    pub data: Option<Arc<T>>,
    pub loading: bool,
    pub reloading: bool,
    pub error: Option<SyncError>,
}

impl<T> Default for RequestState<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            reloading: false,
            error: None,
        }
    }
}

// Manual impl: `Arc<T>` is cloneable for any `T`.
impl<T> Clone for RequestState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            loading: self.loading,
            reloading: self.reloading,
            error: self.error.clone(),
        }
    }
}

impl<T> RequestState<T> {
    pub fn is_busy(&self) -> bool {
        self.loading || self.reloading
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn status(&self) -> RequestStatus {
        if self.reloading {
            RequestStatus::Reloading
        } else if self.loading {
            RequestStatus::Loading
        } else if self.error.is_some() {
            RequestStatus::Error
        } else {
            RequestStatus::Idle
        }
    }
}

/// Per-call options for a runner trigger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Keep the current data visible and flag `reloading` instead of `loading`.
    pub reload: bool,
    /// Extra wait before the fetch, in milliseconds. Must be non-negative.
    pub delay_ms: i64,
}

impl FetchOptions {
    pub fn reload() -> Self {
        Self {
            reload: true,
            delay_ms: 0,
        }
    }

    #[must_use]
    pub fn with_delay_ms(mut self, delay_ms: i64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Validate `delay_ms` into a `Duration`.
    pub fn delay(&self) -> Result<Duration, SyncError> {
        u64::try_from(self.delay_ms)
            .map(Duration::from_millis)
            .map_err(|_| {
                SyncError::configuration(format!(
                    "fetch delay must be a non-negative integer, got {}",
                    self.delay_ms
                ))
            })
    }
}
