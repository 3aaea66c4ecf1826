// ── Sync error taxonomy ──
//
// Failures the synchronization layer can observe. None of these escape a
// runner: they are folded into the `error` field of the published state.
// A result that arrives after teardown is not an error at all and never
// reaches this type.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Network or HTTP failure reported by the fetch capability.
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// The capability succeeded but returned nothing usable.
    #[error("Malformed response: {context}")]
    MalformedResponse { context: String },

    /// Invalid caller-supplied tuning (negative delay, zero page size, ...).
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl SyncError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn malformed(context: impl Into<String>) -> Self {
        Self::MalformedResponse {
            context: context.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Transport and malformed-response failures are handled identically by
    /// runners; this distinguishes them from caller mistakes.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::MalformedResponse { .. })
    }
}
