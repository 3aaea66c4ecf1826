//! CLI error types with miette diagnostics.
//!
//! Maps config and fixture failures into user-facing errors with
//! actionable help text and stable exit codes.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use poolsync_config::ConfigError;
use poolsync_core::SyncError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const FIXTURE: i32 = 4;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────

    #[error(transparent)]
    #[diagnostic(
        code(poolsync::config),
        help("Inspect the effective settings with: poolsync config show")
    )]
    Config(#[from] ConfigError),

    // ── Fixtures ─────────────────────────────────────────────────────

    #[error("Could not read fixture {}", path.display())]
    #[diagnostic(code(poolsync::fixture_io), help("Check that the file exists and is readable."))]
    FixtureRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Fixture {} is not valid", path.display())]
    #[diagnostic(
        code(poolsync::fixture_format),
        help(
            "Pools are a JSON array of items or {{\"kind\", \"items\"}}.\n\
             Event logs are a JSON array of {{\"kind\", \"resource_id\", \"operation\", \"payload\"}}."
        )
    )]
    FixtureFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(poolsync::validation))]
    Validation { field: String, reason: String },

    // ── Replay ───────────────────────────────────────────────────────

    #[error("Pool request failed: {0}")]
    #[diagnostic(code(poolsync::request), help("Re-run with -vv to see the request log."))]
    Request(#[from] SyncError),

    #[error("Replay stalled: {stage}")]
    #[diagnostic(code(poolsync::stalled))]
    Stalled { stage: String },

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(poolsync::render))]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => exit_code::CONFIG,
            Self::FixtureRead { .. } | Self::FixtureFormat { .. } => exit_code::FIXTURE,
            Self::Validation { .. } => exit_code::USAGE,
            Self::Request(_) | Self::Stalled { .. } | Self::Io(_) | Self::Render(_) => {
                exit_code::GENERAL
            }
        }
    }
}
