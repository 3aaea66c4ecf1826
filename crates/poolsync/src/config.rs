//! CLI configuration: thin wrapper around `poolsync_config`.
//!
//! Adds the `--config` path override and resolves the effective output
//! format and color mode from flags over file defaults.

use std::path::PathBuf;

use crate::cli::{ColorMode, GlobalOpts, OutputFormat};
use crate::error::CliError;

pub use poolsync_config::{Config, config_path, init_config, load_config_from};

/// The config file in effect: `--config` / `POOLSYNC_CONFIG`, else the platform default.
pub fn active_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config_path)
}

/// Load the effective config for this invocation.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    let path = active_path(global);
    tracing::debug!(path = %path.display(), "loading config");
    Ok(load_config_from(&path)?)
}

/// Output format: flag first, then `defaults.output`.
pub fn output_format(global: &GlobalOpts, cfg: &Config) -> OutputFormat {
    global.output.unwrap_or(match cfg.defaults.output.as_str() {
        "json" => OutputFormat::Json,
        _ => OutputFormat::Table,
    })
}

/// Color mode: an explicit flag wins over `defaults.color`.
pub fn color_mode(global: &GlobalOpts, cfg: &Config) -> ColorMode {
    match global.color {
        ColorMode::Auto => match cfg.defaults.color.as_str() {
            "always" => ColorMode::Always,
            "never" => ColorMode::Never,
            _ => ColorMode::Auto,
        },
        explicit => explicit,
    }
}
