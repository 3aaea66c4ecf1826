//! Config subcommand handlers.

use std::time::Duration;

use serde::Serialize;

use poolsync_core::SyncTuning;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

/// Resolved tuning as the primitives will see it.
#[derive(Debug, Serialize)]
struct TuningView {
    debounce_ms: u64,
    page_size: u32,
    window_init_length: usize,
    window_step: usize,
    window_settle_ms: u64,
    viewport_distance: f64,
    viewport_once: bool,
}

impl From<&SyncTuning> for TuningView {
    fn from(t: &SyncTuning) -> Self {
        Self {
            debounce_ms: millis(t.debounce),
            page_size: t.page_size,
            window_init_length: t.window_init_length,
            window_step: t.window_step,
            window_settle_ms: millis(t.window_settle),
            viewport_distance: t.viewport_distance,
            viewport_once: t.viewport_once,
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Serialize)]
struct ShowReport<'a> {
    path: String,
    config: &'a Config,
    tuning: TuningView,
}

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let cfg = config::load(global)?;
            let tuning = cfg.to_tuning()?;
            let report = ShowReport {
                path: config::active_path(global).display().to_string(),
                config: &cfg,
                tuning: TuningView::from(&tuning),
            };
            let out = match config::output_format(global, &cfg) {
                OutputFormat::Json => output::render_json(&report)?,
                OutputFormat::Table => render_toml(&report)?,
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Path ────────────────────────────────────────────────────
        ConfigCommand::Path => {
            output::print_output(
                &config::active_path(global).display().to_string(),
                global.quiet,
            );
            Ok(())
        }

        // ── Init ────────────────────────────────────────────────────
        ConfigCommand::Init { force } => {
            let path = config::active_path(global);
            config::init_config(&path, force)?;
            tracing::info!(path = %path.display(), "config written");
            output::print_status(
                &format!("Configuration written to {}", path.display()),
                global.quiet,
            );
            Ok(())
        }
    }
}

fn render_toml(report: &ShowReport<'_>) -> Result<String, CliError> {
    let render = |e: toml::ser::Error| CliError::Render(e.to_string());
    let config = toml::to_string_pretty(report.config).map_err(render)?;
    let tuning = toml::to_string_pretty(&report.tuning).map_err(render)?;
    Ok(format!("# {}\n{config}\n# resolved tuning\n{tuning}", report.path))
}
