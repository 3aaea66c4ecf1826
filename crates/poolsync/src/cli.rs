//! Clap derive structures for the `poolsync` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// poolsync -- replay pool fixtures through the synchronization layer
#[derive(Debug, Parser)]
#[command(
    name = "poolsync",
    version,
    about = "Replay resource pools and push events through the poolsync layer",
    long_about = "Serves a pool fixture page by page, scrolls a headless viewport until\n\
        the pool is exhausted, reconciles a push event log into the result,\n\
        and prints the collection a list screen would show.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file to use instead of the platform default
    #[arg(long, env = "POOLSYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format (defaults to the config file's `defaults.output`)
    #[arg(long, short = 'o', global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load a pool fixture to exhaustion and reconcile push events into it
    #[command(alias = "r")]
    Replay(ReplayArgs),

    /// Inspect or create the configuration file
    Config(ConfigArgs),
}

// ── Replay ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// Pool fixture (JSON array of items, or `{"kind", "items", "latency_ms"}`)
    #[arg(long)]
    pub pool: PathBuf,

    /// Push event log (JSON array of events)
    #[arg(long)]
    pub events: Option<PathBuf>,

    /// Resource kind to subscribe to (defaults to the fixture's kind, then "vm")
    #[arg(long)]
    pub kind: Option<String>,

    /// Entries per page (overrides `pager.page_size`)
    #[arg(long)]
    pub page_size: Option<u32>,

    /// Only serve items matching KEY=VALUE (repeatable)
    #[arg(long = "filter", value_name = "KEY=VALUE")]
    pub filters: Vec<String>,

    /// Height of the headless viewport, in pixels
    #[arg(long, default_value_t = 600.0)]
    pub viewport_height: f64,

    /// Height of one rendered row, in pixels
    #[arg(long, default_value_t = 40.0)]
    pub row_height: f64,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration and resolved tuning
    Show,

    /// Print the config file path
    Path,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
