//! Shared configuration for poolsync tools.
//!
//! A TOML file in the platform config directory, merged over built-in
//! defaults and `POOLSYNC_`-prefixed environment variables, resolved into
//! the `poolsync_core::SyncTuning` the primitives are built from.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use poolsync_core::{SyncError, SyncTuning};

const ENV_PREFIX: &str = "POOLSYNC_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config file already exists: {}", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl From<SyncError> for ConfigError {
    fn from(err: SyncError) -> Self {
        Self::Validation {
            field: "tuning".into(),
            reason: err.to_string(),
        }
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Output defaults for the CLI.
    #[serde(default)]
    pub defaults: Defaults,

    /// Request runner pacing.
    #[serde(default)]
    pub request: RequestSection,

    /// Pool pagination.
    #[serde(default)]
    pub pager: PagerSection,

    /// Incremental list rendering.
    #[serde(default)]
    pub window: WindowSection,

    /// Sentinel proximity.
    #[serde(default)]
    pub viewport: ViewportSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RequestSection {
    /// Trailing debounce window in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for RequestSection {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    100
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PagerSection {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for PagerSection {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

fn default_page_size() -> u32 {
    20
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WindowSection {
    #[serde(default = "default_init_length")]
    pub init_length: usize,

    #[serde(default = "default_step")]
    pub step: usize,

    /// Settle delay per growth step, in milliseconds.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl Default for WindowSection {
    fn default() -> Self {
        Self {
            init_length: default_init_length(),
            step: default_step(),
            settle_ms: default_settle_ms(),
        }
    }
}

fn default_init_length() -> usize {
    10
}
fn default_step() -> usize {
    20
}
fn default_settle_ms() -> u64 {
    150
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ViewportSection {
    /// Margin in pixels within which a sentinel counts as near.
    #[serde(default = "default_distance")]
    pub distance: f64,

    #[serde(default = "default_once")]
    pub once: bool,
}

impl Default for ViewportSection {
    fn default() -> Self {
        Self {
            distance: default_distance(),
            once: default_once(),
        }
    }
}

fn default_distance() -> f64 {
    100.0
}
fn default_once() -> bool {
    true
}

impl Config {
    /// Resolve into validated runtime tuning.
    pub fn to_tuning(&self) -> Result<SyncTuning, ConfigError> {
        if !matches!(self.defaults.output.as_str(), "table" | "json") {
            return Err(ConfigError::Validation {
                field: "defaults.output".into(),
                reason: format!("expected 'table' or 'json', got '{}'", self.defaults.output),
            });
        }
        let tuning = SyncTuning {
            debounce: Duration::from_millis(self.request.debounce_ms),
            page_size: self.pager.page_size,
            window_init_length: self.window.init_length,
            window_step: self.window.step,
            window_settle: Duration::from_millis(self.window.settle_ms),
            viewport_distance: self.viewport.distance,
            viewport_once: self.viewport.once,
        };
        tuning.validate()?;
        Ok(tuning)
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "poolsync", "poolsync").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("poolsync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file + environment. A missing file is not an
/// error: defaults and environment still apply.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// Write a default config to `path`, refusing to overwrite unless `force`.
pub fn init_config(path: &Path, force: bool) -> Result<Config, ConfigError> {
    if path.exists() && !force {
        return Err(ConfigError::AlreadyExists {
            path: path.to_path_buf(),
        });
    }
    let cfg = Config::default();
    save_config_to(&cfg, path)?;
    Ok(cfg)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use figment::Jail;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_resolve_to_default_tuning() {
        let tuning = Config::default().to_tuning().unwrap();
        assert_eq!(tuning, SyncTuning::default());
    }

    #[test]
    fn file_then_env_override_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                    [pager]
                    page_size = 50

                    [window]
                    step = 5
                "#,
            )?;
            jail.set_env("POOLSYNC_WINDOW__STEP", "7");
            jail.set_env("POOLSYNC_REQUEST__DEBOUNCE_MS", "250");

            let cfg = load_config_from(Path::new("config.toml")).map_err(|e| e.to_string())?;
            assert_eq!(cfg.pager.page_size, 50);
            assert_eq!(cfg.window.step, 7);
            assert_eq!(cfg.window.init_length, 10);

            let tuning = cfg.to_tuning().map_err(|e| e.to_string())?;
            assert_eq!(tuning.debounce, Duration::from_millis(250));
            Ok(())
        });
    }

    #[test]
    fn missing_file_still_loads() {
        Jail::expect_with(|_jail| {
            let cfg = load_config_from(Path::new("nope.toml")).map_err(|e| e.to_string())?;
            assert_eq!(cfg, Config::default());
            Ok(())
        });
    }

    #[test]
    fn invalid_values_fail_validation() {
        let mut cfg = Config::default();
        cfg.pager.page_size = 0;
        assert!(matches!(
            cfg.to_tuning(),
            Err(ConfigError::Validation { .. })
        ));

        let mut cfg = Config::default();
        cfg.defaults.output = "yaml".into();
        let err = cfg.to_tuning().unwrap_err();
        assert!(err.to_string().contains("defaults.output"));
    }

    #[test]
    fn malformed_toml_is_a_figment_error() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[pager]\npage_size = \"many\"\n")?;
            let err = load_config_from(Path::new("config.toml")).unwrap_err();
            assert!(matches!(err, ConfigError::Figment(_)));
            Ok(())
        });
    }

    #[test]
    fn init_writes_once_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let written = init_config(&path, false).unwrap();
        assert!(matches!(
            init_config(&path, false),
            Err(ConfigError::AlreadyExists { .. })
        ));
        init_config(&path, true).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: Config = toml::from_str(&raw).unwrap();
        assert_eq!(parsed, written);
    }
}
