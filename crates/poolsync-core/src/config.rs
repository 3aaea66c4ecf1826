// ── Runtime tuning ──
//
// Pacing and sizing knobs for the primitives. Built by the config crate or
// by hand; core never reads config files.

use std::time::Duration;

use crate::error::SyncError;

/// Tuning shared by every primitive mounted on one screen.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncTuning {
    /// Trailing debounce window for runner triggers.
    pub debounce: Duration,
    /// Entries per pool page.
    pub page_size: u32,
    /// Items shown by a freshly reset window.
    pub window_init_length: usize,
    /// Items added per window growth step.
    pub window_step: usize,
    /// Artificial settle delay applied to each window growth.
    pub window_settle: Duration,
    /// Margin (px) within which a sentinel counts as near the viewport.
    pub viewport_distance: f64,
    /// Stop observing after the first near transition.
    pub viewport_once: bool,
}

impl Default for SyncTuning {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(100),
            page_size: 20,
            window_init_length: 10,
            window_step: 20,
            window_settle: Duration::from_millis(150),
            viewport_distance: 100.0,
            viewport_once: true,
        }
    }
}

impl SyncTuning {
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.page_size == 0 {
            return Err(SyncError::configuration("page_size must be at least 1"));
        }
        if self.window_init_length == 0 {
            return Err(SyncError::configuration(
                "window_init_length must be at least 1",
            ));
        }
        if self.window_step == 0 {
            return Err(SyncError::configuration("window_step must be at least 1"));
        }
        if !self.viewport_distance.is_finite() || self.viewport_distance < 0.0 {
            return Err(SyncError::configuration(format!(
                "viewport_distance must be a non-negative number, got {}",
                self.viewport_distance
            )));
        }
        Ok(())
    }
}
