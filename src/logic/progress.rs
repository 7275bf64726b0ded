//! Progress fractions
//!
//! Every value sent to the UI passes through [`ProgressMeter`], which rounds
//! to the nearest 5% and never lets the bar move backwards.

use crate::install_state::InstallStage;

/// Share of the bar covered by module execution.
pub const MODULE_SPAN: f64 = 0.60;

/// Progress after `done` of `total` modules have finished.
pub fn module_progress(done: usize, total: usize) -> f64 {
    let start = InstallStage::ExecuteModules.progress();
    if total == 0 {
        return start + MODULE_SPAN;
    }
    start + MODULE_SPAN * (done.min(total) as f64 / total as f64)
}

/// Round to the nearest 0.05 and clamp into `0.0..=1.0`.
pub fn round_to_step(value: f64) -> f64 {
    ((value * 20.0).round() / 20.0).clamp(0.0, 1.0)
}

/// Monotonic progress value for one attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressMeter {
    last: f64,
}

impl ProgressMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rounded value to emit for `raw`; `None` if the bar would not move.
    pub fn advance(&mut self, raw: f64) -> Option<f64> {
        let value = round_to_step(raw);
        if value <= self.last && self.last > 0.0 {
            return None;
        }
        self.last = value.max(self.last);
        Some(self.last)
    }

    pub fn current(&self) -> f64 {
        self.last
    }
}
