use super::ingest::BiosignalSample;
use serde::Serialize;

/// Running min/max of the score for the current control session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct CalibrationWindow {
    pub min: f64,
    pub max: f64,
    pub started: bool,
}

#[derive(Debug, Default)]
pub struct CalibrationTracker {
    window: CalibrationWindow,
}

impl CalibrationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn window(&self) -> CalibrationWindow {
        self.window
    }

    pub fn reset(&mut self) {
        self.window = CalibrationWindow::default();
    }

    /// Zero and non-finite scores carry no calibration information and are skipped.
    pub fn update(&mut self, sample: &BiosignalSample) {
        let score = sample.score;
        if !is_usable(score) {
            return;
        }
        if !self.window.started {
            self.window = CalibrationWindow {
                min: score,
                max: score,
                started: true,
            };
            return;
        }
        self.window.min = self.window.min.min(score);
        self.window.max = self.window.max.max(score);
    }

    /// Maps the score into `[0, 1]`; `None` means "hold the last output".
    pub fn normalize(&self, sample: &BiosignalSample) -> Option<f64> {
        let score = sample.score;
        if !self.window.started || !is_usable(score) {
            return None;
        }
        let range = self.window.max - self.window.min;
        if !range.is_finite() || range <= 0.0 {
            return None;
        }
        let normalized = (score - self.window.min) / range;
        normalized.is_finite().then(|| normalized.clamp(0.0, 1.0))
    }
}

fn is_usable(score: f64) -> bool {
    score.is_finite() && score != 0.0
}
