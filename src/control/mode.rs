use super::calibration::CalibrationTracker;
use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which playback parameter the biosignal currently drives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    #[default]
    Volume,
    Filter,
    Tempo,
}

impl ControlMode {
    pub const ALL: [ControlMode; 3] = [ControlMode::Volume, ControlMode::Filter, ControlMode::Tempo];

    pub fn as_str(self) -> &'static str {
        match self {
            ControlMode::Volume => "volume",
            ControlMode::Filter => "filter",
            ControlMode::Tempo => "tempo",
        }
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlMode {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        ControlMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == normalized)
            .ok_or_else(|| EngineError::InvalidParameter(format!("unknown control mode '{value}'")))
    }
}

/// Selects the active control mode and gates whether control is applied at all.
/// Transitions happen only on explicit selection; every transition restarts calibration.
#[derive(Debug, Default)]
pub struct ControlModeRouter {
    mode: ControlMode,
    active: bool,
}

impl ControlModeRouter {
    pub fn new(mode: ControlMode) -> Self {
        Self {
            mode,
            active: false,
        }
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The mode the signal drives this cycle, if control is active.
    pub fn driven(&self) -> Option<ControlMode> {
        self.active.then_some(self.mode)
    }

    /// Returns `true` if the mode changed. Selecting the current mode is a no-op.
    pub fn select(&mut self, mode: ControlMode, calibration: &mut CalibrationTracker) -> bool {
        if mode == self.mode {
            return false;
        }
        self.mode = mode;
        calibration.reset();
        true
    }

    /// Returns `true` if activation toggled. Toggling either way restarts calibration.
    pub fn set_active(&mut self, active: bool, calibration: &mut CalibrationTracker) -> bool {
        if active == self.active {
            return false;
        }
        self.active = active;
        calibration.reset();
        true
    }
}
