use super::mode::ControlMode;
use crate::config::EngineConfig;
use serde::Serialize;

pub const MAX_VOLUME: f64 = 100.0;
pub const MIN_FILTER_HZ: f64 = 200.0;
pub const MAX_FILTER_HZ: f64 = 20_000.0;
pub const MIN_RATE: f64 = 0.5;
pub const MAX_RATE: f64 = 1.5;
pub const NEUTRAL_RATE: f64 = 1.0;

/// Parameters currently applied to the playback engines.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PlaybackParameters {
    pub volume_percent: f64,
    pub filter_frequency_hz: f64,
    pub playback_rate: f64,
}

impl Default for PlaybackParameters {
    fn default() -> Self {
        Self {
            volume_percent: 50.0,
            filter_frequency_hz: MAX_FILTER_HZ,
            playback_rate: NEUTRAL_RATE,
        }
    }
}

impl PlaybackParameters {
    pub fn apply(&mut self, change: ParameterChange) {
        match change {
            ParameterChange::Volume(percent) => self.volume_percent = percent,
            ParameterChange::Filter { frequency_hz, .. } => self.filter_frequency_hz = frequency_hz,
            ParameterChange::Tempo(rate) => self.playback_rate = rate,
        }
    }
}

/// The single field a mapping cycle drives.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParameterChange {
    Volume(f64),
    Filter { amount: f64, frequency_hz: f64 },
    Tempo(f64),
}

#[derive(Clone, Debug)]
pub struct ParameterMapper {
    min_volume: f64,
    hysteresis: f64,
    release_step: f64,
}

impl ParameterMapper {
    pub fn new(min_volume: f64, hysteresis: f64, release_step: f64) -> Self {
        let min_volume = if min_volume.is_finite() {
            min_volume.clamp(0.0, MAX_VOLUME)
        } else {
            0.0
        };
        Self {
            min_volume,
            hysteresis: hysteresis.max(0.0),
            release_step: release_step.abs().max(f64::EPSILON),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.min_volume,
            config.tempo_hysteresis,
            config.tempo_release_step,
        )
    }

    pub fn min_volume(&self) -> f64 {
        self.min_volume
    }

    /// Starting parameters with the volume lifted onto the floor.
    pub fn initial_parameters(&self) -> PlaybackParameters {
        let defaults = PlaybackParameters::default();
        PlaybackParameters {
            volume_percent: self.clamp_volume(defaults.volume_percent),
            ..defaults
        }
    }

    pub fn volume_for(&self, normalized: f64) -> f64 {
        let n = sanitize_unit(normalized);
        self.clamp_volume(self.min_volume + n * (MAX_VOLUME - self.min_volume))
    }

    /// Filter amount shares the volume band.
    pub fn filter_amount(&self, normalized: f64) -> f64 {
        self.volume_for(normalized)
    }

    pub fn rate_for(&self, normalized: f64) -> f64 {
        let n = sanitize_unit(normalized);
        (MIN_RATE + n * (MAX_RATE - MIN_RATE)).clamp(MIN_RATE, MAX_RATE)
    }

    pub fn clamp_volume(&self, percent: f64) -> f64 {
        if !percent.is_finite() {
            return self.min_volume;
        }
        percent.clamp(self.min_volume, MAX_VOLUME)
    }

    /// `None` input (hold) never produces a change. Tempo changes inside the
    /// hysteresis band are suppressed.
    pub fn map(
        &self,
        normalized: Option<f64>,
        mode: ControlMode,
        current: &PlaybackParameters,
    ) -> Option<ParameterChange> {
        let normalized = normalized.filter(|n| n.is_finite())?;
        match mode {
            ControlMode::Volume => Some(ParameterChange::Volume(self.volume_for(normalized))),
            ControlMode::Filter => {
                let amount = self.filter_amount(normalized);
                Some(ParameterChange::Filter {
                    amount,
                    frequency_hz: frequency_for_amount(amount),
                })
            }
            ControlMode::Tempo => {
                let rate = self.rate_for(normalized);
                ((rate - current.playback_rate).abs() > self.hysteresis)
                    .then_some(ParameterChange::Tempo(rate))
            }
        }
    }

    /// Glides a non-neutral rate back toward 1.0 once Tempo is no longer driven.
    pub fn relax_rate(&self, current: f64) -> Option<ParameterChange> {
        if !current.is_finite() {
            return Some(ParameterChange::Tempo(NEUTRAL_RATE));
        }
        let delta = NEUTRAL_RATE - current;
        if delta == 0.0 {
            return None;
        }
        let step = delta.clamp(-self.release_step, self.release_step);
        let next = current + step;
        let next = if (NEUTRAL_RATE - next).abs() <= self.hysteresis {
            NEUTRAL_RATE
        } else {
            next
        };
        Some(ParameterChange::Tempo(next.clamp(MIN_RATE, MAX_RATE)))
    }
}

/// Logarithmic cutoff for a filter amount in percent: 0 → 200 Hz, 100 → 20 kHz.
pub fn frequency_for_amount(amount: f64) -> f64 {
    let amount = if amount.is_finite() {
        amount.clamp(0.0, 100.0)
    } else {
        100.0
    };
    (MIN_FILTER_HZ * (MAX_FILTER_HZ / MIN_FILTER_HZ).powf(amount / 100.0))
        .clamp(MIN_FILTER_HZ, MAX_FILTER_HZ)
}

fn sanitize_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
