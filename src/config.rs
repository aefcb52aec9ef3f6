use crate::error::ConfigError;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR_NAME: &str = "biotune";
const CONFIG_FILE_NAME: &str = "config.json";

/// Engine tuning and stream-acquisition settings. Missing keys fall back to defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Volume floor in percent; the signal modulates loudness within `[min_volume, 100]`.
    pub min_volume: f64,
    pub tempo_hysteresis: f64,
    /// Largest per-sample step when the rate glides back to 1.0 outside Tempo mode.
    pub tempo_release_step: f64,
    pub drift_threshold_secs: f64,
    pub poll_interval_ms: u64,
    pub frame_interval_ms: u64,
    /// Widget seek offset per poll tick for a rate deviation of 1.0.
    pub tempo_nudge_ms: f64,
    pub resolve_endpoint: String,
    /// Tried in order against `resolve_endpoint`; the first usable answer wins.
    pub credential_tokens: Vec<String>,
    /// `{url}` is replaced with the raw track URL, `{url_encoded}` with its percent-encoded form.
    pub proxy_template: String,
    pub widget_embed_base: String,
    pub http_timeout_secs: u64,
    pub user_agent: String,
    /// Route the shadow pipeline to the output instead of keeping it analysis-only.
    pub shadow_audible: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_volume: 50.0,
            tempo_hysteresis: 0.01,
            tempo_release_step: 0.05,
            drift_threshold_secs: 0.3,
            poll_interval_ms: 1000,
            frame_interval_ms: 16,
            tempo_nudge_ms: 100.0,
            resolve_endpoint: "https://api.soundcloud.com/resolve.json".to_string(),
            credential_tokens: Vec::new(),
            proxy_template: "{url}".to_string(),
            widget_embed_base: "https://w.soundcloud.com/player/".to_string(),
            http_timeout_secs: 5,
            user_agent: "BioTune/0.1".to_string(),
            shadow_audible: false,
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads the per-user config file when present; any failure yields the defaults.
    pub fn load_default() -> Self {
        Self::load_or_default(default_config_path().as_deref())
    }

    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path.filter(|path| path.is_file()) else {
            return Self::default();
        };
        match Self::load(path) {
            Ok(config) => config,
            Err(err) => {
                warn!(
                    "Ignoring config at {}: {err}; using defaults",
                    path.display()
                );
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.min_volume.is_finite() || !(0.0..100.0).contains(&self.min_volume) {
            return Err(ConfigError::Invalid(format!(
                "min_volume must lie in [0, 100), got {}",
                self.min_volume
            )));
        }
        if !self.tempo_hysteresis.is_finite() || self.tempo_hysteresis < 0.0 {
            return Err(ConfigError::Invalid(
                "tempo_hysteresis must be a non-negative number".to_string(),
            ));
        }
        if !self.tempo_release_step.is_finite() || self.tempo_release_step <= 0.0 {
            return Err(ConfigError::Invalid(
                "tempo_release_step must be positive".to_string(),
            ));
        }
        if !self.drift_threshold_secs.is_finite() || self.drift_threshold_secs <= 0.0 {
            return Err(ConfigError::Invalid(
                "drift_threshold_secs must be positive".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 || self.frame_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll and frame intervals must be non-zero".to_string(),
            ));
        }
        if !self.proxy_template.contains("{url}") && !self.proxy_template.contains("{url_encoded}")
        {
            return Err(ConfigError::Invalid(
                "proxy_template needs a {url} or {url_encoded} placeholder".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}
