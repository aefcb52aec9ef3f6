pub mod audio;
pub mod config;
pub mod control;
pub mod error;
pub mod library;
pub mod session;

pub use config::EngineConfig;
pub use control::mode::ControlMode;
pub use error::EngineError;
pub use session::driver::SessionDriver;
pub use session::{BiofeedbackSession, EngineEvent, PlayerSnapshot};

#[cfg(feature = "tauri-state")]
use audio::analyzer::VisualizationSnapshot;

#[cfg(feature = "tauri-state")]
#[tauri::command]
pub fn set_control_mode(state: tauri::State<'_, SessionDriver>, mode: String) -> Result<(), String> {
    let mode: ControlMode = mode.parse().map_err(|e: EngineError| e.to_string())?;
    state
        .send(EngineEvent::SetControlMode(mode))
        .map_err(|e| e.to_string())
}

#[cfg(feature = "tauri-state")]
#[tauri::command]
pub fn set_active(state: tauri::State<'_, SessionDriver>, active: bool) -> Result<(), String> {
    state
        .send(EngineEvent::SetActive(active))
        .map_err(|e| e.to_string())
}

#[cfg(feature = "tauri-state")]
#[tauri::command]
pub fn load_track(state: tauri::State<'_, SessionDriver>, url: String) -> Result<(), String> {
    state
        .send(EngineEvent::LoadTrack(url))
        .map_err(|e| e.to_string())
}

#[cfg(feature = "tauri-state")]
#[tauri::command]
pub fn set_manual_volume(state: tauri::State<'_, SessionDriver>, percent: f64) -> Result<(), String> {
    state
        .send(EngineEvent::SetManualVolume(percent))
        .map_err(|e| e.to_string())
}

#[cfg(feature = "tauri-state")]
#[tauri::command]
pub fn seek(state: tauri::State<'_, SessionDriver>, fraction: f64) -> Result<(), String> {
    state
        .send(EngineEvent::Seek(fraction))
        .map_err(|e| e.to_string())
}

#[cfg(feature = "tauri-state")]
#[tauri::command]
pub fn play(state: tauri::State<'_, SessionDriver>) -> Result<(), String> {
    state.send(EngineEvent::Play).map_err(|e| e.to_string())
}

#[cfg(feature = "tauri-state")]
#[tauri::command]
pub fn pause(state: tauri::State<'_, SessionDriver>) -> Result<(), String> {
    state.send(EngineEvent::Pause).map_err(|e| e.to_string())
}

#[cfg(feature = "tauri-state")]
#[tauri::command]
pub fn player_status(state: tauri::State<'_, SessionDriver>) -> Result<PlayerSnapshot, String> {
    state.status().map_err(|e| e.to_string())
}

#[cfg(feature = "tauri-state")]
#[tauri::command]
pub fn visualization(
    state: tauri::State<'_, SessionDriver>,
) -> Result<VisualizationSnapshot, String> {
    state.visualization().map_err(|e| e.to_string())
}
