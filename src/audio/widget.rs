use crate::error::WidgetError;
use serde::Deserialize;

/// Sound metadata as reported by the remote widget's `getCurrentSound`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct SoundInfo {
    pub title: Option<String>,
    pub user: Option<SoundUser>,
    pub artwork_url: Option<String>,
    /// Milliseconds.
    pub duration: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct SoundUser {
    pub username: Option<String>,
    pub avatar_url: Option<String>,
}

/// Lifecycle notifications emitted by the widget.
#[derive(Clone, Debug, PartialEq)]
pub enum WidgetEvent {
    Ready,
    Loaded,
    Play,
    Pause,
    Finish,
    Error(String),
}

/// The third-party embedded player that produces audible output.
///
/// Calls are fire-and-forget from the engine's point of view; failures are
/// reported back but never retried automatically.
pub trait RemoteWidget: Send {
    fn load(&mut self, track_url: &str, auto_play: bool) -> Result<(), WidgetError>;
    fn play(&mut self) -> Result<(), WidgetError>;
    fn pause(&mut self) -> Result<(), WidgetError>;
    fn seek_to(&mut self, position_ms: f64) -> Result<(), WidgetError>;
    fn position_ms(&mut self) -> Result<f64, WidgetError>;
    /// Linear volume in `[0, 1]`.
    fn set_volume(&mut self, volume: f64) -> Result<(), WidgetError>;
    fn current_sound(&mut self) -> Result<Option<SoundInfo>, WidgetError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sound_info_parses_widget_payload() {
        let payload = r#"{
            "title": "Over Critical",
            "duration": 215000,
            "artwork_url": null,
            "user": { "username": "someone", "avatar_url": "https://i1.example/a.jpg" },
            "kind": "track"
        }"#;
        let sound: SoundInfo = serde_json::from_str(payload).expect("valid payload");
        assert_eq!(sound.title.as_deref(), Some("Over Critical"));
        assert_eq!(sound.duration, Some(215_000.0));
        assert_eq!(sound.artwork_url, None);
        assert_eq!(
            sound.user.and_then(|user| user.username).as_deref(),
            Some("someone")
        );
    }
}
