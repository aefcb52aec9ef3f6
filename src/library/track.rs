use crate::audio::widget::SoundInfo;
use reqwest::Url;
use serde::Serialize;
use std::fmt;

/// Sentinel reported when no directly fetchable stream could be obtained.
pub const WIDGET_ONLY_SENTINEL: &str = "widget://soundcloud";

/// Either a directly fetchable audio URL or the widget-only sentinel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "url", rename_all = "snake_case")]
pub enum StreamHandle {
    Direct(String),
    WidgetOnly,
}

impl StreamHandle {
    pub fn is_direct(&self) -> bool {
        matches!(self, StreamHandle::Direct(_))
    }

    pub fn direct_url(&self) -> Option<&str> {
        match self {
            StreamHandle::Direct(url) => Some(url),
            StreamHandle::WidgetOnly => None,
        }
    }
}

impl fmt::Display for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamHandle::Direct(url) => f.write_str(url),
            StreamHandle::WidgetOnly => f.write_str(WIDGET_ONLY_SENTINEL),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackReference {
    pub url: String,
    pub handle: Option<StreamHandle>,
}

impl TrackReference {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            handle: None,
        }
    }

    pub fn with_handle(mut self, handle: StreamHandle) -> Self {
        self.handle = Some(handle);
        self
    }
}

/// Display metadata reported by the widget for the loaded sound.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TrackInfo {
    pub title: String,
    pub artist: String,
    pub artwork: String,
    pub duration_ms: f64,
    pub position_ms: f64,
}

impl TrackInfo {
    pub fn from_sound(sound: &SoundInfo) -> Self {
        let title = sound
            .title
            .as_deref()
            .filter(|title| !title.trim().is_empty())
            .unwrap_or("Untitled Track")
            .to_string();
        let user = sound.user.as_ref();
        let artist = user
            .and_then(|user| user.username.as_deref())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or("Unknown Artist")
            .to_string();
        let artwork = sound
            .artwork_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .map(|url| url.replace("-large", "-t500x500"))
            .or_else(|| user.and_then(|user| user.avatar_url.clone()))
            .unwrap_or_default();
        let duration_ms = sound
            .duration
            .filter(|duration| duration.is_finite() && *duration > 0.0)
            .unwrap_or(0.0);

        Self {
            title,
            artist,
            artwork,
            duration_ms,
            position_ms: 0.0,
        }
    }
}

/// Embed URL the host uses to instantiate the widget for `track_url`.
pub fn embed_url(base: &str, track_url: &str) -> Result<String, String> {
    Url::parse_with_params(
        base,
        &[
            ("url", track_url),
            ("color", "ff5500"),
            ("auto_play", "false"),
            ("hide_related", "true"),
            ("show_comments", "false"),
            ("show_user", "true"),
            ("show_reposts", "false"),
            ("show_teaser", "false"),
            ("visual", "true"),
        ],
    )
    .map(String::from)
    .map_err(|e| format!("Invalid widget base URL {base}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::widget::SoundUser;

    #[test]
    fn sentinel_displays_widget_scheme() {
        assert_eq!(StreamHandle::WidgetOnly.to_string(), WIDGET_ONLY_SENTINEL);
        assert!(!StreamHandle::WidgetOnly.is_direct());
        let direct = StreamHandle::Direct("https://cdn.example/a.mp3".to_string());
        assert_eq!(direct.direct_url(), Some("https://cdn.example/a.mp3"));
    }

    #[test]
    fn track_info_upgrades_artwork_and_fills_defaults() {
        let sound = SoundInfo {
            title: Some("Over Critical".to_string()),
            user: Some(SoundUser {
                username: Some("someone".to_string()),
                avatar_url: Some("https://i1.example/avatar.jpg".to_string()),
            }),
            artwork_url: Some("https://i1.example/art-large.jpg".to_string()),
            duration: Some(215_000.0),
        };
        let info = TrackInfo::from_sound(&sound);
        assert_eq!(info.title, "Over Critical");
        assert_eq!(info.artist, "someone");
        assert_eq!(info.artwork, "https://i1.example/art-t500x500.jpg");
        assert_eq!(info.duration_ms, 215_000.0);

        let bare = TrackInfo::from_sound(&SoundInfo::default());
        assert_eq!(bare.title, "Untitled Track");
        assert_eq!(bare.artist, "Unknown Artist");
        assert!(bare.artwork.is_empty());
        assert_eq!(bare.duration_ms, 0.0);
    }

    #[test]
    fn artwork_falls_back_to_avatar() {
        let sound = SoundInfo {
            user: Some(SoundUser {
                username: None,
                avatar_url: Some("https://i1.example/avatar.jpg".to_string()),
            }),
            ..SoundInfo::default()
        };
        assert_eq!(
            TrackInfo::from_sound(&sound).artwork,
            "https://i1.example/avatar.jpg"
        );
    }

    #[test]
    fn embed_url_encodes_track_url() {
        let url = embed_url(
            "https://w.soundcloud.com/player/",
            "https://soundcloud.com/artist/track name",
        )
        .expect("base is valid");
        assert!(url.starts_with("https://w.soundcloud.com/player/?url="));
        assert!(url.contains("auto_play=false"));
        assert!(!url.contains("track name"));
    }
}
