//! Error types for the playback control engine.
use thiserror::Error;

/// Remote playback widget failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WidgetError {
    #[error("widget is not ready")]
    NotReady,

    #[error("widget call failed: {0}")]
    Call(String),
}

/// Audio processing graph failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    /// The processing context is not yet permitted to start (no user gesture yet).
    #[error("audio context is suspended until the next user interaction")]
    Suspended,

    #[error("audio graph is closed")]
    Closed,

    #[error("node connection failed: {0}")]
    Connect(String),
}

/// Shadow audio element failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShadowError {
    #[error("shadow element has no source")]
    NoSource,

    #[error("shadow element was released")]
    Released,

    #[error("stream fetch failed: {0}")]
    Fetch(String),

    #[error("stream decode failed: {0}")]
    Decode(String),
}

/// A single stream-resolution step failed. Never escapes the resolver.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("invalid URL: {0}")]
    Url(String),

    #[error("malformed response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no credential tokens configured")]
    NoCredentials,

    #[error("response carried no usable stream field")]
    NoStreamField,

    #[error("no stream URL found in markup")]
    NoMatch,

    #[error("resolution cancelled")]
    Cancelled,

    #[error("fetch failed: {0}")]
    Other(String),
}

/// Configuration loading failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Engine-level errors.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The widget reported a load or playback failure. The only error surfaced to the UI.
    #[error("playback engine error: {0}")]
    PlaybackEngine(String),

    #[error(transparent)]
    Widget(#[from] WidgetError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Shadow(#[from] ShadowError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("session event loop has stopped")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, EngineError>;
