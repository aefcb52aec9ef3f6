use super::graph::AudioGraph;
use super::shadow::{ShadowElement, ShadowEvent};
use super::widget::{RemoteWidget, WidgetEvent};
use crate::config::EngineConfig;
use crate::control::mapper::{PlaybackParameters, NEUTRAL_RATE};
use crate::error::{EngineError, GraphError, Result};
use crate::library::track::{embed_url, StreamHandle, TrackInfo, TrackReference};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::time::Duration;

pub const LOAD_ERROR_MESSAGE: &str = "Error loading track. Please check the URL and try again.";
pub const TRACK_INFO_ERROR_MESSAGE: &str = "Couldn't load track information";

const PROGRESS_REQUESTED: u8 = 10;
const PROGRESS_WIDGET_BOUND: u8 = 60;
const PROGRESS_READY: u8 = 90;
const PROGRESS_COMPLETE: u8 = 100;

/// Rates this close to 1.0 count as neutral for nudging and clock selection.
const RATE_EPSILON: f64 = 1e-6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerStatus {
    Ready,
    Loading,
    Error,
    Playing,
    NoTrack,
}

/// Handed to the stream requester after a load; the answer must carry `generation` back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadRequest {
    pub generation: u64,
    pub track: TrackReference,
    pub embed_url: Option<String>,
}

/// Owns the remote widget and the shadow pipeline and keeps them agreeing on
/// position, loudness, cutoff and rate.
pub struct PlaybackOrchestrator {
    widget: Box<dyn RemoteWidget>,
    shadow: Box<dyn ShadowElement>,
    graph: Box<dyn AudioGraph>,
    drift_threshold_secs: f64,
    tempo_nudge_ms: f64,
    shadow_audible: bool,
    embed_base: String,
    track: Option<TrackReference>,
    handle: Option<StreamHandle>,
    generation: u64,
    applied: PlaybackParameters,
    track_info: Option<TrackInfo>,
    initial: bool,
    loading: bool,
    progress: u8,
    load_error: Option<String>,
    track_loaded: bool,
    playing: bool,
    graph_deferred: bool,
    torn_down: bool,
}

impl PlaybackOrchestrator {
    pub fn new(
        widget: Box<dyn RemoteWidget>,
        mut shadow: Box<dyn ShadowElement>,
        graph: Box<dyn AudioGraph>,
        config: &EngineConfig,
        initial: PlaybackParameters,
    ) -> Self {
        shadow.set_looping(true);
        shadow.set_volume(0.0);
        Self {
            widget,
            shadow,
            graph,
            drift_threshold_secs: config.drift_threshold_secs,
            tempo_nudge_ms: config.tempo_nudge_ms,
            shadow_audible: config.shadow_audible,
            embed_base: config.widget_embed_base.clone(),
            track: None,
            handle: None,
            generation: 0,
            applied: initial,
            track_info: None,
            initial: true,
            loading: false,
            progress: 0,
            load_error: None,
            track_loaded: false,
            playing: false,
            graph_deferred: false,
            torn_down: false,
        }
    }

    pub fn status(&self) -> PlayerStatus {
        if self.initial {
            PlayerStatus::Ready
        } else if self.loading {
            PlayerStatus::Loading
        } else if self.load_error.is_some() {
            PlayerStatus::Error
        } else if self.playing {
            PlayerStatus::Playing
        } else if self.track_loaded {
            PlayerStatus::Ready
        } else {
            PlayerStatus::NoTrack
        }
    }

    pub fn loading_progress(&self) -> u8 {
        self.progress
    }

    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    pub fn track_loaded(&self) -> bool {
        self.track_loaded
    }

    pub fn track_info(&self) -> Option<&TrackInfo> {
        self.track_info.as_ref()
    }

    pub fn track(&self) -> Option<&TrackReference> {
        self.track.as_ref()
    }

    pub fn stream_handle(&self) -> Option<&StreamHandle> {
        self.handle.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn applied(&self) -> PlaybackParameters {
        self.applied
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn graph_deferred(&self) -> bool {
        self.graph_deferred
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Whether the shadow pipeline can currently feed the analyser.
    pub fn has_shadow_pipeline(&self) -> bool {
        self.direct_stream() && self.shadow.sample_rate().is_some() && self.graph.is_connected()
    }

    /// Resets per-track state and points the widget at `url`. Stream acquisition
    /// is left to the caller, which must answer through [`Self::on_stream_resolved`].
    pub fn load(&mut self, url: &str) -> Result<LoadRequest> {
        self.ensure_live()?;
        let url = url.trim();
        if url.is_empty() {
            return Err(EngineError::InvalidParameter("track URL is empty".to_string()));
        }

        self.generation += 1;
        self.initial = false;
        self.loading = true;
        self.progress = PROGRESS_REQUESTED;
        self.load_error = None;
        self.track_loaded = false;
        self.playing = false;
        self.track_info = None;
        self.handle = None;
        self.shadow.pause();
        self.shadow.clear_src();
        self.graph.disconnect_all();
        self.track = Some(TrackReference::new(url));

        let embed = embed_url(&self.embed_base, url)
            .map_err(|e| warn!("Cannot build widget embed URL: {e}"))
            .ok();

        match self.widget.load(url, false) {
            Ok(()) => self.progress = PROGRESS_WIDGET_BOUND,
            Err(err) => self.fail_load(&err.to_string()),
        }
        info!("Loading track {url} (generation {})", self.generation);

        Ok(LoadRequest {
            generation: self.generation,
            track: TrackReference::new(url),
            embed_url: embed,
        })
    }

    /// Re-runs the last load after an error.
    pub fn retry(&mut self) -> Result<LoadRequest> {
        let url = self
            .track
            .as_ref()
            .map(|track| track.url.clone())
            .ok_or_else(|| EngineError::InvalidParameter("no track to retry".to_string()))?;
        self.load(&url)
    }

    /// Returns `false` for answers belonging to an earlier load.
    pub fn on_stream_resolved(&mut self, generation: u64, handle: StreamHandle) -> bool {
        if self.torn_down || generation != self.generation {
            debug!("Ignoring stale stream resolution for generation {generation}");
            return false;
        }
        if let Some(track) = self.track.as_mut() {
            track.handle = Some(handle.clone());
        }
        self.handle = Some(handle.clone());

        match handle {
            StreamHandle::Direct(url) => {
                info!("Shadow pipeline following direct stream {url}");
                self.shadow.set_looping(true);
                self.shadow.set_volume(self.shadow_volume());
                if let Err(err) = self
                    .shadow
                    .set_src(&url)
                    .and_then(|()| self.shadow.set_playback_rate(self.applied.playback_rate))
                {
                    warn!("Shadow element rejected stream: {err}");
                }
                self.push_volume_to_widget();
            }
            StreamHandle::WidgetOnly => {
                warn!("No direct stream available; controlling the widget alone");
                self.shadow.clear_src();
            }
        }
        true
    }

    pub fn on_widget_event(&mut self, event: WidgetEvent) {
        if self.torn_down {
            return;
        }
        match event {
            WidgetEvent::Ready | WidgetEvent::Loaded => {
                if self.loading {
                    self.progress = self.progress.max(PROGRESS_READY);
                }
                self.push_volume_to_widget();
                self.refresh_track_info();
            }
            WidgetEvent::Play => {
                self.playing = true;
                self.track_loaded = true;
                self.loading = false;
                self.start_shadow();
            }
            WidgetEvent::Pause => {
                self.playing = false;
                self.shadow.pause();
            }
            WidgetEvent::Finish => {
                self.playing = false;
                if let Some(info) = self.track_info.as_mut() {
                    info.position_ms = 0.0;
                }
                self.shadow.pause();
                if self.shadow.has_source() {
                    self.sync_shadow_to(0.0);
                }
            }
            WidgetEvent::Error(message) => self.fail_load(&message),
        }
    }

    /// Pulls sound metadata from the widget and completes the load.
    pub fn refresh_track_info(&mut self) {
        match self.widget.current_sound() {
            Ok(Some(sound)) => {
                let info = TrackInfo::from_sound(&sound);
                info!("Track loaded: {} by {}", info.title, info.artist);
                self.track_info = Some(info);
                self.loading = false;
                self.load_error = None;
                self.track_loaded = true;
                self.progress = PROGRESS_COMPLETE;
            }
            Ok(None) => {
                warn!("Widget reported no current sound");
                self.loading = false;
                self.track_loaded = false;
                self.load_error = Some(TRACK_INFO_ERROR_MESSAGE.to_string());
            }
            Err(err) => {
                warn!("Reading track information failed: {err}");
                self.loading = false;
                self.track_loaded = false;
                self.load_error = Some(TRACK_INFO_ERROR_MESSAGE.to_string());
            }
        }
    }

    pub fn on_shadow_events(&mut self) {
        if self.torn_down {
            return;
        }
        for event in self.shadow.poll_events() {
            match event {
                ShadowEvent::CanPlay => {
                    debug!("Shadow element can play");
                    self.ensure_graph();
                    if self.playing {
                        self.start_shadow();
                    }
                }
                ShadowEvent::Error(message) => {
                    warn!("Shadow element error: {message}");
                }
            }
        }
    }

    /// Builds the processing chain once the shadow source is usable. A suspended
    /// context defers construction until the next user interaction.
    pub fn ensure_graph(&mut self) {
        if self.torn_down || self.graph.is_closed() || !self.direct_stream() {
            return;
        }
        let Some(sample_rate) = self.shadow.sample_rate() else {
            return;
        };
        let was_connected = self.graph.is_connected();
        let built = self
            .graph
            .resume()
            .and_then(|()| self.graph.connect_chain(sample_rate));
        match built {
            Ok(()) => {
                self.graph_deferred = false;
                if !was_connected {
                    self.graph.set_gain(self.applied.volume_percent / 100.0);
                    self.graph
                        .set_filter_frequency(self.applied.filter_frequency_hz);
                    info!("Audio graph built at {sample_rate} Hz");
                }
            }
            Err(GraphError::Suspended) => {
                if !self.graph_deferred {
                    warn!("Audio graph deferred until the next user interaction");
                }
                self.graph_deferred = true;
            }
            Err(err) => warn!("Audio graph construction failed: {err}"),
        }
    }

    pub fn user_interaction(&mut self) {
        if self.torn_down {
            return;
        }
        self.graph.user_gesture();
        if self.graph_deferred || !self.graph.is_connected() {
            self.ensure_graph();
        }
        if self.playing && self.shadow.is_paused() {
            self.start_shadow();
        }
    }

    /// Pushes `target` to the engines, touching only fields that differ from what
    /// was last applied. Returns the number of fields changed.
    pub fn apply(&mut self, target: PlaybackParameters) -> usize {
        if self.torn_down {
            return 0;
        }
        let mut changed = 0;

        if target.volume_percent != self.applied.volume_percent {
            self.applied.volume_percent = target.volume_percent;
            self.push_volume_to_widget();
            self.graph.set_gain(target.volume_percent / 100.0);
            self.shadow.set_volume(self.shadow_volume());
            changed += 1;
        }

        if target.filter_frequency_hz != self.applied.filter_frequency_hz {
            self.applied.filter_frequency_hz = target.filter_frequency_hz;
            self.graph.set_filter_frequency(target.filter_frequency_hz);
            changed += 1;
        }

        if target.playback_rate != self.applied.playback_rate {
            self.applied.playback_rate = target.playback_rate;
            if self.direct_stream() && self.shadow.has_source() {
                if let Err(err) = self.shadow.set_playback_rate(target.playback_rate) {
                    warn!("Shadow rate change failed: {err}");
                }
            }
            changed += 1;
        }

        changed
    }

    /// One position-poll tick. The widget is the reference clock: an
    /// off-neutral rate nudges it forward or back, then the shadow is snapped
    /// to it once drift passes the threshold.
    pub fn poll(&mut self) {
        if self.torn_down || !self.playing {
            return;
        }
        let mut position_ms = match self.widget.position_ms() {
            Ok(position) if position.is_finite() => position,
            Ok(_) => return,
            Err(err) => {
                warn!("Widget position unavailable: {err}");
                return;
            }
        };
        if let Some(info) = self.track_info.as_mut() {
            info.position_ms = position_ms;
        }

        let rate = self.applied.playback_rate;
        if (rate - NEUTRAL_RATE).abs() > RATE_EPSILON {
            let nudged = position_ms + (rate - NEUTRAL_RATE) * self.tempo_nudge_ms;
            position_ms = self.seek_widget(nudged);
        }

        if !self.direct_stream() || self.shadow.sample_rate().is_none() {
            return;
        }
        let target_secs = position_ms / 1000.0;
        let drift = self.shadow.current_time() - target_secs;
        if drift.abs() <= self.drift_threshold_secs {
            return;
        }
        debug!("Sync drift {drift:.3}s: snapping shadow to widget");
        self.sync_shadow_to(target_secs);
    }

    pub fn play(&mut self) -> Result<()> {
        self.ensure_live()?;
        self.widget.play()?;
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        self.ensure_live()?;
        self.widget.pause()?;
        Ok(())
    }

    pub fn toggle_play(&mut self) -> Result<()> {
        if self.playing {
            self.pause()
        } else {
            self.play()
        }
    }

    /// Seeks both engines to `fraction` of the track. Returns `false` while the
    /// duration is unknown.
    pub fn seek_fraction(&mut self, fraction: f64) -> Result<bool> {
        self.ensure_live()?;
        if !fraction.is_finite() {
            return Err(EngineError::InvalidParameter(format!(
                "seek fraction must be finite, got {fraction}"
            )));
        }
        let duration_ms = self
            .track_info
            .as_ref()
            .map(|info| info.duration_ms)
            .unwrap_or(0.0);
        if duration_ms <= 0.0 {
            return Ok(false);
        }
        let position_ms = duration_ms * fraction.clamp(0.0, 1.0);
        self.widget.seek_to(position_ms)?;
        if self.shadow.has_source() {
            self.sync_shadow_to(position_ms / 1000.0);
        }
        if let Some(info) = self.track_info.as_mut() {
            info.position_ms = position_ms;
        }
        Ok(true)
    }

    /// Advances the shadow pipeline by one animation frame and returns analyser
    /// bins, or `None` when no shadow signal is flowing.
    pub fn render_frame(&mut self, elapsed: Duration) -> Option<Vec<f32>> {
        if self.torn_down {
            return None;
        }
        self.on_shadow_events();
        if !self.has_shadow_pipeline() || self.shadow.is_paused() {
            return None;
        }
        let mut frames = self.shadow.render(elapsed);
        self.graph.process(&mut frames);
        Some(self.graph.frequency_data())
    }

    /// Releases the pipeline. Returns `false` if already torn down.
    pub fn teardown(&mut self) -> bool {
        if self.torn_down {
            return false;
        }
        self.torn_down = true;
        self.playing = false;
        self.shadow.pause();
        self.graph.disconnect_all();
        self.graph.close();
        self.shadow.release();
        info!("Playback pipeline torn down");
        true
    }

    fn ensure_live(&self) -> Result<()> {
        if self.torn_down {
            return Err(EngineError::SessionClosed);
        }
        Ok(())
    }

    fn direct_stream(&self) -> bool {
        self.handle.as_ref().is_some_and(StreamHandle::is_direct)
    }

    fn shadow_volume(&self) -> f64 {
        if self.shadow_audible {
            self.applied.volume_percent / 100.0
        } else {
            0.0
        }
    }

    fn push_volume_to_widget(&mut self) {
        let volume = if self.shadow_audible && self.direct_stream() {
            0.0
        } else {
            self.applied.volume_percent / 100.0
        };
        if let Err(err) = self.widget.set_volume(volume) {
            warn!("Widget volume change failed: {err}");
        }
    }

    /// Seeks the widget, clamped to the track, and returns the clamped target.
    fn seek_widget(&mut self, position_ms: f64) -> f64 {
        let mut target = position_ms.max(0.0);
        if let Some(duration) = self
            .track_info
            .as_ref()
            .map(|info| info.duration_ms)
            .filter(|duration| *duration > 0.0)
        {
            target = target.min(duration);
        }
        if let Err(err) = self.widget.seek_to(target) {
            warn!("Widget seek failed: {err}");
        }
        target
    }

    fn sync_shadow_to(&mut self, seconds: f64) {
        if let Err(err) = self.shadow.set_current_time(seconds) {
            warn!("Shadow resync failed: {err}");
        }
    }

    fn start_shadow(&mut self) {
        if !self.shadow.has_source() || self.shadow.sample_rate().is_none() {
            return;
        }
        match self.widget.position_ms() {
            Ok(position) if position.is_finite() => self.sync_shadow_to(position / 1000.0),
            Ok(_) => {}
            Err(err) => warn!("Widget position unavailable for shadow sync: {err}"),
        }
        if let Err(err) = self.shadow.play() {
            warn!("Shadow element could not start: {err}");
        }
    }

    fn fail_load(&mut self, message: &str) {
        error!("Playback engine error: {message}");
        self.loading = false;
        self.track_loaded = false;
        self.playing = false;
        self.load_error = Some(LOAD_ERROR_MESSAGE.to_string());
        self.shadow.pause();
    }
}
