pub mod driver;

use crate::audio::analyzer::{VisualizationFeed, VisualizationSnapshot};
use crate::audio::engine::{LoadRequest, PlaybackOrchestrator, PlayerStatus};
use crate::audio::graph::AudioGraph;
use crate::audio::shadow::ShadowElement;
use crate::audio::widget::{RemoteWidget, WidgetEvent};
use crate::config::EngineConfig;
use crate::control::calibration::{CalibrationTracker, CalibrationWindow};
use crate::control::ingest::{BiosignalFrame, BiosignalSample, SignalIngestor};
use crate::control::mapper::{ParameterChange, ParameterMapper, PlaybackParameters};
use crate::control::mode::{ControlMode, ControlModeRouter};
use crate::error::Result;
use crate::library::resolve_queue::StreamRequester;
use crate::library::track::{StreamHandle, TrackInfo};
use log::{debug, info, warn};
use serde::Serialize;
use std::time::Duration;

/// Everything the session reacts to. Each event is handled to completion before the next.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    Sample(BiosignalSample),
    Frame(BiosignalFrame),
    Widget(WidgetEvent),
    PollTick,
    AnimationFrame(Duration),
    StreamResolved { generation: u64, handle: StreamHandle },
    SetControlMode(ControlMode),
    SetActive(bool),
    LoadTrack(String),
    SetManualVolume(f64),
    Seek(f64),
    Play,
    Pause,
    TogglePlay,
    Retry,
    UserInteraction,
    SetVisualizerActive(bool),
    Shutdown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Direction and strength of the current score, for the UI indicator.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SignalEffect {
    pub rising: bool,
    pub intensity: f64,
}

impl SignalEffect {
    pub fn from_score(score: f64) -> Option<Self> {
        if !score.is_finite() || score == 0.0 {
            return None;
        }
        Some(Self {
            rising: score > 0.0,
            intensity: (score.abs() * 20.0).min(100.0),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlayerSnapshot {
    pub status: PlayerStatus,
    pub loading_progress: u8,
    pub load_error: Option<String>,
    pub track_loaded: bool,
    pub playing: bool,
    pub track_url: Option<String>,
    pub track: Option<TrackInfo>,
    pub stream: Option<StreamHandle>,
    pub mode: ControlMode,
    pub active: bool,
    pub calibration: CalibrationWindow,
    pub parameters: PlaybackParameters,
    pub latest_sample: Option<BiosignalSample>,
    pub effect: Option<SignalEffect>,
    pub visualizer_active: bool,
}

/// The single update context: biosignal in, playback parameters out.
pub struct BiofeedbackSession {
    ingestor: SignalIngestor,
    calibration: CalibrationTracker,
    router: ControlModeRouter,
    mapper: ParameterMapper,
    parameters: PlaybackParameters,
    orchestrator: PlaybackOrchestrator,
    requester: Box<dyn StreamRequester>,
    feed: VisualizationFeed,
    visualizer_active: bool,
    closed: bool,
}

impl BiofeedbackSession {
    pub fn new(
        config: &EngineConfig,
        widget: Box<dyn RemoteWidget>,
        shadow: Box<dyn ShadowElement>,
        graph: Box<dyn AudioGraph>,
        requester: Box<dyn StreamRequester>,
    ) -> Result<Self> {
        config.validate()?;
        let mapper = ParameterMapper::from_config(config);
        let parameters = mapper.initial_parameters();
        let orchestrator = PlaybackOrchestrator::new(widget, shadow, graph, config, parameters);
        Ok(Self {
            ingestor: SignalIngestor::new(),
            calibration: CalibrationTracker::new(),
            router: ControlModeRouter::default(),
            mapper,
            parameters,
            orchestrator,
            requester,
            feed: VisualizationFeed::new(),
            visualizer_active: true,
            closed: false,
        })
    }

    pub fn handle(&mut self, event: EngineEvent) -> Flow {
        if self.closed {
            return Flow::Stop;
        }
        match event {
            EngineEvent::Sample(sample) => {
                self.process_sample(sample);
            }
            EngineEvent::Frame(frame) => {
                self.process_sample(frame.latest());
            }
            EngineEvent::Widget(event) => self.orchestrator.on_widget_event(event),
            EngineEvent::PollTick => {
                self.orchestrator.on_shadow_events();
                self.orchestrator.poll();
            }
            EngineEvent::AnimationFrame(elapsed) => {
                self.animate(elapsed);
            }
            EngineEvent::StreamResolved { generation, handle } => {
                self.orchestrator.on_stream_resolved(generation, handle);
            }
            EngineEvent::SetControlMode(mode) => {
                if self.router.select(mode, &mut self.calibration) {
                    info!("Control mode set to {mode}");
                }
            }
            EngineEvent::SetActive(active) => {
                if self.router.set_active(active, &mut self.calibration) {
                    info!(
                        "Biofeedback control {}",
                        if active { "activated" } else { "deactivated" }
                    );
                }
            }
            EngineEvent::LoadTrack(url) => {
                let request = self.orchestrator.load(&url);
                self.dispatch(request);
            }
            EngineEvent::Retry => {
                let request = self.orchestrator.retry();
                self.dispatch(request);
            }
            EngineEvent::SetManualVolume(percent) => self.set_manual_volume(percent),
            EngineEvent::Seek(fraction) => {
                if let Err(err) = self.orchestrator.seek_fraction(fraction) {
                    warn!("Seek rejected: {err}");
                }
            }
            EngineEvent::Play => log_failure("play", self.orchestrator.play()),
            EngineEvent::Pause => log_failure("pause", self.orchestrator.pause()),
            EngineEvent::TogglePlay => log_failure("toggle", self.orchestrator.toggle_play()),
            EngineEvent::UserInteraction => self.orchestrator.user_interaction(),
            EngineEvent::SetVisualizerActive(active) => self.visualizer_active = active,
            EngineEvent::Shutdown => {
                self.teardown();
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    /// Calibrate, normalize, map and apply one sample. Returns the change the
    /// active mode committed, if any.
    pub fn process_sample(&mut self, sample: BiosignalSample) -> Option<ParameterChange> {
        let sample = self.ingestor.ingest(sample);
        let driven = self.router.driven();

        let committed = driven.and_then(|mode| {
            self.calibration.update(&sample);
            let normalized = self.calibration.normalize(&sample);
            let change = self.mapper.map(normalized, mode, &self.parameters);
            let window = self.calibration.window();
            debug!(
                "{mode} control: score={:.3} min={:.3} max={:.3} normalized={normalized:?} change={change:?}",
                sample.score, window.min, window.max
            );
            change
        });

        if let Some(change) = committed {
            self.parameters.apply(change);
        }
        if driven != Some(ControlMode::Tempo) {
            if let Some(release) = self.mapper.relax_rate(self.parameters.playback_rate) {
                self.parameters.apply(release);
            }
        }
        self.orchestrator.apply(self.parameters);
        committed
    }

    pub fn set_manual_volume(&mut self, percent: f64) {
        self.parameters.volume_percent = self.mapper.clamp_volume(percent);
        self.orchestrator.apply(self.parameters);
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        let latest_sample = self.ingestor.latest();
        let effect = latest_sample
            .filter(|_| self.router.is_active())
            .and_then(|sample| SignalEffect::from_score(sample.score));
        PlayerSnapshot {
            status: self.orchestrator.status(),
            loading_progress: self.orchestrator.loading_progress(),
            load_error: self.orchestrator.load_error().map(str::to_string),
            track_loaded: self.orchestrator.track_loaded(),
            playing: self.orchestrator.is_playing(),
            track_url: self.orchestrator.track().map(|track| track.url.clone()),
            track: self.orchestrator.track_info().cloned(),
            stream: self.orchestrator.stream_handle().cloned(),
            mode: self.router.mode(),
            active: self.router.is_active(),
            calibration: self.calibration.window(),
            parameters: self.parameters,
            latest_sample,
            effect,
            visualizer_active: self.visualizer_active,
        }
    }

    pub fn visualization(&self) -> VisualizationSnapshot {
        self.feed.latest()
    }

    /// Position polling runs only while the widget plays.
    pub fn is_polling(&self) -> bool {
        !self.closed && self.orchestrator.is_playing()
    }

    pub fn is_animating(&self) -> bool {
        !self.closed && self.visualizer_active
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Returns `false` if the session was already torn down.
    pub fn teardown(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        self.requester.cancel();
        self.orchestrator.teardown();
        self.ingestor.clear();
        info!("Biofeedback session closed");
        true
    }

    fn animate(&mut self, elapsed: Duration) {
        let spectrum = self.orchestrator.render_frame(elapsed);
        let sample = self.ingestor.latest().unwrap_or_default();
        self.feed.update(spectrum.as_deref(), sample);
    }

    fn dispatch(&mut self, request: Result<LoadRequest>) {
        match request {
            Ok(request) => self.requester.request(request.generation, request.track),
            Err(err) => warn!("Track load rejected: {err}"),
        }
    }
}

fn log_failure(action: &str, outcome: Result<()>) {
    if let Err(err) = outcome {
        warn!("Transport {action} failed: {err}");
    }
}
