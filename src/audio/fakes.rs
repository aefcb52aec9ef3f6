//! Recording collaborators shared by the engine and session tests.
use super::graph::{AudioGraph, SoftwareGraph};
use super::shadow::{ShadowElement, ShadowEvent};
use super::widget::{RemoteWidget, SoundInfo, SoundUser};
use crate::error::{GraphError, ShadowError, WidgetError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub enum WidgetCall {
    Load(String, bool),
    Play,
    Pause,
    SeekTo(f64),
    SetVolume(f64),
}

#[derive(Debug, Default)]
pub struct WidgetState {
    pub calls: Vec<WidgetCall>,
    pub position_ms: f64,
    pub sound: Option<SoundInfo>,
    pub fail_load: bool,
}

#[derive(Clone, Default)]
pub struct FakeWidget {
    state: Arc<Mutex<WidgetState>>,
}

impl FakeWidget {
    pub fn with_sound(duration_ms: f64) -> Self {
        let widget = Self::default();
        widget.state().sound = Some(SoundInfo {
            title: Some("Signal Path".to_string()),
            user: Some(SoundUser {
                username: Some("tester".to_string()),
                avatar_url: None,
            }),
            artwork_url: Some("https://i1.example/art-large.jpg".to_string()),
            duration: Some(duration_ms),
        });
        widget
    }

    pub fn state(&self) -> MutexGuard<'_, WidgetState> {
        self.state.lock().expect("widget state lock")
    }

    pub fn calls(&self) -> Vec<WidgetCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn set_position(&self, position_ms: f64) {
        self.state().position_ms = position_ms;
    }

    pub fn last_volume(&self) -> Option<f64> {
        self.calls().into_iter().rev().find_map(|call| match call {
            WidgetCall::SetVolume(volume) => Some(volume),
            _ => None,
        })
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                WidgetCall::SeekTo(position) => Some(position),
                _ => None,
            })
            .collect()
    }
}

impl RemoteWidget for FakeWidget {
    fn load(&mut self, track_url: &str, auto_play: bool) -> Result<(), WidgetError> {
        let mut state = self.state();
        state.calls.push(WidgetCall::Load(track_url.to_string(), auto_play));
        if state.fail_load {
            return Err(WidgetError::Call("load rejected".to_string()));
        }
        Ok(())
    }

    fn play(&mut self) -> Result<(), WidgetError> {
        self.state().calls.push(WidgetCall::Play);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), WidgetError> {
        self.state().calls.push(WidgetCall::Pause);
        Ok(())
    }

    fn seek_to(&mut self, position_ms: f64) -> Result<(), WidgetError> {
        let mut state = self.state();
        state.calls.push(WidgetCall::SeekTo(position_ms));
        state.position_ms = position_ms;
        Ok(())
    }

    fn position_ms(&mut self) -> Result<f64, WidgetError> {
        Ok(self.state().position_ms)
    }

    fn set_volume(&mut self, volume: f64) -> Result<(), WidgetError> {
        self.state().calls.push(WidgetCall::SetVolume(volume));
        Ok(())
    }

    fn current_sound(&mut self) -> Result<Option<SoundInfo>, WidgetError> {
        Ok(self.state().sound.clone())
    }
}

#[derive(Debug)]
pub struct ShadowState {
    pub src: Option<String>,
    pub time_secs: f64,
    pub rate: f64,
    pub volume: f64,
    pub looping: bool,
    pub paused: bool,
    pub released: bool,
    pub loaded: bool,
    pub sample_rate: u32,
    pub pending: Vec<ShadowEvent>,
    pub rate_calls: usize,
    pub seek_calls: usize,
}

impl Default for ShadowState {
    fn default() -> Self {
        Self {
            src: None,
            time_secs: 0.0,
            rate: 1.0,
            volume: 1.0,
            looping: false,
            paused: true,
            released: false,
            loaded: false,
            sample_rate: 48_000,
            pending: Vec::new(),
            rate_calls: 0,
            seek_calls: 0,
        }
    }
}

/// Reports `CanPlay` on the first poll after `set_src` and renders a loud sine.
#[derive(Clone, Default)]
pub struct FakeShadow {
    state: Arc<Mutex<ShadowState>>,
}

impl FakeShadow {
    pub fn state(&self) -> MutexGuard<'_, ShadowState> {
        self.state.lock().expect("shadow state lock")
    }
}

impl ShadowElement for FakeShadow {
    fn set_src(&mut self, url: &str) -> Result<(), ShadowError> {
        let mut state = self.state();
        if state.released {
            return Err(ShadowError::Released);
        }
        state.src = Some(url.to_string());
        state.loaded = false;
        state.pending.push(ShadowEvent::CanPlay);
        Ok(())
    }

    fn clear_src(&mut self) {
        let mut state = self.state();
        state.src = None;
        state.loaded = false;
        state.pending.clear();
    }

    fn has_source(&self) -> bool {
        self.state().src.is_some()
    }

    fn current_time(&self) -> f64 {
        self.state().time_secs
    }

    fn set_current_time(&mut self, seconds: f64) -> Result<(), ShadowError> {
        let mut state = self.state();
        if state.src.is_none() {
            return Err(ShadowError::NoSource);
        }
        state.time_secs = seconds;
        state.seek_calls += 1;
        Ok(())
    }

    fn playback_rate(&self) -> f64 {
        self.state().rate
    }

    fn set_playback_rate(&mut self, rate: f64) -> Result<(), ShadowError> {
        let mut state = self.state();
        state.rate = rate;
        state.rate_calls += 1;
        Ok(())
    }

    fn set_volume(&mut self, volume: f64) {
        self.state().volume = volume;
    }

    fn set_looping(&mut self, looping: bool) {
        self.state().looping = looping;
    }

    fn play(&mut self) -> Result<(), ShadowError> {
        let mut state = self.state();
        if state.src.is_none() {
            return Err(ShadowError::NoSource);
        }
        state.paused = false;
        Ok(())
    }

    fn pause(&mut self) {
        self.state().paused = true;
    }

    fn is_paused(&self) -> bool {
        self.state().paused
    }

    fn release(&mut self) {
        let mut state = self.state();
        state.src = None;
        state.paused = true;
        state.released = true;
    }

    fn render(&mut self, elapsed: Duration) -> Vec<f32> {
        let mut state = self.state();
        if state.paused || !state.loaded {
            return Vec::new();
        }
        let rate = state.sample_rate as f64;
        let frames = (elapsed.as_secs_f64() * rate) as usize;
        let start = state.time_secs;
        state.time_secs += elapsed.as_secs_f64() * state.rate;
        (0..frames)
            .map(|i| {
                let t = start + i as f64 / rate;
                (2.0 * std::f64::consts::PI * 220.0 * t).sin() as f32
            })
            .collect()
    }

    fn sample_rate(&self) -> Option<u32> {
        let state = self.state();
        state.loaded.then_some(state.sample_rate)
    }

    fn poll_events(&mut self) -> Vec<ShadowEvent> {
        let mut state = self.state();
        let events: Vec<ShadowEvent> = state.pending.drain(..).collect();
        if events.contains(&ShadowEvent::CanPlay) {
            state.loaded = true;
        }
        events
    }
}

/// A [`SoftwareGraph`] the test keeps a handle to after moving it into the engine.
#[derive(Clone)]
pub struct SharedGraph {
    inner: Arc<Mutex<SoftwareGraph>>,
}

impl SharedGraph {
    pub fn new(graph: SoftwareGraph) -> Self {
        Self {
            inner: Arc::new(Mutex::new(graph)),
        }
    }

    pub fn inner(&self) -> MutexGuard<'_, SoftwareGraph> {
        self.inner.lock().expect("graph lock")
    }
}

impl AudioGraph for SharedGraph {
    fn resume(&mut self) -> Result<(), GraphError> {
        self.inner().resume()
    }

    fn user_gesture(&mut self) {
        self.inner().user_gesture();
    }

    fn connect_chain(&mut self, sample_rate: u32) -> Result<(), GraphError> {
        self.inner().connect_chain(sample_rate)
    }

    fn disconnect_all(&mut self) {
        self.inner().disconnect_all();
    }

    fn is_connected(&self) -> bool {
        self.inner().is_connected()
    }

    fn set_gain(&mut self, gain: f64) {
        self.inner().set_gain(gain);
    }

    fn set_filter_frequency(&mut self, frequency_hz: f64) {
        self.inner().set_filter_frequency(frequency_hz);
    }

    fn process(&mut self, frames: &mut [f32]) {
        self.inner().process(frames);
    }

    fn frequency_data(&self) -> Vec<f32> {
        self.inner().frequency_data()
    }

    fn close(&mut self) {
        self.inner().close();
    }

    fn is_closed(&self) -> bool {
        self.inner().is_closed()
    }
}
