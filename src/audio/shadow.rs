use super::decoder::{decode_bytes, extension_hint, DecodedTrack};
use crate::error::ShadowError;
use crate::library::resolver::HttpFetch;
use log::{debug, warn};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub enum ShadowEvent {
    CanPlay,
    Error(String),
}

/// Local audio element that plays the directly resolved stream in parallel
/// with the remote widget. It exists for analysis and native rate control.
pub trait ShadowElement: Send {
    fn set_src(&mut self, url: &str) -> Result<(), ShadowError>;
    fn clear_src(&mut self);
    fn has_source(&self) -> bool;
    /// Seconds.
    fn current_time(&self) -> f64;
    fn set_current_time(&mut self, seconds: f64) -> Result<(), ShadowError>;
    fn playback_rate(&self) -> f64;
    fn set_playback_rate(&mut self, rate: f64) -> Result<(), ShadowError>;
    /// Linear volume in `[0, 1]`; `0` keeps the element analysis-only.
    fn set_volume(&mut self, volume: f64);
    fn set_looping(&mut self, looping: bool);
    fn play(&mut self) -> Result<(), ShadowError>;
    fn pause(&mut self);
    fn is_paused(&self) -> bool;
    fn release(&mut self);

    /// Source frames produced over `elapsed`, before element volume.
    fn render(&mut self, _elapsed: Duration) -> Vec<f32> {
        Vec::new()
    }

    fn sample_rate(&self) -> Option<u32> {
        None
    }

    fn poll_events(&mut self) -> Vec<ShadowEvent> {
        Vec::new()
    }
}

type LoadSlot = Arc<Mutex<Option<(u64, Result<DecodedTrack, ShadowError>)>>>;

/// Headless shadow element: fetches the stream, decodes it with symphonia and
/// renders mono frames at its playback rate.
pub struct PcmShadowElement {
    fetch: Arc<dyn HttpFetch>,
    src: Option<String>,
    load_id: u64,
    loaded: LoadSlot,
    track: Option<DecodedTrack>,
    cursor: f64,
    pending_seek: Option<f64>,
    rate: f64,
    volume: f64,
    looping: bool,
    paused: bool,
    released: bool,
}

impl PcmShadowElement {
    pub fn new(fetch: Arc<dyn HttpFetch>) -> Self {
        Self {
            fetch,
            src: None,
            load_id: 0,
            loaded: Arc::new(Mutex::new(None)),
            track: None,
            cursor: 0.0,
            pending_seek: None,
            rate: 1.0,
            volume: 0.0,
            looping: true,
            paused: true,
            released: false,
        }
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn is_loaded(&self) -> bool {
        self.track.is_some()
    }

    fn ensure_live(&self) -> Result<(), ShadowError> {
        if self.released {
            return Err(ShadowError::Released);
        }
        Ok(())
    }

    fn duration_frames(&self) -> f64 {
        self.track
            .as_ref()
            .map(|track| track.samples.len() as f64)
            .unwrap_or(0.0)
    }
}

impl ShadowElement for PcmShadowElement {
    fn set_src(&mut self, url: &str) -> Result<(), ShadowError> {
        self.ensure_live()?;
        self.clear_src();
        self.load_id += 1;
        self.src = Some(url.to_string());

        let load_id = self.load_id;
        let slot = Arc::clone(&self.loaded);
        let fetch = Arc::clone(&self.fetch);
        let url = url.to_string();
        std::thread::Builder::new()
            .name("shadow-loader".to_string())
            .spawn(move || {
                let outcome = fetch
                    .get_bytes(&url)
                    .map_err(|e| ShadowError::Fetch(e.to_string()))
                    .and_then(|bytes| decode_bytes(bytes, extension_hint(&url)));
                if let Ok(mut slot) = slot.lock() {
                    *slot = Some((load_id, outcome));
                }
            })
            .map_err(|e| ShadowError::Fetch(format!("Failed to start loader: {e}")))?;
        Ok(())
    }

    fn clear_src(&mut self) {
        self.src = None;
        self.track = None;
        self.cursor = 0.0;
        self.pending_seek = None;
        if let Ok(mut slot) = self.loaded.lock() {
            slot.take();
        }
    }

    fn has_source(&self) -> bool {
        self.src.is_some()
    }

    fn current_time(&self) -> f64 {
        match &self.track {
            Some(track) if track.sample_rate > 0 => self.cursor / track.sample_rate as f64,
            _ => self.pending_seek.unwrap_or(0.0),
        }
    }

    fn set_current_time(&mut self, seconds: f64) -> Result<(), ShadowError> {
        self.ensure_live()?;
        if self.src.is_none() {
            return Err(ShadowError::NoSource);
        }
        let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        match &self.track {
            Some(track) => {
                let frames = seconds * track.sample_rate as f64;
                self.cursor = frames.min(self.duration_frames());
            }
            None => self.pending_seek = Some(seconds),
        }
        Ok(())
    }

    fn playback_rate(&self) -> f64 {
        self.rate
    }

    fn set_playback_rate(&mut self, rate: f64) -> Result<(), ShadowError> {
        self.ensure_live()?;
        if rate.is_finite() && rate > 0.0 {
            self.rate = rate;
        }
        Ok(())
    }

    fn set_volume(&mut self, volume: f64) {
        if volume.is_finite() {
            self.volume = volume.clamp(0.0, 1.0);
        }
    }

    fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    fn play(&mut self) -> Result<(), ShadowError> {
        self.ensure_live()?;
        if self.src.is_none() {
            return Err(ShadowError::NoSource);
        }
        self.paused = false;
        Ok(())
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn release(&mut self) {
        self.pause();
        self.clear_src();
        self.released = true;
    }

    fn render(&mut self, elapsed: Duration) -> Vec<f32> {
        if self.paused || self.released {
            return Vec::new();
        }
        let Some(track) = self.track.as_ref() else {
            return Vec::new();
        };
        let total = track.samples.len();
        if total == 0 {
            return Vec::new();
        }

        let frames = (elapsed.as_secs_f64() * track.sample_rate as f64).round() as usize;
        let mut out = Vec::with_capacity(frames);
        let mut cursor = self.cursor;
        let mut finished = false;
        for _ in 0..frames {
            if cursor >= total as f64 {
                if self.looping {
                    cursor %= total as f64;
                } else {
                    finished = true;
                    break;
                }
            }
            let index = cursor as usize;
            let next = (index + 1).min(total - 1);
            let frac = (cursor - index as f64) as f32;
            let (a, b) = (track.samples[index], track.samples[next]);
            out.push(a + (b - a) * frac);
            cursor += self.rate;
        }
        self.cursor = cursor.min(total as f64);
        if finished {
            self.paused = true;
        }
        out
    }

    fn sample_rate(&self) -> Option<u32> {
        self.track.as_ref().map(|track| track.sample_rate)
    }

    fn poll_events(&mut self) -> Vec<ShadowEvent> {
        let finished = match self.loaded.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        let Some((load_id, outcome)) = finished else {
            return Vec::new();
        };
        if load_id != self.load_id || self.src.is_none() {
            debug!("Discarding stale shadow load {load_id}");
            return Vec::new();
        }
        match outcome {
            Ok(track) => {
                let pending = self.pending_seek.take().unwrap_or(0.0);
                self.cursor = (pending * track.sample_rate as f64).min(track.samples.len() as f64);
                self.track = Some(track);
                vec![ShadowEvent::CanPlay]
            }
            Err(err) => {
                warn!("Shadow element failed to load: {err}");
                vec![ShadowEvent::Error(err.to_string())]
            }
        }
    }
}
