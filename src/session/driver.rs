use super::{BiofeedbackSession, EngineEvent, Flow, PlayerSnapshot};
use crate::audio::analyzer::VisualizationSnapshot;
use crate::audio::graph::SoftwareGraph;
use crate::audio::shadow::PcmShadowElement;
use crate::audio::widget::RemoteWidget;
use crate::config::EngineConfig;
use crate::control::ingest::{SignalSource, SubscriptionId};
use crate::error::{EngineError, Result};
use crate::library::resolve_queue::ResolveQueue;
use crate::library::resolver::{HttpFetch, ReqwestFetch, StreamResolver};
use log::{info, warn};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Latest state published by the event loop for readers on other threads.
#[derive(Clone, Debug)]
struct Published {
    player: PlayerSnapshot,
    visual: VisualizationSnapshot,
}

/// Scoped acquisition of everything a running session holds: the biosignal
/// subscription and the playback pipeline. Released exactly once.
struct SessionGuard {
    session: BiofeedbackSession,
    source: Option<Box<dyn SignalSource>>,
    subscription: Option<SubscriptionId>,
}

impl SessionGuard {
    fn release(&mut self) {
        if let (Some(source), Some(id)) = (self.source.as_mut(), self.subscription.take()) {
            source.unsubscribe(id);
        }
        self.session.teardown();
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Runs a [`BiofeedbackSession`] on its own thread, feeding it events from a
/// channel and generating poll and animation ticks.
pub struct SessionDriver {
    sender: Sender<EngineEvent>,
    published: Arc<Mutex<Published>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SessionDriver {
    /// `build` receives the driver's event sender so background work (stream
    /// resolution) can report back into the loop.
    pub fn spawn<B>(
        config: &EngineConfig,
        source: Option<Box<dyn SignalSource>>,
        build: B,
    ) -> Result<Self>
    where
        B: FnOnce(Sender<EngineEvent>) -> Result<BiofeedbackSession>,
    {
        config.validate()?;
        let (sender, receiver) = mpsc::channel::<EngineEvent>();
        let session = build(sender.clone())?;
        let published = Arc::new(Mutex::new(Published {
            player: session.snapshot(),
            visual: session.visualization(),
        }));

        let mut guard = SessionGuard {
            session,
            source,
            subscription: None,
        };
        if let Some(source) = guard.source.as_mut() {
            let frames = sender.clone();
            guard.subscription = Some(source.subscribe(Box::new(move |frame| {
                let _ = frames.send(EngineEvent::Frame(frame));
            })));
        }

        let poll_interval = config.poll_interval();
        let frame_interval = config.frame_interval();
        let shared = Arc::clone(&published);
        let worker = std::thread::Builder::new()
            .name("biofeedback-session".to_string())
            .spawn(move || {
                run_loop(guard, receiver, shared, poll_interval, frame_interval);
            })
            .map_err(|e| EngineError::PlaybackEngine(format!("Failed to start session thread: {e}")))?;

        info!("Biofeedback session started");
        Ok(Self {
            sender,
            published,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Wires the production stack: HTTP resolution on a worker thread, a
    /// headless PCM shadow element and a graph that waits for a user gesture.
    pub fn start(
        config: &EngineConfig,
        widget: Box<dyn RemoteWidget>,
        source: Option<Box<dyn SignalSource>>,
    ) -> Result<Self> {
        let fetch: Arc<dyn HttpFetch> = Arc::new(
            ReqwestFetch::new(config)
                .map_err(|e| EngineError::PlaybackEngine(format!("HTTP client setup failed: {e}")))?,
        );
        Self::spawn(config, source, |events| {
            let resolver = StreamResolver::new(Arc::clone(&fetch), config);
            let queue = ResolveQueue::spawn(resolver, move |generation, _track, resolution| {
                let _ = events.send(EngineEvent::StreamResolved {
                    generation,
                    handle: resolution.handle,
                });
            });
            BiofeedbackSession::new(
                config,
                widget,
                Box::new(PcmShadowElement::new(Arc::clone(&fetch))),
                Box::new(SoftwareGraph::suspended_until_gesture()),
                Box::new(queue),
            )
        })
    }

    /// [`SessionDriver::start`] with the per-user config file, or defaults.
    pub fn start_with_user_config(
        widget: Box<dyn RemoteWidget>,
        source: Option<Box<dyn SignalSource>>,
    ) -> Result<Self> {
        Self::start(&EngineConfig::load_default(), widget, source)
    }

    pub fn send(&self, event: EngineEvent) -> Result<()> {
        self.sender
            .send(event)
            .map_err(|_| EngineError::SessionClosed)
    }

    /// A sender for host callbacks (widget events, UI input).
    pub fn sender(&self) -> Sender<EngineEvent> {
        self.sender.clone()
    }

    pub fn status(&self) -> Result<PlayerSnapshot> {
        Ok(self.published.lock().map_err(lock_err)?.player.clone())
    }

    pub fn visualization(&self) -> Result<VisualizationSnapshot> {
        Ok(self.published.lock().map_err(lock_err)?.visual)
    }

    /// Stops the loop and waits for teardown. Safe to call more than once.
    pub fn shutdown(&self) {
        let _ = self.sender.send(EngineEvent::Shutdown);
        let worker = match self.worker.lock() {
            Ok(mut worker) => worker.take(),
            Err(_) => None,
        };
        if let Some(worker) = worker {
            if worker.join().is_err() {
                warn!("Session thread panicked during shutdown");
            }
        }
    }
}

impl Drop for SessionDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loop(
    mut guard: SessionGuard,
    receiver: mpsc::Receiver<EngineEvent>,
    published: Arc<Mutex<Published>>,
    poll_interval: Duration,
    frame_interval: Duration,
) {
    let mut next_poll = Instant::now() + poll_interval;
    let mut next_frame = Instant::now() + frame_interval;
    let mut last_frame = Instant::now();

    loop {
        let now = Instant::now();
        let mut wake = now + poll_interval.max(frame_interval);
        if guard.session.is_polling() {
            wake = wake.min(next_poll);
        }
        if guard.session.is_animating() {
            wake = wake.min(next_frame);
        }

        match receiver.recv_timeout(wake.saturating_duration_since(now)) {
            Ok(event) => {
                if guard.session.handle(event) == Flow::Stop {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let now = Instant::now();
        if !guard.session.is_polling() {
            next_poll = now + poll_interval;
        } else if now >= next_poll {
            guard.session.handle(EngineEvent::PollTick);
            next_poll = now + poll_interval;
        }
        if !guard.session.is_animating() {
            last_frame = now;
            next_frame = now + frame_interval;
        } else if now >= next_frame {
            guard
                .session
                .handle(EngineEvent::AnimationFrame(now.duration_since(last_frame)));
            last_frame = now;
            next_frame = now + frame_interval;
        }

        if let Ok(mut shared) = published.lock() {
            shared.player = guard.session.snapshot();
            shared.visual = guard.session.visualization();
        }
    }

    guard.release();
    if let Ok(mut shared) = published.lock() {
        shared.player = guard.session.snapshot();
    }
}

fn lock_err<T>(_: std::sync::PoisonError<T>) -> EngineError {
    EngineError::PlaybackEngine("session state lock poisoned".to_string())
}
