use crate::library::resolver::{HttpFetch, Resolution, StreamResolver};
use crate::library::track::TrackReference;
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

/// Where the orchestrator hands off stream acquisition. Results come back later
/// as `(generation, handle)` pairs so stale answers can be told apart.
pub trait StreamRequester: Send {
    fn request(&mut self, generation: u64, track: TrackReference);

    fn cancel(&mut self) {}
}

enum ResolveTask {
    Resolve {
        generation: u64,
        track: TrackReference,
    },
    Shutdown,
}

/// Runs the resolver chain on a dedicated worker thread so loads never block the event loop.
pub struct ResolveQueue {
    sender: Sender<ResolveTask>,
    worker: Option<JoinHandle<()>>,
    cancelled: Arc<AtomicBool>,
    delivery: Arc<Mutex<()>>,
}

impl ResolveQueue {
    pub fn spawn<F, C>(resolver: StreamResolver<F>, mut on_resolved: C) -> Self
    where
        F: HttpFetch + 'static,
        C: FnMut(u64, TrackReference, Resolution) + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel::<ResolveTask>();
        let cancelled = Arc::new(AtomicBool::new(false));
        let delivery = Arc::new(Mutex::new(()));
        let flag = Arc::clone(&cancelled);
        let gate = Arc::clone(&delivery);
        let worker = std::thread::Builder::new()
            .name("stream-resolver".to_string())
            .spawn(move || {
                while let Ok(task) = receiver.recv() {
                    if flag.load(Ordering::Acquire) {
                        break;
                    }
                    match task {
                        ResolveTask::Resolve { generation, track } => {
                            let Some(resolution) = resolver.resolve_cancellable(&track, &flag)
                            else {
                                break;
                            };
                            let _delivering = gate.lock().unwrap_or_else(PoisonError::into_inner);
                            if flag.load(Ordering::Acquire) {
                                break;
                            }
                            on_resolved(generation, track, resolution);
                        }
                        ResolveTask::Shutdown => break,
                    }
                }
                debug!("Stream resolver worker stopped");
            })
            .map_err(|e| warn!("Failed to start stream resolver worker: {e}"))
            .ok();
        Self {
            sender,
            worker,
            cancelled,
            delivery,
        }
    }

    pub fn enqueue(&self, generation: u64, track: TrackReference) {
        if track.url.trim().is_empty() || self.is_cancelled() {
            return;
        }
        if self
            .sender
            .send(ResolveTask::Resolve { generation, track })
            .is_err()
        {
            warn!("Stream resolver worker is gone; request dropped");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Drops queued work and detaches the worker without waiting on an
    /// in-flight fetch. Nothing is delivered after this returns.
    pub fn cancel(&mut self) {
        {
            let _delivering = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
            if self.cancelled.swap(true, Ordering::AcqRel) {
                return;
            }
        }
        let _ = self.sender.send(ResolveTask::Shutdown);
        if self.worker.take().is_some() {
            debug!("Stream resolver cancelled; worker detached");
        }
    }

    /// Finishes queued work, then joins the worker.
    pub fn shutdown(&mut self) {
        let _ = self.sender.send(ResolveTask::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl StreamRequester for ResolveQueue {
    fn request(&mut self, generation: u64, track: TrackReference) {
        self.enqueue(generation, track);
    }

    fn cancel(&mut self) {
        ResolveQueue::cancel(self);
    }
}

impl Drop for ResolveQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}
