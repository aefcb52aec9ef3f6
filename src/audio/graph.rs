use super::dsp::fft::{frequency_bins, FFT_SIZE};
use super::dsp::filters::LowPassStage;
use crate::control::mapper::MAX_FILTER_HZ;
use crate::error::GraphError;
use std::collections::VecDeque;

/// Nodes of the processing chain in construction order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphNode {
    Source,
    Filter,
    Gain,
}

/// Teardown walks the chain in this order.
pub const CHAIN_ORDER: [GraphNode; 3] = [GraphNode::Source, GraphNode::Filter, GraphNode::Gain];

/// Local processing graph: source → low-pass filter → gain → output, with an
/// analyser tap on the source.
pub trait AudioGraph: Send {
    /// Starts processing. Fails with [`GraphError::Suspended`] until a user gesture permits it.
    fn resume(&mut self) -> Result<(), GraphError>;
    /// Marks that a user gesture happened; the next `resume` may succeed.
    fn user_gesture(&mut self) {}
    /// Connects the shadow source into the chain. Connecting twice is a no-op.
    fn connect_chain(&mut self, sample_rate: u32) -> Result<(), GraphError>;
    /// Disconnects every node in construction order. Safe to call repeatedly.
    fn disconnect_all(&mut self);
    fn is_connected(&self) -> bool;
    /// Linear gain in `[0, 1]`.
    fn set_gain(&mut self, gain: f64);
    fn set_filter_frequency(&mut self, frequency_hz: f64);
    /// Pushes source frames through the chain in place.
    fn process(&mut self, frames: &mut [f32]);
    /// Analyser bins in `[0, 1]`, lowest frequency first.
    fn frequency_data(&self) -> Vec<f32>;
    fn close(&mut self);
    fn is_closed(&self) -> bool;
}

pub struct SoftwareGraph {
    suspended: bool,
    gesture_seen: bool,
    running: bool,
    closed: bool,
    connected: bool,
    gain: f32,
    filter: LowPassStage,
    tap: VecDeque<f32>,
    connections: usize,
    disconnections: usize,
    #[cfg(test)]
    disconnects: Vec<GraphNode>,
}

impl SoftwareGraph {
    pub fn new() -> Self {
        Self {
            suspended: false,
            gesture_seen: false,
            running: false,
            closed: false,
            connected: false,
            gain: 1.0,
            filter: LowPassStage::new(48_000.0, MAX_FILTER_HZ as f32),
            tap: VecDeque::with_capacity(FFT_SIZE),
            connections: 0,
            disconnections: 0,
            #[cfg(test)]
            disconnects: Vec::new(),
        }
    }

    /// A graph that refuses to start until [`AudioGraph::user_gesture`] is called.
    pub fn suspended_until_gesture() -> Self {
        Self {
            suspended: true,
            ..Self::new()
        }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn filter_frequency(&self) -> f32 {
        self.filter.frequency()
    }

    /// Number of times a source was actually wired in.
    pub fn connection_count(&self) -> usize {
        self.connections
    }

    /// Number of completed chain teardowns.
    pub fn disconnection_count(&self) -> usize {
        self.disconnections
    }

    #[cfg(test)]
    pub fn disconnect_log(&self) -> &[GraphNode] {
        &self.disconnects
    }
}

impl Default for SoftwareGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioGraph for SoftwareGraph {
    fn resume(&mut self) -> Result<(), GraphError> {
        if self.closed {
            return Err(GraphError::Closed);
        }
        if self.suspended && !self.gesture_seen {
            return Err(GraphError::Suspended);
        }
        self.running = true;
        Ok(())
    }

    fn user_gesture(&mut self) {
        self.gesture_seen = true;
    }

    fn connect_chain(&mut self, sample_rate: u32) -> Result<(), GraphError> {
        if self.closed {
            return Err(GraphError::Closed);
        }
        if !self.running {
            return Err(GraphError::Suspended);
        }
        if sample_rate == 0 {
            return Err(GraphError::Connect("source has no sample rate".to_string()));
        }
        self.filter.set_sample_rate(sample_rate as f32);
        if self.connected {
            return Ok(());
        }
        self.filter.reset();
        self.connected = true;
        self.connections += 1;
        Ok(())
    }

    fn disconnect_all(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        self.disconnections += 1;
        #[cfg(test)]
        self.disconnects.extend(CHAIN_ORDER);
        self.tap.clear();
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn set_gain(&mut self, gain: f64) {
        if gain.is_finite() {
            self.gain = gain.clamp(0.0, 1.0) as f32;
        }
    }

    fn set_filter_frequency(&mut self, frequency_hz: f64) {
        self.filter.set_frequency(frequency_hz as f32);
    }

    fn process(&mut self, frames: &mut [f32]) {
        if !self.connected || self.closed {
            return;
        }
        for &sample in frames.iter() {
            if self.tap.len() == FFT_SIZE {
                self.tap.pop_front();
            }
            self.tap.push_back(sample);
        }
        self.filter.process(frames);
        for sample in frames.iter_mut() {
            *sample *= self.gain;
        }
    }

    fn frequency_data(&self) -> Vec<f32> {
        let (head, tail) = self.tap.as_slices();
        let mut block = Vec::with_capacity(self.tap.len());
        block.extend_from_slice(head);
        block.extend_from_slice(tail);
        frequency_bins(&block)
    }

    fn close(&mut self) {
        self.disconnect_all();
        self.running = false;
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
