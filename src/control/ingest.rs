use serde::{Deserialize, Serialize};

/// One biosignal reading: raw value, short/long rolling averages, derived effort and score.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BiosignalSample {
    pub raw: f64,
    pub avg_short: f64,
    pub avg_long: f64,
    pub effort: f64,
    pub score: f64,
}

impl BiosignalSample {
    pub fn with_score(score: f64) -> Self {
        Self {
            score,
            ..Self::default()
        }
    }
}

/// Parallel-array payload as delivered by the biosignal subscription.
/// The last element of each array is the latest value.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct BiosignalFrame {
    #[serde(default, rename = "heg")]
    pub raw: Vec<f64>,
    #[serde(default, rename = "hegAvg2s")]
    pub avg_short: Vec<f64>,
    #[serde(default, rename = "hegAvg4s")]
    pub avg_long: Vec<f64>,
    #[serde(default, rename = "hegEffort")]
    pub effort: Vec<f64>,
    #[serde(default, rename = "hegScore")]
    pub score: Vec<f64>,
}

impl BiosignalFrame {
    pub fn latest(&self) -> BiosignalSample {
        BiosignalSample {
            raw: last_or_zero(&self.raw),
            avg_short: last_or_zero(&self.avg_short),
            avg_long: last_or_zero(&self.avg_long),
            effort: last_or_zero(&self.effort),
            score: last_or_zero(&self.score),
        }
    }
}

fn last_or_zero(values: &[f64]) -> f64 {
    values.last().copied().unwrap_or(0.0)
}

pub type SubscriptionId = u64;
pub type FrameCallback = Box<dyn FnMut(BiosignalFrame) + Send>;

/// Push-based biosignal subscription provided by the device layer.
pub trait SignalSource: Send {
    fn subscribe(&mut self, callback: FrameCallback) -> SubscriptionId;
    fn unsubscribe(&mut self, id: SubscriptionId);
}

/// Keeps only the most recent sample.
#[derive(Debug, Default)]
pub struct SignalIngestor {
    latest: Option<BiosignalSample>,
    received: u64,
}

impl SignalIngestor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest(&mut self, sample: BiosignalSample) -> BiosignalSample {
        self.latest = Some(sample);
        self.received += 1;
        sample
    }

    pub fn ingest_frame(&mut self, frame: &BiosignalFrame) -> BiosignalSample {
        self.ingest(frame.latest())
    }

    pub fn latest(&self) -> Option<BiosignalSample> {
        self.latest
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn clear(&mut self) {
        self.latest = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_takes_last_element_of_each_series() {
        let frame = BiosignalFrame {
            raw: vec![1.0, 2.0],
            avg_short: vec![0.5],
            avg_long: Vec::new(),
            effort: vec![0.1, 0.2, 0.3],
            score: vec![0.4, 0.9],
        };
        let sample = frame.latest();
        assert_eq!(sample.raw, 2.0);
        assert_eq!(sample.avg_short, 0.5);
        assert_eq!(sample.avg_long, 0.0);
        assert_eq!(sample.effort, 0.3);
        assert_eq!(sample.score, 0.9);
    }

    #[test]
    fn frame_parses_device_field_names() {
        let frame: BiosignalFrame = serde_json::from_str(
            r#"{ "heg": [1.2], "hegAvg2s": [1.1], "hegAvg4s": [1.0], "hegEffort": [0.2], "hegScore": [0.7] }"#,
        )
        .expect("frame should parse");
        assert_eq!(frame.latest().score, 0.7);
        assert_eq!(frame.latest().avg_long, 1.0);
    }

    #[test]
    fn ingestor_retains_only_latest() {
        let mut ingestor = SignalIngestor::new();
        assert!(ingestor.latest().is_none());
        ingestor.ingest(BiosignalSample::with_score(0.1));
        ingestor.ingest(BiosignalSample::with_score(0.2));
        assert_eq!(ingestor.latest().map(|s| s.score), Some(0.2));
        assert_eq!(ingestor.received(), 2);
        ingestor.clear();
        assert!(ingestor.latest().is_none());
    }
}
