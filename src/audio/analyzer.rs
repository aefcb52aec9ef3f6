use crate::control::ingest::BiosignalSample;
use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct BandLevels {
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
}

/// Per-frame snapshot consumed by visualizations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct VisualizationSnapshot {
    pub amplitude: f32,
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    pub sample: BiosignalSample,
}

/// Combines the graph's analyser bins with the latest biosignal sample.
#[derive(Debug, Default)]
pub struct VisualizationFeed {
    latest: VisualizationSnapshot,
}

impl VisualizationFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> VisualizationSnapshot {
        self.latest
    }

    /// `spectrum` is `None` when no shadow pipeline exists; every level is then zero.
    pub fn update(&mut self, spectrum: Option<&[f32]>, sample: BiosignalSample) -> VisualizationSnapshot {
        let (amplitude, bands) = match spectrum {
            Some(bins) if !bins.is_empty() => (mean(bins), band_levels(bins)),
            _ => (0.0, BandLevels::default()),
        };
        self.latest = VisualizationSnapshot {
            amplitude,
            bass: bands.bass,
            mid: bands.mid,
            treble: bands.treble,
            sample,
        };
        self.latest
    }
}

/// Averages over equal thirds of the bins; the remainder goes to the treble band.
pub fn band_levels(bins: &[f32]) -> BandLevels {
    let third = bins.len() / 3;
    if third == 0 {
        let level = mean(bins);
        return BandLevels {
            bass: level,
            mid: level,
            treble: level,
        };
    }
    BandLevels {
        bass: mean(&bins[..third]),
        mid: mean(&bins[third..third * 2]),
        treble: mean(&bins[third * 2..]),
    }
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let sum: f32 = values.iter().copied().filter(|v| v.is_finite()).sum();
    (sum / values.len() as f32).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_pipeline_means_zero_levels() {
        let mut feed = VisualizationFeed::new();
        let sample = BiosignalSample::with_score(0.4);
        let snapshot = feed.update(None, sample);
        assert_eq!(snapshot.amplitude, 0.0);
        assert_eq!(snapshot.bass, 0.0);
        assert_eq!(snapshot.mid, 0.0);
        assert_eq!(snapshot.treble, 0.0);
        assert_eq!(snapshot.sample.score, 0.4);
    }

    #[test]
    fn bands_split_into_thirds() {
        let mut bins = vec![1.0_f32; 3];
        bins.extend(vec![0.5_f32; 3]);
        bins.extend(vec![0.0_f32; 4]);
        let levels = band_levels(&bins);
        assert_eq!(levels.bass, 1.0);
        assert_eq!(levels.mid, 0.5);
        assert_eq!(levels.treble, 0.0);

        let snapshot = VisualizationFeed::new().update(Some(&bins), BiosignalSample::default());
        assert!((snapshot.amplitude - 0.45).abs() < 1e-6);
    }

    #[test]
    fn tiny_spectra_share_one_level() {
        let levels = band_levels(&[0.3, 0.5]);
        assert!((levels.bass - 0.4).abs() < 1e-6);
        assert_eq!(levels.bass, levels.treble);
    }
}
