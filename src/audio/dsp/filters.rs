use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Butterworth Q for a single second-order section.
pub const LOW_PASS_Q: f32 = std::f32::consts::FRAC_1_SQRT_2;

#[derive(Clone, Copy, Debug, PartialEq)]
struct BiquadCoefficients {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl BiquadCoefficients {
    fn identity() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

pub struct BiquadFilter {
    coeffs: BiquadCoefficients,
    z1: f32,
    z2: f32,
}

impl BiquadFilter {
    pub fn new() -> Self {
        Self {
            coeffs: BiquadCoefficients::identity(),
            z1: 0.0,
            z2: 0.0,
        }
    }

    pub fn process_sample(&mut self, sample: f32) -> f32 {
        let y = self.coeffs.b0 * sample + self.z1;
        self.z1 = self.coeffs.b1 * sample - self.coeffs.a1 * y + self.z2;
        self.z2 = self.coeffs.b2 * sample - self.coeffs.a2 * y;
        y
    }

    pub fn set_low_pass(&mut self, sample_rate: f32, frequency: f32, q_factor: f32) {
        self.coeffs = low_pass_coefficients(sample_rate, frequency, q_factor);
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

impl Default for BiquadFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Low-pass node whose cutoff may be retuned from another thread. Coefficients
/// are recomputed lazily on the processing side when the cutoff changed.
pub struct LowPassStage {
    frequency_bits: AtomicU32,
    sample_rate_bits: AtomicU32,
    dirty: AtomicBool,
    filter: BiquadFilter,
}

impl LowPassStage {
    pub fn new(sample_rate: f32, frequency: f32) -> Self {
        let mut filter = BiquadFilter::new();
        filter.set_low_pass(sample_rate, frequency, LOW_PASS_Q);
        Self {
            frequency_bits: AtomicU32::new(frequency.to_bits()),
            sample_rate_bits: AtomicU32::new(sample_rate.to_bits()),
            dirty: AtomicBool::new(false),
            filter,
        }
    }

    pub fn frequency(&self) -> f32 {
        f32::from_bits(self.frequency_bits.load(Ordering::Relaxed))
    }

    pub fn sample_rate(&self) -> f32 {
        f32::from_bits(self.sample_rate_bits.load(Ordering::Relaxed))
    }

    /// Returns `false` when the value is unchanged or not finite.
    pub fn set_frequency(&self, frequency: f32) -> bool {
        if !frequency.is_finite() {
            return false;
        }
        let previous = self.frequency_bits.swap(frequency.to_bits(), Ordering::Relaxed);
        let changed = previous != frequency.to_bits();
        if changed {
            self.dirty.store(true, Ordering::Release);
        }
        changed
    }

    pub fn set_sample_rate(&self, sample_rate: f32) {
        if sample_rate.is_finite() && sample_rate > 0.0 {
            let previous = self
                .sample_rate_bits
                .swap(sample_rate.to_bits(), Ordering::Relaxed);
            if previous != sample_rate.to_bits() {
                self.dirty.store(true, Ordering::Release);
            }
        }
    }

    pub fn process(&mut self, samples: &mut [f32]) {
        if self.dirty.swap(false, Ordering::AcqRel) {
            let (rate, frequency) = (self.sample_rate(), self.frequency());
            self.filter.set_low_pass(rate, frequency, LOW_PASS_Q);
        }
        for sample in samples.iter_mut() {
            *sample = self.filter.process_sample(*sample);
        }
    }

    pub fn reset(&mut self) {
        self.filter.reset();
    }
}

/// Cutoffs are held below 0.45 × sample rate; closer to Nyquist the section barely damps.
fn sanitize_frequency(frequency: f32, sample_rate: f32) -> f32 {
    let ceiling = sample_rate * 0.45;
    frequency.clamp(10.0, ceiling.max(10.0))
}

fn sanitize_q(q_factor: f32) -> f32 {
    q_factor.clamp(0.1, 18.0)
}

fn normalize(b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) -> BiquadCoefficients {
    let inv_a0 = if a0.abs() > f32::EPSILON {
        1.0 / a0
    } else {
        1.0
    };
    BiquadCoefficients {
        b0: b0 * inv_a0,
        b1: b1 * inv_a0,
        b2: b2 * inv_a0,
        a1: a1 * inv_a0,
        a2: a2 * inv_a0,
    }
}

fn low_pass_coefficients(sample_rate: f32, frequency: f32, q_factor: f32) -> BiquadCoefficients {
    let w0 = 2.0 * std::f32::consts::PI * sanitize_frequency(frequency, sample_rate) / sample_rate;
    let alpha = w0.sin() / (2.0 * sanitize_q(q_factor));
    let cos_w0 = w0.cos();

    normalize(
        (1.0 - cos_w0) * 0.5,
        1.0 - cos_w0,
        (1.0 - cos_w0) * 0.5,
        1.0 + alpha,
        -2.0 * cos_w0,
        1.0 - alpha,
    )
}
