use rustfft::{num_complex::Complex, FftPlanner};

pub const FFT_SIZE: usize = 2048;
pub const BIN_COUNT: usize = FFT_SIZE / 2;

/// dB range mapped onto `[0, 1]` for analyser bins.
pub const MIN_DECIBELS: f32 = -100.0;
pub const MAX_DECIBELS: f32 = -30.0;

/// Computes the FFT magnitude spectrum of the most recent `FFT_SIZE` mono samples.
/// Returns `BIN_COUNT` magnitude values in dB.
pub fn compute_spectrum(mono: &[f32]) -> Vec<f32> {
    if mono.len() < FFT_SIZE {
        return vec![MIN_DECIBELS; BIN_COUNT];
    }

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(FFT_SIZE);

    // Hann window over the newest block
    let start = mono.len() - FFT_SIZE;
    let mut buffer: Vec<Complex<f32>> = mono[start..]
        .iter()
        .enumerate()
        .map(|(i, &s)| {
            let window =
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (FFT_SIZE - 1) as f32).cos());
            Complex::new(s * window, 0.0)
        })
        .collect();

    fft.process(&mut buffer);

    let norm = 1.0 / FFT_SIZE as f32;
    buffer[..BIN_COUNT]
        .iter()
        .map(|c| {
            let magnitude = c.norm() * norm;
            20.0 * magnitude.max(1e-10).log10()
        })
        .collect()
}

/// Byte-style analyser bins: each dB value scaled into `[0, 1]`.
pub fn frequency_bins(mono: &[f32]) -> Vec<f32> {
    compute_spectrum(mono)
        .into_iter()
        .map(|db| ((db - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS)).clamp(0.0, 1.0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn short_input_returns_floor() {
        let result = compute_spectrum(&[0.5; 10]);
        assert_eq!(result.len(), BIN_COUNT);
        assert!(result.iter().all(|&v| v == MIN_DECIBELS));
        assert!(frequency_bins(&[]).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn sine_wave_produces_peak() {
        let sample_rate = 48_000.0_f32;
        let freq = 1_000.0_f32;
        let spectrum = compute_spectrum(&sine(freq, sample_rate, FFT_SIZE * 2));
        assert_eq!(spectrum.len(), BIN_COUNT);

        let expected_bin = (freq / sample_rate * FFT_SIZE as f32) as usize;
        let max_bin = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(bin, _)| bin)
            .expect("non-empty spectrum");

        assert!(
            (max_bin as i32 - expected_bin as i32).unsigned_abs() <= 2,
            "Expected peak near bin {expected_bin}, got bin {max_bin}"
        );
    }

    #[test]
    fn bins_are_normalized() {
        let bins = frequency_bins(&sine(440.0, 44_100.0, FFT_SIZE));
        assert_eq!(bins.len(), BIN_COUNT);
        assert!(bins.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(bins.iter().any(|&v| v > 0.5));
    }
}
