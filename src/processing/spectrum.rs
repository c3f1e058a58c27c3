// src/processing/spectrum.rs
//! Magnitude spectrum snapshots of a channel's filtered output

use rustfft::num_complex::Complex64;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// One spectrum snapshot, DC bin removed
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    /// Centre frequency of each bin in Hz, starting at `sample_rate / n`
    pub frequencies_hz: Vec<f64>,
    /// Magnitude of each bin, unnormalized
    pub magnitudes: Vec<f64>,
}

impl Spectrum {
    /// Bin with the largest magnitude, as (frequency, magnitude)
    pub fn peak(&self) -> Option<(f64, f64)> {
        self.frequencies_hz
            .iter()
            .copied()
            .zip(self.magnitudes.iter().copied())
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }
}

/// Real-input FFT of a fixed window length, planned once
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f64>>,
    window_length: usize,
    sample_rate_hz: f64,
}

impl SpectrumAnalyzer {
    pub fn new(window_length: usize, sample_rate_hz: f64) -> Self {
        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(window_length);
        Self {
            fft,
            window_length,
            sample_rate_hz,
        }
    }

    pub fn window_length(&self) -> usize {
        self.window_length
    }

    /// Transform `samples` (oldest first). Shorter input is zero padded,
    /// longer input is truncated to the newest `window_length` values.
    pub fn analyze(&self, samples: &[f64]) -> Spectrum {
        let n = self.window_length;
        let start = samples.len().saturating_sub(n);
        let mut buffer: Vec<Complex64> = samples[start..]
            .iter()
            .map(|&v| Complex64::new(v, 0.0))
            .collect();
        buffer.resize(n, Complex64::new(0.0, 0.0));
        self.fft.process(&mut buffer);

        let bin_width = self.sample_rate_hz / n as f64;
        let bins = 1..=n / 2;
        Spectrum {
            frequencies_hz: bins.clone().map(|k| k as f64 * bin_width).collect(),
            magnitudes: buffer[bins].iter().map(|c| c.norm()).collect(),
        }
    }
}

impl std::fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("window_length", &self.window_length)
            .field("sample_rate_hz", &self.sample_rate_hz)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_bin_count_excludes_dc() {
        let analyzer = SpectrumAnalyzer::new(256, 256.0);
        let spectrum = analyzer.analyze(&vec![1.0; 256]);
        assert_eq!(spectrum.magnitudes.len(), 128);
        assert_eq!(spectrum.frequencies_hz[0], 1.0);
        // A constant has all its energy in DC
        assert!(spectrum.magnitudes.iter().all(|m| *m < 1e-9));
    }

    #[test]
    fn test_sine_peak_located() {
        let analyzer = SpectrumAnalyzer::new(256, 256.0);
        let samples: Vec<f64> = (0..256)
            .map(|i| (2.0 * PI * 40.0 * i as f64 / 256.0).sin())
            .collect();
        let (freq, magnitude) = analyzer.analyze(&samples).peak().unwrap();
        assert_eq!(freq, 40.0);
        assert!((magnitude - 128.0).abs() < 1e-6);
    }

    #[test]
    fn test_short_input_is_padded() {
        let analyzer = SpectrumAnalyzer::new(16, 16.0);
        let spectrum = analyzer.analyze(&[1.0, 0.0, 0.0]);
        assert_eq!(spectrum.magnitudes.len(), 8);
        // Impulse: flat magnitude
        assert!(spectrum.magnitudes.iter().all(|m| (m - 1.0).abs() < 1e-12));
    }
}
