// src/processing/filter_bank.rs
//! Mains interference filter bank
//!
//! Two Butterworth bandstop sections, one at the mains frequency and one at a
//! configurable multiple of it, designed in the analog domain, mapped through
//! the bilinear transform and merged into a single transfer function by
//! polynomial convolution.

use crate::config::constants::filters::{MAX_FILTER_ORDER, MIN_FILTER_ORDER};
use crate::config::ChannelConfig;
use crate::error::{EmgError, Result};
use rustfft::num_complex::Complex64;
use std::f64::consts::PI;

/// Design inputs for one channel's filter bank
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NotchSpec {
    pub sample_rate_hz: f64,
    pub mains_freq_hz: f64,
    /// Each stop band spans `centre ± half_width_hz`
    pub half_width_hz: f64,
    pub order: usize,
    pub second_notch_multiplier: f64,
}

impl NotchSpec {
    pub fn from_channel(config: &ChannelConfig) -> Self {
        Self {
            sample_rate_hz: config.sample_rate_hz,
            mains_freq_hz: config.mains_freq_hz,
            half_width_hz: config.notch_half_width_hz,
            order: config.filter_order,
            second_notch_multiplier: config.second_notch_multiplier,
        }
    }

    /// Stop band centres in Hz
    pub fn centres(&self) -> [f64; 2] {
        [self.mains_freq_hz, self.mains_freq_hz * self.second_notch_multiplier]
    }

    /// Normalized (to Nyquist) band edges of a notch centred at `centre_hz`
    fn band_edges(&self, centre_hz: f64) -> Result<(f64, f64)> {
        let nyquist = self.sample_rate_hz / 2.0;
        let low = (centre_hz - self.half_width_hz) / nyquist;
        let high = (centre_hz + self.half_width_hz) / nyquist;
        let inside = |w: f64| w.is_finite() && w > 0.0 && w < 1.0;
        if !inside(low) || !inside(high) {
            return Err(EmgError::InvalidFilterSpec(format!(
                "stop band {:.3}..{:.3} Hz falls outside (0, {:.3}) Hz",
                centre_hz - self.half_width_hz,
                centre_hz + self.half_width_hz,
                nyquist
            )));
        }
        Ok((low, high))
    }

    fn validate(&self) -> Result<()> {
        if !(MIN_FILTER_ORDER..=MAX_FILTER_ORDER).contains(&self.order) {
            return Err(EmgError::InvalidFilterSpec(format!(
                "order {} outside {}..={}",
                self.order, MIN_FILTER_ORDER, MAX_FILTER_ORDER
            )));
        }
        let finite = self.sample_rate_hz.is_finite() && self.mains_freq_hz.is_finite();
        if !finite || self.mains_freq_hz <= 0.0 {
            return Err(EmgError::InvalidFilterSpec(format!(
                "mains frequency {} Hz must be positive",
                self.mains_freq_hz
            )));
        }
        if self.sample_rate_hz <= 2.0 * self.mains_freq_hz {
            return Err(EmgError::InvalidFilterSpec(format!(
                "sample rate {} Hz must exceed twice the mains frequency {} Hz",
                self.sample_rate_hz, self.mains_freq_hz
            )));
        }
        if !(self.half_width_hz > 0.0) {
            return Err(EmgError::InvalidFilterSpec(format!(
                "notch half-width {} Hz must be positive",
                self.half_width_hz
            )));
        }
        if !(self.second_notch_multiplier > 0.0) {
            return Err(EmgError::InvalidFilterSpec(format!(
                "second notch multiplier {} must be positive",
                self.second_notch_multiplier
            )));
        }
        Ok(())
    }
}

/// Transfer function `B(z)/A(z)`, highest power first
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCoefficients {
    /// Feedforward coefficients
    pub b: Vec<f64>,
    /// Feedback coefficients, `a[0] != 0`
    pub a: Vec<f64>,
}

impl FilterCoefficients {
    /// Number of taps, i.e. the history depth the filter needs
    pub fn len(&self) -> usize {
        self.a.len().max(self.b.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Series combination of two filters
    pub fn cascade(&self, other: &FilterCoefficients) -> FilterCoefficients {
        FilterCoefficients {
            b: convolve(&self.b, &other.b),
            a: convolve(&self.a, &other.a),
        }
    }

    /// One direct-form step
    ///
    /// `inputs` yields raw samples newest first, the current sample included.
    /// `outputs` yields previous filtered samples newest first, the value
    /// being computed excluded. A shorter coefficient vector is treated as
    /// zero padded.
    pub fn step<I, O>(&self, inputs: I, outputs: O) -> f64
    where
        I: IntoIterator<Item = f64>,
        O: IntoIterator<Item = f64>,
    {
        let feedforward: f64 = self.b.iter().zip(inputs).map(|(b, x)| b * x).sum();
        let feedback: f64 = self.a.iter().skip(1).zip(outputs).map(|(a, y)| a * y).sum();
        (feedforward - feedback) / self.a[0]
    }

    /// Magnitude response at `freq_hz`
    pub fn magnitude_at(&self, freq_hz: f64, sample_rate_hz: f64) -> f64 {
        let omega = 2.0 * PI * freq_hz / sample_rate_hz;
        // Evaluate in powers of z^-1
        let eval = |coeffs: &[f64]| {
            coeffs
                .iter()
                .enumerate()
                .map(|(k, c)| Complex64::from_polar(*c, -omega * k as f64))
                .sum::<Complex64>()
        };
        (eval(&self.b) / eval(&self.a)).norm()
    }

    /// Gain for a constant input
    pub fn dc_gain(&self) -> f64 {
        self.b.iter().sum::<f64>() / self.a.iter().sum::<f64>()
    }

    /// True when every root of `A(z)` lies strictly inside the unit circle
    ///
    /// Schur-Cohn step-down: the recursion is stable iff every reflection
    /// coefficient has magnitude below one.
    pub fn is_stable(&self) -> bool {
        let Some(&lead) = self.a.first() else {
            return false;
        };
        if lead == 0.0 || !lead.is_finite() {
            return false;
        }
        let mut a: Vec<f64> = self.a.iter().map(|c| c / lead).collect();
        while a.len() > 1 {
            let m = a.len() - 1;
            let k = a[m];
            if !(k.abs() < 1.0) {
                return false;
            }
            let scale = 1.0 - k * k;
            a = (0..m).map(|i| (a[i] - k * a[m - i]) / scale).collect();
        }
        true
    }
}

/// Coefficients for one channel, computed once at construction
#[derive(Debug, Clone)]
pub struct FilterBank {
    spec: NotchSpec,
    sections: [FilterCoefficients; 2],
    combined: FilterCoefficients,
}

impl FilterBank {
    /// Design both notch sections and combine them
    pub fn design(spec: NotchSpec) -> Result<Self> {
        spec.validate()?;
        let [first, second] = spec.centres();

        let (lo, hi) = spec.band_edges(first)?;
        let mains = butterworth_bandstop(spec.order, lo, hi);
        let (lo, hi) = spec.band_edges(second)?;
        let harmonic = butterworth_bandstop(spec.order, lo, hi);

        let combined = mains.cascade(&harmonic);
        if combined.a[0] == 0.0 || !combined.a.iter().chain(&combined.b).all(|c| c.is_finite()) {
            return Err(EmgError::InvalidFilterSpec(
                "design produced non-finite coefficients".to_string(),
            ));
        }
        if !combined.is_stable() {
            return Err(EmgError::InvalidFilterSpec(format!(
                "order {} design has poles on or outside the unit circle",
                spec.order
            )));
        }

        Ok(Self {
            spec,
            sections: [mains, harmonic],
            combined,
        })
    }

    pub fn for_channel(config: &ChannelConfig) -> Result<Self> {
        Self::design(NotchSpec::from_channel(config))
    }

    pub fn coefficients(&self) -> &FilterCoefficients {
        &self.combined
    }

    /// The two bandstop sections before convolution
    pub fn sections(&self) -> &[FilterCoefficients; 2] {
        &self.sections
    }

    pub fn spec(&self) -> &NotchSpec {
        &self.spec
    }

    pub fn filter_length(&self) -> usize {
        self.combined.len()
    }

    pub fn magnitude_at(&self, freq_hz: f64) -> f64 {
        self.combined.magnitude_at(freq_hz, self.spec.sample_rate_hz)
    }
}

/// Full linear convolution of two sequences
pub fn convolve(x: &[f64], y: &[f64]) -> Vec<f64> {
    if x.is_empty() || y.is_empty() {
        return Vec::new();
    }
    let mut out = vec![0.0; x.len() + y.len() - 1];
    for (i, xi) in x.iter().enumerate() {
        for (j, yj) in y.iter().enumerate() {
            out[i + j] += xi * yj;
        }
    }
    out
}

/// Digital Butterworth bandstop between normalized edges `low` and `high`
///
/// Analog prototype poles, lowpass to bandstop transform around the prewarped
/// edges, then bilinear transform with `fs = 2`. Produces `2 * order + 1`
/// coefficients per polynomial.
fn butterworth_bandstop(order: usize, low: f64, high: f64) -> FilterCoefficients {
    let n = order as f64;
    let prototype: Vec<Complex64> = (0..order)
        .map(|k| {
            let m = 2.0 * k as f64 - n + 1.0;
            -Complex64::from_polar(1.0, PI * m / (2.0 * n))
        })
        .collect();

    // Prewarp for fs = 2
    let fs2 = 4.0;
    let w_low = fs2 * (PI * low / 2.0).tan();
    let w_high = fs2 * (PI * high / 2.0).tan();
    let bw = w_high - w_low;
    let wo = (w_low * w_high).sqrt();

    // Lowpass to bandstop: each pole splits in two, zeros land at +-j*wo
    let mut poles = Vec::with_capacity(2 * order);
    let mut split = Vec::with_capacity(order);
    for p in &prototype {
        let p_hp = (bw / 2.0) / *p;
        let root = (p_hp * p_hp - Complex64::new(wo * wo, 0.0)).sqrt();
        poles.push(p_hp + root);
        split.push(p_hp - root);
    }
    poles.extend(split);
    let mut zeros = vec![Complex64::new(0.0, wo); order];
    zeros.extend(std::iter::repeat(Complex64::new(0.0, -wo)).take(order));
    let prototype_gain: Complex64 = prototype.iter().map(|p| -*p).product();
    let mut gain = (Complex64::new(1.0, 0.0) / prototype_gain).re;

    // Bilinear transform
    let fs2c = Complex64::new(fs2, 0.0);
    let zeros_z: Vec<Complex64> = zeros.iter().map(|z| (fs2c + *z) / (fs2c - *z)).collect();
    let poles_z: Vec<Complex64> = poles.iter().map(|p| (fs2c + *p) / (fs2c - *p)).collect();
    let num: Complex64 = zeros.iter().map(|z| fs2c - *z).product();
    let den: Complex64 = poles.iter().map(|p| fs2c - *p).product();
    gain *= (num / den).re;

    let b = poly(&zeros_z).into_iter().map(|c| gain * c.re).collect();
    let a = poly(&poles_z).into_iter().map(|c| c.re).collect();
    FilterCoefficients { b, a }
}

/// Monic polynomial with the given roots, highest power first
fn poly(roots: &[Complex64]) -> Vec<Complex64> {
    let mut coeffs = vec![Complex64::new(1.0, 0.0)];
    for root in roots {
        let mut next = vec![Complex64::new(0.0, 0.0); coeffs.len() + 1];
        for (i, &c) in coeffs.iter().enumerate() {
            next[i] += c;
            next[i + 1] -= c * *root;
        }
        coeffs = next;
    }
    coeffs
}
