// src/detection/threshold.rs
//! Peak-to-peak activity detection on filtered output

use crate::acquisition::channel::{Channel, ChannelSnapshot};
use crate::config::DetectionConfig;

/// Detection result for one channel
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub channel_id: String,
    pub peak_to_peak: f64,
    pub active: bool,
}

/// Compares the peak-to-peak amplitude of recent filtered samples against a
/// threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdDetector {
    window_samples: usize,
    threshold: f64,
}

impl ThresholdDetector {
    pub fn new(window_samples: usize, threshold: f64) -> Self {
        Self { window_samples, threshold }
    }

    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::new(config.window_samples, config.threshold)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn window_samples(&self) -> usize {
        self.window_samples
    }

    /// Max minus min over `values`; zero when empty
    pub fn peak_to_peak(values: &[f64]) -> f64 {
        let mut iter = values.iter().copied();
        let Some(first) = iter.next() else {
            return 0.0;
        };
        let (min, max) = iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
        max - min
    }

    /// Evaluate newest-first filtered values; only the newest window counts
    pub fn evaluate_values(&self, channel_id: &str, filtered: &[f64]) -> Detection {
        let window = &filtered[..filtered.len().min(self.window_samples)];
        let peak_to_peak = Self::peak_to_peak(window);
        Detection {
            channel_id: channel_id.to_string(),
            peak_to_peak,
            active: peak_to_peak > self.threshold,
        }
    }

    pub fn evaluate(&self, channel: &Channel) -> Detection {
        self.evaluate_values(channel.id(), &channel.filtered_window(self.window_samples))
    }

    pub fn evaluate_snapshot(&self, snapshot: &ChannelSnapshot) -> Detection {
        self.evaluate_values(&snapshot.id, &snapshot.filtered)
    }
}
