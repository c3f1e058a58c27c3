// src/acquisition/channel.rs
//! One physiological channel: histories, recursive filter, spectrum snapshots

use crate::acquisition::ring_buffer::HistoryRing;
use crate::config::constants::signal::SEED_WAVE_STEP;
use crate::config::ChannelConfig;
use crate::error::{EmgError, Result};
use crate::output::sink::SampleSink;
use crate::processing::{FilterBank, Spectrum, SpectrumAnalyzer};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Mutable part of a channel, guarded by one lock
#[derive(Debug)]
struct ChannelState {
    raw: HistoryRing,
    filtered: HistoryRing,
    since_spectrum: usize,
}

/// Copy of a channel's state for display and detection
#[derive(Debug, Clone)]
pub struct ChannelSnapshot {
    pub id: String,
    pub name: String,
    /// Raw history, newest first
    pub raw: Vec<f64>,
    /// Filtered history, newest first
    pub filtered: Vec<f64>,
    pub spectrum: Option<Arc<Spectrum>>,
    pub samples_processed: u64,
}

/// A channel owns its histories and is driven by exactly one worker.
/// Readers on other threads only ever see copies.
pub struct Channel {
    config: ChannelConfig,
    bank: FilterBank,
    state: Mutex<ChannelState>,
    analyzer: Option<SpectrumAnalyzer>,
    spectrum_interval: usize,
    spectrum: RwLock<Option<Arc<Spectrum>>>,
    sink: Arc<dyn SampleSink>,
    processed: AtomicU64,
}

impl Channel {
    /// Design the filter and allocate both histories
    ///
    /// Fails with [`EmgError::InvalidFilterSpec`] when the notch design is
    /// impossible, or a configuration error when the history cannot hold the
    /// filter or spectrum window.
    pub fn new(config: ChannelConfig, sink: Arc<dyn SampleSink>) -> Result<Self> {
        let bank = FilterBank::for_channel(&config)?;
        if config.history_length < bank.filter_length() {
            return Err(EmgError::config(
                &config.id,
                format!(
                    "history length {} shorter than filter length {}",
                    config.history_length,
                    bank.filter_length()
                ),
            ));
        }

        let (analyzer, spectrum_interval) = match config.spectrum {
            Some(settings) => {
                if settings.window_length > config.history_length || settings.interval == 0 {
                    return Err(EmgError::config(
                        &config.id,
                        format!("unusable spectrum settings {settings:?}"),
                    ));
                }
                (
                    Some(SpectrumAnalyzer::new(settings.window_length, config.sample_rate_hz)),
                    settings.interval,
                )
            }
            None => (None, 0),
        };

        let state = ChannelState {
            raw: HistoryRing::with_sine_seed(config.history_length, SEED_WAVE_STEP),
            filtered: HistoryRing::with_sine_seed(config.history_length, SEED_WAVE_STEP),
            since_spectrum: 0,
        };

        debug!(
            channel = %config.id,
            taps = bank.filter_length(),
            raw_output = config.raw_output,
            "channel ready"
        );

        Ok(Self {
            config,
            bank,
            state: Mutex::new(state),
            analyzer,
            spectrum_interval,
            spectrum: RwLock::new(None),
            sink,
            processed: AtomicU64::new(0),
        })
    }

    /// Push one raw value through the filter and return the output
    pub fn process_sample(&self, raw: f64) -> f64 {
        let coefficients = self.bank.coefficients();
        let (output, window) = {
            let mut state = self.state.lock();
            state.raw.push(raw);
            let output = if self.config.raw_output {
                raw
            } else {
                // Previous outputs are read before this one is pushed
                coefficients.step(state.raw.iter(), state.filtered.iter())
            };
            state.filtered.push(output);

            let mut window = None;
            if let Some(analyzer) = &self.analyzer {
                state.since_spectrum += 1;
                if state.since_spectrum >= self.spectrum_interval {
                    state.since_spectrum = 0;
                    window = Some(state.filtered.recent_chronological(analyzer.window_length()));
                }
            }
            (output, window)
        };

        if let (Some(analyzer), Some(window)) = (&self.analyzer, window) {
            let spectrum = analyzer.analyze(&window);
            *self.spectrum.write() = Some(Arc::new(spectrum));
        }

        self.processed.fetch_add(1, Ordering::Relaxed);
        self.sink.push(&self.config.id, raw, output);
        output
    }

    /// Process a value that arrived `gap` device ticks after the previous one
    ///
    /// A gap above one is filled with evenly spaced values ending at `value`,
    /// each processed in turn. Returns the last output.
    pub fn ingest(&self, value: f64, gap: u32) -> f64 {
        if gap <= 1 {
            return self.process_sample(value);
        }
        let last = self.state.lock().raw.newest().unwrap_or(value);
        let steps = gap as f64;
        let mut output = value;
        for k in 1..=gap {
            let interpolated = last + (value - last) * k as f64 / steps;
            output = self.process_sample(interpolated);
        }
        output
    }

    /// Newest (raw, filtered) pair
    pub fn latest(&self) -> (f64, f64) {
        let state = self.state.lock();
        (
            state.raw.newest().unwrap_or_default(),
            state.filtered.newest().unwrap_or_default(),
        )
    }

    /// Newest `n` filtered values, newest first
    pub fn filtered_window(&self, n: usize) -> Vec<f64> {
        self.state.lock().filtered.iter().take(n).collect()
    }

    /// Copy of both histories plus the latest spectrum
    pub fn snapshot(&self) -> ChannelSnapshot {
        let (raw, filtered) = {
            let state = self.state.lock();
            (state.raw.to_vec(), state.filtered.to_vec())
        };
        ChannelSnapshot {
            id: self.config.id.clone(),
            name: self.config.name.clone(),
            raw,
            filtered,
            spectrum: self.spectrum(),
            samples_processed: self.samples_processed(),
        }
    }

    /// Most recent spectrum snapshot, if one has been computed
    pub fn spectrum(&self) -> Option<Arc<Spectrum>> {
        self.spectrum.read().clone()
    }

    /// Lengths of the (raw, filtered) histories
    pub fn history_lengths(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.raw.len(), state.filtered.len())
    }

    pub fn samples_processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn filter_bank(&self) -> &FilterBank {
        &self.bank
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.config.id)
            .field("packet_index", &self.config.packet_index)
            .field("processed", &self.samples_processed())
            .finish()
    }
}
