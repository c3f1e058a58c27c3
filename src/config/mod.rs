// src/config/mod.rs
//! Configuration for the acquisition core
//!
//! A [`SystemConfig`] is built once (from defaults, a TOML file, or the
//! [`ConfigLoader`]), validated, and then handed by value or reference to each
//! component constructor. Nothing mutates it after startup.

pub mod constants;
pub mod loader;

pub use constants::*;
pub use loader::ConfigLoader;

use crate::error::{EmgError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use constants::signal::CHANNEL_COUNT;

/// Where the acquisition loop reads its bytes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Serial,
    Simulated,
}

/// Layout of the CSV file written while polling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingMode {
    Off,
    Raw,
    Calibration,
}

/// Complete system configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    #[serde(default)]
    pub filter: FilterConfig,

    #[serde(default)]
    pub spectrum: SpectrumConfig,

    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub display: DisplayConfig,

    #[serde(default)]
    pub detection: DetectionConfig,

    #[serde(default)]
    pub recording: RecordingConfig,

    #[serde(default = "defaults::channels")]
    pub channels: Vec<ChannelSpec>,
}

/// Acquisition loop and channel buffer settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AcquisitionConfig {
    #[serde(default = "defaults::sample_rate_hz")]
    pub sample_rate_hz: u32,

    /// Capacity of both per-channel histories
    #[serde(default = "defaults::history_length")]
    pub history_length: usize,

    /// Bypass filtering and publish raw values as the filtered output
    #[serde(default)]
    pub raw_output: bool,

    /// Spread a detected multi-sample gap across interpolated values
    #[serde(default)]
    pub interpolate_gaps: bool,

    #[serde(default = "defaults::idle_drain_interval_ms")]
    pub idle_drain_interval_ms: u64,

    #[serde(default = "defaults::worker_queue_depth")]
    pub worker_queue_depth: usize,

    #[serde(default = "defaults::source")]
    pub source: SourceKind,
}

/// Mains notch filter design parameters
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FilterConfig {
    #[serde(default = "defaults::mains_freq_hz")]
    pub mains_freq_hz: f64,

    /// Half-width of each stop band in Hz
    #[serde(default = "defaults::notch_half_width_hz")]
    pub notch_half_width_hz: f64,

    #[serde(default = "defaults::filter_order")]
    pub order: usize,

    /// Centre of the second notch as a multiple of the mains frequency
    #[serde(default = "defaults::second_notch_multiplier")]
    pub second_notch_multiplier: f64,
}

/// Periodic spectrum snapshot settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SpectrumConfig {
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Snapshot every `sample_rate_hz / interval_divisor` samples
    #[serde(default = "defaults::interval_divisor")]
    pub interval_divisor: u32,

    #[serde(default = "defaults::window_length")]
    pub window_length: usize,
}

/// Serial port settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "defaults::port_name")]
    pub port_name: String,

    #[serde(default = "defaults::baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "defaults::read_timeout_ms")]
    pub read_timeout_ms: u64,
}

/// Display refresh settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DisplayConfig {
    #[serde(default = "defaults::refresh_interval_ms")]
    pub refresh_interval_ms: u64,
}

/// Threshold detection settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DetectionConfig {
    #[serde(default = "defaults::window_samples")]
    pub window_samples: usize,

    #[serde(default = "defaults::threshold")]
    pub threshold: f64,
}

/// Recording settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RecordingConfig {
    #[serde(default = "defaults::recording_mode")]
    pub mode: RecordingMode,

    #[serde(default = "defaults::recording_directory")]
    pub directory: PathBuf,
}

/// One physiological channel as named in the configuration file
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ChannelSpec {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Position of this channel's low byte in the packet (2..=5)
    pub packet_index: u8,
}

/// Immutable per-channel setup derived from [`SystemConfig`]
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    pub id: String,
    pub name: String,
    pub packet_index: u8,
    pub sample_rate_hz: f64,
    pub mains_freq_hz: f64,
    pub notch_half_width_hz: f64,
    pub filter_order: usize,
    pub second_notch_multiplier: f64,
    pub history_length: usize,
    pub raw_output: bool,
    pub spectrum: Option<SpectrumSettings>,
}

/// Resolved spectrum cadence for one channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectrumSettings {
    /// Number of processed samples between snapshots
    pub interval: usize,
    pub window_length: usize,
}

impl ChannelConfig {
    /// Slot of this channel's sample inside a decoded frame
    pub fn slot(&self) -> usize {
        (self.packet_index - protocol::FIRST_PACKET_INDEX) as usize
    }

    /// Convenience constructor used by tests and tools
    pub fn with_defaults(id: &str, packet_index: u8) -> Self {
        let mut system = SystemConfig::default();
        system.channels = vec![ChannelSpec {
            id: id.to_string(),
            name: id.to_string(),
            packet_index,
        }];
        system.channel_config(&system.channels[0])
    }
}

mod defaults {
    use super::{ChannelSpec, RecordingMode, SourceKind};
    use crate::config::constants::*;
    use std::path::PathBuf;

    pub fn sample_rate_hz() -> u32 { signal::DEFAULT_SAMPLING_RATE_HZ }
    pub fn history_length() -> usize { signal::DEFAULT_HISTORY_LENGTH }
    pub fn idle_drain_interval_ms() -> u64 { timing::IDLE_DRAIN_INTERVAL_MS }
    pub fn worker_queue_depth() -> usize { timing::DEFAULT_WORKER_QUEUE_DEPTH }
    pub fn source() -> SourceKind { SourceKind::Serial }

    pub fn mains_freq_hz() -> f64 { filters::DEFAULT_MAINS_FREQ_HZ }
    pub fn notch_half_width_hz() -> f64 { filters::DEFAULT_NOTCH_HALF_WIDTH_HZ }
    pub fn filter_order() -> usize { filters::DEFAULT_FILTER_ORDER }
    pub fn second_notch_multiplier() -> f64 { filters::DEFAULT_SECOND_NOTCH_MULTIPLIER }

    pub fn enabled() -> bool { true }
    pub fn interval_divisor() -> u32 { spectrum::DEFAULT_INTERVAL_DIVISOR }
    pub fn window_length() -> usize { spectrum::DEFAULT_WINDOW_LENGTH }

    pub fn port_name() -> String { hal::DEFAULT_PORT_NAME.to_string() }
    pub fn baud_rate() -> u32 { hal::DEFAULT_BAUD_RATE }
    pub fn read_timeout_ms() -> u64 { hal::DEFAULT_READ_TIMEOUT_MS }

    pub fn refresh_interval_ms() -> u64 { timing::DISPLAY_REFRESH_INTERVAL_MS }

    pub fn window_samples() -> usize { detection::DEFAULT_WINDOW_SAMPLES }
    pub fn threshold() -> f64 { detection::DEFAULT_THRESHOLD }

    pub fn recording_mode() -> RecordingMode { RecordingMode::Off }
    pub fn recording_directory() -> PathBuf { PathBuf::from("recordings") }

    pub fn channels() -> Vec<ChannelSpec> {
        [
            ("fi_ext", "Extend Fingers", 2),
            ("fi_flx", "Flex Fingers", 3),
            ("th_abd", "ABduct Thumb", 4),
            ("th_add", "ADduct Thumb", 5),
        ]
        .into_iter()
        .map(|(id, name, packet_index)| ChannelSpec {
            id: id.to_string(),
            name: name.to_string(),
            packet_index,
        })
        .collect()
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            acquisition: AcquisitionConfig::default(),
            filter: FilterConfig::default(),
            spectrum: SpectrumConfig::default(),
            serial: SerialConfig::default(),
            display: DisplayConfig::default(),
            detection: DetectionConfig::default(),
            recording: RecordingConfig::default(),
            channels: defaults::channels(),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: defaults::sample_rate_hz(),
            history_length: defaults::history_length(),
            raw_output: false,
            interpolate_gaps: false,
            idle_drain_interval_ms: defaults::idle_drain_interval_ms(),
            worker_queue_depth: defaults::worker_queue_depth(),
            source: defaults::source(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            mains_freq_hz: defaults::mains_freq_hz(),
            notch_half_width_hz: defaults::notch_half_width_hz(),
            order: defaults::filter_order(),
            second_notch_multiplier: defaults::second_notch_multiplier(),
        }
    }
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::enabled(),
            interval_divisor: defaults::interval_divisor(),
            window_length: defaults::window_length(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: defaults::port_name(),
            baud_rate: defaults::baud_rate(),
            read_timeout_ms: defaults::read_timeout_ms(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { refresh_interval_ms: defaults::refresh_interval_ms() }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            window_samples: defaults::window_samples(),
            threshold: defaults::threshold(),
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            mode: defaults::recording_mode(),
            directory: defaults::recording_directory(),
        }
    }
}

impl SystemConfig {
    /// Parse a TOML document; missing sections fall back to defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: SystemConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize back to TOML, e.g. to write a starter config file
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| EmgError::config("toml", e.to_string()))
    }

    /// Check cross-field constraints. Filter design limits are checked later,
    /// when each channel builds its coefficients.
    pub fn validate(&self) -> Result<()> {
        let mut issues = Vec::new();
        let acq = &self.acquisition;

        if acq.sample_rate_hz == 0 {
            issues.push("acquisition.sample_rate_hz must be greater than 0".to_string());
        }
        if acq.history_length == 0 {
            issues.push("acquisition.history_length must be greater than 0".to_string());
        }
        if acq.worker_queue_depth == 0 {
            issues.push("acquisition.worker_queue_depth must be greater than 0".to_string());
        }
        if acq.idle_drain_interval_ms == 0 {
            issues.push("acquisition.idle_drain_interval_ms must be greater than 0".to_string());
        }
        let needed = filters::filter_length(self.filter.order);
        if acq.history_length < needed {
            issues.push(format!(
                "acquisition.history_length {} is shorter than the filter length {}",
                acq.history_length, needed
            ));
        }
        if self.spectrum.enabled {
            if self.spectrum.interval_divisor == 0 {
                issues.push("spectrum.interval_divisor must be greater than 0".to_string());
            }
            if self.spectrum.window_length < 2 || self.spectrum.window_length > acq.history_length {
                issues.push(format!(
                    "spectrum.window_length {} must be within 2..={}",
                    self.spectrum.window_length, acq.history_length
                ));
            }
        }
        if self.display.refresh_interval_ms == 0 {
            issues.push("display.refresh_interval_ms must be greater than 0".to_string());
        }
        if self.detection.window_samples < 2 || self.detection.window_samples > acq.history_length {
            issues.push(format!(
                "detection.window_samples {} must be within 2..={}",
                self.detection.window_samples, acq.history_length
            ));
        }

        if self.channels.len() != CHANNEL_COUNT {
            issues.push(format!(
                "expected {} channels, found {}",
                CHANNEL_COUNT,
                self.channels.len()
            ));
        }
        let mut seen_indices = [false; CHANNEL_COUNT];
        for (pos, spec) in self.channels.iter().enumerate() {
            if spec.id.trim().is_empty() {
                issues.push(format!("channel #{pos} has an empty id"));
            }
            if self.channels[..pos].iter().any(|other| other.id == spec.id) {
                issues.push(format!("channel id '{}' is used twice", spec.id));
            }
            let packet_range = protocol::FIRST_PACKET_INDEX..=protocol::LAST_PACKET_INDEX;
            if !packet_range.contains(&spec.packet_index) {
                issues.push(format!(
                    "channel '{}' packet_index {} outside {}..={}",
                    spec.id,
                    spec.packet_index,
                    protocol::FIRST_PACKET_INDEX,
                    protocol::LAST_PACKET_INDEX
                ));
                continue;
            }
            let slot = (spec.packet_index - protocol::FIRST_PACKET_INDEX) as usize;
            if seen_indices[slot] {
                issues.push(format!("packet_index {} is used twice", spec.packet_index));
            }
            seen_indices[slot] = true;
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(EmgError::config("system", issues.join("; ")))
        }
    }

    /// Per-channel configurations ordered by packet index
    pub fn channel_configs(&self) -> Result<[ChannelConfig; CHANNEL_COUNT]> {
        self.validate()?;
        let mut specs: Vec<&ChannelSpec> = self.channels.iter().collect();
        specs.sort_by_key(|spec| spec.packet_index);
        let configs: Vec<ChannelConfig> =
            specs.into_iter().map(|s| self.channel_config(s)).collect();
        configs
            .try_into()
            .map_err(|_| EmgError::config("channels", "channel set size mismatch"))
    }

    fn channel_config(&self, spec: &ChannelSpec) -> ChannelConfig {
        let rate = self.acquisition.sample_rate_hz;
        let spectrum = self.spectrum.enabled.then(|| SpectrumSettings {
            interval: (rate / self.spectrum.interval_divisor.max(1)).max(1) as usize,
            window_length: self.spectrum.window_length,
        });
        ChannelConfig {
            id: spec.id.clone(),
            name: if spec.name.is_empty() { spec.id.clone() } else { spec.name.clone() },
            packet_index: spec.packet_index,
            sample_rate_hz: rate as f64,
            mains_freq_hz: self.filter.mains_freq_hz,
            notch_half_width_hz: self.filter.notch_half_width_hz,
            filter_order: self.filter.order,
            second_notch_multiplier: self.filter.second_notch_multiplier,
            history_length: self.acquisition.history_length,
            raw_output: self.acquisition.raw_output,
            spectrum,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SystemConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.acquisition.sample_rate_hz, 256);
        assert_eq!(config.filter.order, 3);
        assert_eq!(config.filter.second_notch_multiplier, 2.0);
    }

    #[test]
    fn test_channel_configs_sorted_by_packet_index() {
        let mut config = SystemConfig::default();
        config.channels.reverse();
        let channels = config.channel_configs().unwrap();
        let indices: Vec<u8> = channels.iter().map(|c| c.packet_index).collect();
        assert_eq!(indices, vec![2, 3, 4, 5]);
        assert_eq!(channels[0].id, "fi_ext");
        assert_eq!(channels[3].slot(), 3);
    }

    #[test]
    fn test_spectrum_interval_derived_from_rate() {
        let config = SystemConfig::default();
        let channels = config.channel_configs().unwrap();
        let spectrum = channels[0].spectrum.unwrap();
        assert_eq!(spectrum.interval, 8);
        assert_eq!(spectrum.window_length, 256);
    }

    #[test]
    fn test_duplicate_packet_index_rejected() {
        let mut config = SystemConfig::default();
        config.channels[1].packet_index = 2;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("packet_index 2 is used twice"));
    }

    #[test]
    fn test_packet_index_out_of_range_rejected() {
        let mut config = SystemConfig::default();
        config.channels[0].packet_index = 6;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_history_shorter_than_filter_rejected() {
        let mut config = SystemConfig::default();
        config.acquisition.history_length = 8;
        config.spectrum.enabled = false;
        config.detection.window_samples = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip_with_partial_document() {
        let text = r#"
            [acquisition]
            sample_rate_hz = 512
            raw_output = true

            [filter]
            mains_freq_hz = 60.0
            second_notch_multiplier = 0.5
        "#;
        let config = SystemConfig::from_toml_str(text).unwrap();
        assert_eq!(config.acquisition.sample_rate_hz, 512);
        assert!(config.acquisition.raw_output);
        assert_eq!(config.filter.mains_freq_hz, 60.0);
        assert_eq!(config.filter.notch_half_width_hz, 0.5);
        assert_eq!(config.channels.len(), CHANNEL_COUNT);

        let written = config.to_toml_string().unwrap();
        let reparsed = SystemConfig::from_toml_str(&written).unwrap();
        assert_eq!(reparsed.filter.second_notch_multiplier, 0.5);
    }
}
