//! Olimex EMG: real-time acquisition and mains filtering for a four-channel
//! EMG shield
//!
//! The crate reads the shield's serial byte stream, reconstructs frames of
//! four 10-bit samples, and runs each channel through two cascaded
//! Butterworth bandstop filters on its own worker thread:
//!
//! - Byte sources and the frame parser ([`hal`])
//! - Filter design and spectrum snapshots ([`processing`])
//! - Channels, workers and the acquisition loop ([`acquisition`])
//! - Sinks, CSV recording and display refresh ([`output`])
//! - Threshold detection and calibration patterns ([`detection`])
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use olimex_emg::acquisition::{AcquisitionControl, AcquisitionLoop};
//! use olimex_emg::config::SystemConfig;
//! use olimex_emg::hal::{SimulatedBoard, SimulatorConfig};
//! use olimex_emg::output::NullSink;
//! use std::sync::Arc;
//!
//! fn main() -> olimex_emg::Result<()> {
//!     let config = SystemConfig::default();
//!     let source = SimulatedBoard::new(SimulatorConfig::default());
//!     let control = AcquisitionControl::new();
//!     let sink = Arc::new(NullSink);
//!     let acquisition = AcquisitionLoop::new(&config, source, sink, control.clone())?;
//!     let channels = acquisition.channels().clone();
//!
//!     let handle = acquisition.spawn()?;
//!     control.start_polling();
//!     std::thread::sleep(std::time::Duration::from_secs(1));
//!     println!("{:?}", channels[0].latest());
//!
//!     control.terminate();
//!     let report = handle.join().expect("acquisition thread panicked")?;
//!     println!("{} frames", report.stats.frames);
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod acquisition;
pub mod config;
pub mod detection;
pub mod error;
pub mod hal;
pub mod output;
pub mod processing;

pub use acquisition::{
    AcquisitionControl, AcquisitionLoop, AcquisitionReport, Channel, ChannelSnapshot,
};
pub use config::{ChannelConfig, ConfigLoader, SystemConfig};
pub use error::{EmgError, Result};
pub use hal::{ByteSource, Frame, FrameParser};
pub use processing::{FilterBank, FilterCoefficients};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
