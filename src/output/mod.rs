// src/output/mod.rs
//! Consumers of the acquisition core: sinks, recorders and display refresh

pub mod display;
pub mod recorder;
pub mod sink;

pub use display::{snapshot_all, DisplayRefresher};
pub use recorder::{CalibrationCue, CsvRecorder, RecordingSession};
pub use sink::{NullSink, QueueSink, SampleSink, SinkSample};
