// src/detection/mod.rs
//! Gesture detection and calibration support

pub mod calibration;
pub mod threshold;

pub use calibration::{
    default_patterns, muscle_group, populate_patterns, CalibrationPattern, CueStep,
};
pub use threshold::{Detection, ThresholdDetector};
