// src/processing/mod.rs
//! Signal processing for EMG channels

pub mod filter_bank;
pub mod spectrum;

pub use filter_bank::{convolve, FilterBank, FilterCoefficients, NotchSpec};
pub use spectrum::{Spectrum, SpectrumAnalyzer};
