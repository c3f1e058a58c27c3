// src/acquisition/mod.rs
//! Signal acquisition: channels, their workers and the producer loop

pub mod acquisition_loop;
pub mod channel;
pub mod control;
pub mod ring_buffer;
pub mod worker;

pub use acquisition_loop::{
    AcquisitionLoop, AcquisitionReport, AcquisitionStats, GapTracker, StopReason,
};
pub use channel::{Channel, ChannelSnapshot};
pub use control::AcquisitionControl;
pub use ring_buffer::HistoryRing;
pub use worker::{ChannelWorker, Dispatch, DispatchStats, Dispatcher};
