// src/acquisition/acquisition_loop.rs
//! The producer: reads frames and fans samples out to channel workers

use crate::acquisition::channel::Channel;
use crate::acquisition::control::AcquisitionControl;
use crate::acquisition::worker::{DispatchStats, Dispatcher};
use crate::config::constants::signal::CHANNEL_COUNT;
use crate::config::{RecordingConfig, SystemConfig};
use crate::error::{EmgError, Result};
use crate::hal::protocol::{Frame, FrameParser};
use crate::hal::traits::{is_transient, ByteSource};
use crate::output::recorder::{CalibrationCue, RecordingSession};
use crate::output::sink::SampleSink;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// [`AcquisitionControl::terminate`] was called
    Terminated,
    /// The byte source reported end of stream
    StreamClosed,
}

/// Counters collected over a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcquisitionStats {
    pub frames: u64,
    /// Device samples missing according to the sequence counter
    pub dropped_samples: u64,
    /// Frames repeating the previous sequence number
    pub duplicate_frames: u64,
    pub bytes_skipped: u64,
    pub idle_drains: u64,
    pub sessions: u64,
    pub recorded_rows: u64,
    pub dispatch: DispatchStats,
}

/// Result of a completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionReport {
    pub reason: StopReason,
    pub stats: AcquisitionStats,
}

/// Tracks the rolling sequence counter between frames
#[derive(Debug, Default)]
pub struct GapTracker {
    prev: Option<u8>,
}

impl GapTracker {
    /// Ticks since the previous frame, modulo 256
    ///
    /// The first frame after a reset always reports a gap of one.
    pub fn observe(&mut self, sequence: u8) -> u32 {
        let prev = self.prev.unwrap_or_else(|| sequence.wrapping_sub(1));
        self.prev = Some(sequence);
        sequence.wrapping_sub(prev) as u32
    }

    pub fn reset(&mut self) {
        self.prev = None;
    }
}

/// Serial acquisition loop owning the byte source and the channels
pub struct AcquisitionLoop<S: ByteSource> {
    source: S,
    parser: FrameParser,
    channels: [Arc<Channel>; CHANNEL_COUNT],
    dispatcher: Option<Dispatcher>,
    control: AcquisitionControl,
    recording: RecordingConfig,
    cue: CalibrationCue,
    session: Option<RecordingSession>,
    gaps: GapTracker,
    interpolate_gaps: bool,
    idle_drain: Duration,
    stats: AcquisitionStats,
}

impl<S: ByteSource> AcquisitionLoop<S> {
    /// Build every channel and start its worker
    ///
    /// Fails before any thread starts if a channel's filter cannot be built.
    pub fn new(
        config: &SystemConfig,
        source: S,
        sink: Arc<dyn SampleSink>,
        control: AcquisitionControl,
    ) -> Result<Self> {
        let configs = config.channel_configs()?;
        let mut built = Vec::with_capacity(CHANNEL_COUNT);
        for channel_config in configs {
            built.push(Arc::new(Channel::new(channel_config, sink.clone())?));
        }
        let channels: [Arc<Channel>; CHANNEL_COUNT] = built
            .try_into()
            .map_err(|_| EmgError::config("channels", "channel set size mismatch"))?;

        let dispatcher = Dispatcher::spawn(
            &channels,
            &control,
            config.acquisition.worker_queue_depth,
            config.acquisition.interpolate_gaps,
        )?;

        info!(
            source = %source.describe(),
            sample_rate_hz = config.acquisition.sample_rate_hz,
            interpolate_gaps = config.acquisition.interpolate_gaps,
            "acquisition loop ready"
        );

        Ok(Self {
            source,
            parser: FrameParser::new(),
            channels,
            dispatcher: Some(dispatcher),
            control,
            recording: config.recording.clone(),
            cue: CalibrationCue::new(),
            session: None,
            gaps: GapTracker::default(),
            interpolate_gaps: config.acquisition.interpolate_gaps,
            idle_drain: Duration::from_millis(config.acquisition.idle_drain_interval_ms),
            stats: AcquisitionStats::default(),
        })
    }

    /// Channels in packet order, for display and detection
    pub fn channels(&self) -> &[Arc<Channel>; CHANNEL_COUNT] {
        &self.channels
    }

    pub fn control(&self) -> &AcquisitionControl {
        &self.control
    }

    /// Flags written into calibration recordings
    pub fn calibration_cue(&self) -> &CalibrationCue {
        &self.cue
    }

    /// Run until terminated or the stream closes, then shut down
    pub fn run(mut self) -> Result<AcquisitionReport> {
        let outcome = self.poll_until_stopped();
        let cleanup = self.shutdown();
        match (outcome, cleanup) {
            (Ok(reason), Ok(())) => {
                info!(?reason, frames = self.stats.frames, "acquisition stopped");
                Ok(AcquisitionReport { reason, stats: self.stats })
            }
            (Err(e), cleanup) => {
                if let Err(cleanup_err) = cleanup {
                    error!(error = %cleanup_err, "shutdown after failure also failed");
                }
                Err(e)
            }
            (Ok(_), Err(e)) => Err(e),
        }
    }

    /// Run on a dedicated thread
    pub fn spawn(self) -> Result<JoinHandle<Result<AcquisitionReport>>>
    where
        S: 'static,
    {
        Ok(thread::Builder::new()
            .name("emg-acquisition".to_string())
            .spawn(move || self.run())?)
    }

    fn poll_until_stopped(&mut self) -> Result<StopReason> {
        let mut in_session = false;
        loop {
            if self.control.is_terminated() {
                return Ok(StopReason::Terminated);
            }

            if !self.control.is_polling() {
                if in_session {
                    self.end_session()?;
                    in_session = false;
                }
                self.control.wait_for_change(false, self.idle_drain);
                if !self.control.is_polling() && !self.control.is_terminated() {
                    self.drain_input()?;
                }
                continue;
            }

            if !in_session {
                self.begin_session()?;
                in_session = true;
            }

            match self.parser.next_frame(&mut self.source) {
                Ok(Some(frame)) => self.handle_frame(&frame)?,
                Ok(None) => {}
                Err(EmgError::StreamClosed) => {
                    info!(source = %self.source.describe(), "byte stream closed");
                    return Ok(StopReason::StreamClosed);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn begin_session(&mut self) -> Result<()> {
        self.source.clear_input()?;
        self.parser.reset();
        self.gaps.reset();
        let ids: Vec<&str> = self.channels.iter().map(|c| c.id()).collect();
        self.session = RecordingSession::open(
            self.recording.mode,
            &self.recording.directory,
            &ids,
            &self.cue,
        )?;
        self.stats.sessions += 1;
        debug!(session = self.stats.sessions, "polling session started");
        Ok(())
    }

    fn end_session(&mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            self.stats.recorded_rows += session.finish()?;
        }
        Ok(())
    }

    fn drain_input(&mut self) -> Result<()> {
        match self.source.clear_input() {
            Ok(()) => {
                self.stats.idle_drains += 1;
                Ok(())
            }
            Err(e) if is_transient(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn handle_frame(&mut self, frame: &Frame) -> Result<()> {
        self.stats.frames += 1;

        let mut gap = self.gaps.observe(frame.sequence);
        if gap == 0 {
            self.stats.duplicate_frames += 1;
            warn!(sequence = frame.sequence, "repeated sequence number");
            gap = 1;
        } else if gap > 1 {
            self.stats.dropped_samples += (gap - 1) as u64;
            debug!(sequence = frame.sequence, missed = gap - 1, "device samples dropped");
        }
        let dispatch_gap = if self.interpolate_gaps { gap } else { 1 };

        let mut values = [0.0; CHANNEL_COUNT];
        for (value, channel) in values.iter_mut().zip(&self.channels) {
            *value = frame
                .sample_at(channel.config().packet_index)
                .map(f64::from)
                .unwrap_or_default();
        }
        if let Some(dispatcher) = self.dispatcher.as_mut() {
            dispatcher.dispatch(&values, dispatch_gap);
        }

        if let Some(session) = self.session.as_mut() {
            // Newest outputs; a worker may still be behind this frame
            let filtered: [f64; CHANNEL_COUNT] =
                std::array::from_fn(|slot| self.channels[slot].latest().1);
            session.record(frame, &filtered)?;
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        let session = self.end_session();
        if let Err(e) = self.source.close() {
            warn!(error = %e, "closing byte source failed");
        }
        self.control.terminate();
        self.stats.bytes_skipped = self.parser.bytes_skipped();
        let workers = match self.dispatcher.take() {
            Some(dispatcher) => {
                self.stats.dispatch = dispatcher.stats();
                dispatcher.shutdown()
            }
            None => Ok(()),
        };
        session.and(workers)
    }
}
