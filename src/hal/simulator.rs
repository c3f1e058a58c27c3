// src/hal/simulator.rs
//! Byte sources that do not need hardware
//!
//! [`MemorySource`] replays (or is fed) raw bytes, [`SimulatedBoard`]
//! synthesizes a realistic frame stream: muscle activity bursts on top of a
//! mid-scale baseline, mains hum and a little noise.

use crate::config::constants::{protocol, signal};
use crate::hal::protocol::Frame;
use crate::hal::traits::ByteSource;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::f64::consts::PI;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct MemoryInner {
    bytes: VecDeque<u8>,
    closed: bool,
}

/// In-memory byte source, useful for tests and replaying captures
#[derive(Debug, Clone)]
pub struct MemorySource {
    inner: Arc<Mutex<MemoryInner>>,
    idle_wait: Duration,
}

/// Handle that appends bytes to a [`MemorySource`] from another thread
#[derive(Debug, Clone)]
pub struct MemoryFeed {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemorySource {
    /// Source that yields `bytes` and then reports end of stream
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        let source = Self::open();
        {
            let mut inner = source.inner.lock();
            inner.bytes.extend(bytes.into());
            inner.closed = true;
        }
        source
    }

    /// Empty source that stays open until its feed closes it
    pub fn open() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryInner::default())),
            idle_wait: Duration::from_millis(1),
        }
    }

    pub fn feed(&self) -> MemoryFeed {
        MemoryFeed { inner: self.inner.clone() }
    }

    pub fn pending(&self) -> usize {
        self.inner.lock().bytes.len()
    }
}

impl MemoryFeed {
    pub fn push(&self, bytes: &[u8]) {
        self.inner.lock().bytes.extend(bytes.iter().copied());
    }

    pub fn push_frame(&self, frame: &Frame) {
        self.push(&frame.encode());
    }

    /// Mark end of stream; buffered bytes are still delivered
    pub fn close(&self) {
        self.inner.lock().closed = true;
    }
}

impl ByteSource for MemorySource {
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock();
        if inner.bytes.is_empty() {
            if inner.closed {
                return Ok(0);
            }
            drop(inner);
            thread::sleep(self.idle_wait);
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no bytes buffered"));
        }
        let n = buf.len().min(inner.bytes.len());
        for (slot, byte) in buf.iter_mut().zip(inner.bytes.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.inner.lock().bytes.clear();
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Parameters of the synthetic board
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub sample_rate_hz: u32,
    pub mains_freq_hz: f64,
    /// Peak amplitude of the mains hum, in ADC counts
    pub hum_amplitude: f64,
    /// Peak amplitude of an activity burst, in ADC counts
    pub activity_amplitude: f64,
    pub noise_amplitude: f64,
    /// Seconds between burst onsets; each burst lasts half the period
    pub burst_period_secs: f64,
    /// Sleep so frames arrive at the real sample rate
    pub paced: bool,
    /// Close the stream after this many frames
    pub frame_limit: Option<u64>,
    /// Skip a sequence number every N frames to exercise gap handling
    pub drop_every: Option<u64>,
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: signal::DEFAULT_SAMPLING_RATE_HZ,
            mains_freq_hz: 50.0,
            hum_amplitude: 60.0,
            activity_amplitude: 250.0,
            noise_amplitude: 4.0,
            burst_period_secs: 2.0,
            paced: true,
            frame_limit: None,
            drop_every: None,
            seed: 0x0E_4D_47,
        }
    }
}

/// Synthetic acquisition board speaking the shield's wire protocol
pub struct SimulatedBoard {
    config: SimulatorConfig,
    rng: StdRng,
    pending: VecDeque<u8>,
    tick: u64,
    frames_sent: u64,
    sequence: u8,
    started: Instant,
}

impl SimulatedBoard {
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            pending: VecDeque::new(),
            tick: 0,
            frames_sent: 0,
            sequence: 0,
            started: Instant::now(),
        }
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Produce the next frame of synthetic data
    pub fn next_frame(&mut self) -> Frame {
        let rate = self.config.sample_rate_hz.max(1) as f64;
        let t = self.tick as f64 / rate;
        let mut samples = [0u16; signal::CHANNEL_COUNT];
        for (ch, sample) in samples.iter_mut().enumerate() {
            // Channels burst in turn
            let phase = (t / self.config.burst_period_secs + ch as f64 * 0.25).fract();
            let active = phase < 0.5;
            let activity = if active {
                self.config.activity_amplitude * (2.0 * PI * 80.0 * t + ch as f64).sin()
            } else {
                0.0
            };
            let hum = self.config.hum_amplitude * (2.0 * PI * self.config.mains_freq_hz * t).sin();
            let noise = if self.config.noise_amplitude > 0.0 {
                self.rng.gen_range(-self.config.noise_amplitude..self.config.noise_amplitude)
            } else {
                0.0
            };
            let value = 512.0 + activity + hum + noise;
            *sample = value.round().clamp(0.0, signal::ADC_MAX as f64) as u16;
        }

        if let Some(every) = self.config.drop_every {
            if every > 0 && self.tick > 0 && self.tick % every == 0 {
                self.sequence = self.sequence.wrapping_add(1);
            }
        }
        let frame = Frame {
            counter: (self.tick % protocol::SEQUENCE_MODULUS as u64) as u8,
            sequence: self.sequence,
            samples,
        };
        self.sequence = self.sequence.wrapping_add(1);
        self.tick += 1;
        frame
    }

    fn pace(&self) {
        if !self.config.paced {
            return;
        }
        let rate = self.config.sample_rate_hz.max(1) as f64;
        let due = Duration::from_secs_f64(self.frames_sent as f64 / rate);
        let elapsed = self.started.elapsed();
        if due > elapsed {
            thread::sleep(due - elapsed);
        }
    }
}

impl ByteSource for SimulatedBoard {
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            if self.config.frame_limit.is_some_and(|limit| self.frames_sent >= limit) {
                return Ok(0);
            }
            self.pace();
            let frame = self.next_frame();
            self.pending.extend(frame.encode());
            self.frames_sent += 1;
        }
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.pending.clear();
        Ok(())
    }

    fn describe(&self) -> String {
        format!("simulated board @ {} Hz", self.config.sample_rate_hz)
    }
}
