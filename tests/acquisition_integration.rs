// tests/acquisition_integration.rs
//! End-to-end acquisition: bytes in, filtered channel histories out

use olimex_emg::acquisition::{AcquisitionControl, AcquisitionLoop, StopReason};
use olimex_emg::config::{RecordingMode, SystemConfig};
use olimex_emg::hal::{ByteSource, Frame, MemorySource};
use olimex_emg::output::{NullSink, QueueSink};
use olimex_emg::EmgError;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Replays bytes; input clears are counted but keep the script intact
struct ScriptedSource {
    inner: MemorySource,
    clears: Arc<AtomicUsize>,
}

impl ScriptedSource {
    fn new(frames: &[Frame]) -> (Self, Arc<AtomicUsize>) {
        let bytes: Vec<u8> = frames.iter().flat_map(|f| f.encode()).collect();
        let clears = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner: MemorySource::new(bytes),
                clears: clears.clone(),
            },
            clears,
        )
    }
}

impl ByteSource for ScriptedSource {
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read_bytes(buf)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

fn test_config() -> SystemConfig {
    let mut config = SystemConfig::default();
    config.acquisition.history_length = 64;
    config.acquisition.worker_queue_depth = 4096;
    config.acquisition.raw_output = true;
    config.spectrum.enabled = false;
    config.detection.window_samples = 16;
    config
}

fn build_loop<S: ByteSource>(
    config: &SystemConfig,
    source: S,
    control: &AcquisitionControl,
) -> AcquisitionLoop<S> {
    AcquisitionLoop::new(config, source, Arc::new(NullSink), control.clone()).unwrap()
}

fn frame(sequence: u8, base: u16) -> Frame {
    Frame {
        counter: sequence,
        sequence,
        samples: [base, base + 1, base + 2, base + 3],
    }
}

#[test]
fn test_frames_reach_every_channel() {
    let frames: Vec<Frame> = (0..50u8).map(|i| frame(i, i as u16 * 10)).collect();
    let (source, clears) = ScriptedSource::new(&frames);
    let (sink, rx) = QueueSink::bounded(1024);
    let control = AcquisitionControl::new();

    let acquisition =
        AcquisitionLoop::new(&test_config(), source, Arc::new(sink), control.clone()).unwrap();
    let channels = acquisition.channels().clone();
    control.start_polling();
    let report = acquisition.run().unwrap();

    assert_eq!(report.reason, StopReason::StreamClosed);
    assert_eq!(report.stats.frames, 50);
    assert_eq!(report.stats.dropped_samples, 0);
    assert_eq!(report.stats.dispatch.dispatched, 200);
    assert_eq!(report.stats.dispatch.overruns, 0);
    assert_eq!(clears.load(Ordering::SeqCst), 1);

    for (slot, channel) in channels.iter().enumerate() {
        assert_eq!(channel.samples_processed(), 50);
        let expected = 490.0 + slot as f64;
        assert_eq!(channel.latest(), (expected, expected));
        let snapshot = channel.snapshot();
        assert_eq!(snapshot.raw.len(), 64);
        assert_eq!(snapshot.filtered.len(), 64);
    }
    assert_eq!(channels[0].id(), "fi_ext");
    assert_eq!(channels[3].id(), "th_add");
    assert_eq!(rx.try_iter().count(), 200);
}

#[test]
fn test_gap_interpolation_spreads_missing_samples() {
    let mut config = test_config();
    config.acquisition.interpolate_gaps = true;
    let (source, _) = ScriptedSource::new(&[frame(10, 100), frame(13, 400)]);
    let control = AcquisitionControl::new();

    let acquisition = build_loop(&config, source, &control);
    let channels = acquisition.channels().clone();
    control.start_polling();
    let report = acquisition.run().unwrap();

    assert_eq!(report.stats.dropped_samples, 2);
    let snapshot = channels[0].snapshot();
    assert_eq!(channels[0].samples_processed(), 4);
    assert_eq!(&snapshot.raw[..4], &[400.0, 300.0, 200.0, 100.0]);
}

#[test]
fn test_gap_forced_to_one_by_default() {
    let (source, _) = ScriptedSource::new(&[frame(254, 100), frame(1, 400)]);
    let control = AcquisitionControl::new();

    let acquisition = build_loop(&test_config(), source, &control);
    let channels = acquisition.channels().clone();
    control.start_polling();
    let report = acquisition.run().unwrap();

    // 254 -> 1 wraps: two ticks missed, but only the received values are processed
    assert_eq!(report.stats.dropped_samples, 2);
    assert_eq!(channels[1].samples_processed(), 2);
    assert_eq!(&channels[1].snapshot().raw[..2], &[401.0, 101.0]);
}

#[test]
fn test_repeated_sequence_counted_as_duplicate() {
    let (source, _) = ScriptedSource::new(&[frame(7, 1), frame(7, 2), frame(8, 3)]);
    let control = AcquisitionControl::new();
    let acquisition = build_loop(&test_config(), source, &control);
    control.start_polling();
    let report = acquisition.run().unwrap();
    assert_eq!(report.stats.frames, 3);
    assert_eq!(report.stats.duplicate_frames, 1);
    assert_eq!(report.stats.dropped_samples, 0);
}

#[test]
fn test_terminate_while_idle() {
    let mut config = test_config();
    config.acquisition.idle_drain_interval_ms = 10;
    let control = AcquisitionControl::new();
    let acquisition = build_loop(&config, MemorySource::open(), &control);
    let handle = acquisition.spawn().unwrap();

    std::thread::sleep(Duration::from_millis(50));
    control.terminate();
    let report = handle.join().unwrap().unwrap();
    assert_eq!(report.reason, StopReason::Terminated);
    assert_eq!(report.stats.frames, 0);
    assert_eq!(report.stats.sessions, 0);
    assert!(report.stats.idle_drains >= 1);
}

#[test]
fn test_live_feed_then_terminate() {
    let control = AcquisitionControl::new();
    let source = MemorySource::open();
    let feed = source.feed();
    let acquisition = build_loop(&test_config(), source, &control);
    let channels = acquisition.channels().clone();
    let handle = acquisition.spawn().unwrap();

    control.start_polling();
    // Give the loop time to open its session (which clears pending input)
    std::thread::sleep(Duration::from_millis(100));
    for i in 0..20u8 {
        feed.push_frame(&frame(i, 500));
    }
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while channels[2].samples_processed() < 20 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    control.terminate();
    let report = handle.join().unwrap().unwrap();

    assert_eq!(report.reason, StopReason::Terminated);
    assert_eq!(report.stats.frames, 20);
    assert_eq!(channels[2].latest().0, 502.0);
}

#[test]
fn test_raw_recording_written() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config();
    config.recording.mode = RecordingMode::Raw;
    config.recording.directory = dir.path().to_path_buf();

    let (source, _) = ScriptedSource::new(&[frame(1, 10), frame(2, 20), frame(3, 30)]);
    let control = AcquisitionControl::new();
    let acquisition = build_loop(&config, source, &control);
    control.start_polling();
    let report = acquisition.run().unwrap();
    assert_eq!(report.stats.recorded_rows, 3);

    let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().map(|e| e.unwrap().path()).collect();
    assert_eq!(files.len(), 1);
    let text = std::fs::read_to_string(&files[0]).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "RAW DATA ONLY");
    assert_eq!(lines[1], "OCRval,count,Ch0,Ch1,Ch2,Ch3");
    assert_eq!(lines[2], "1,1,10,11,12,13");
    assert_eq!(lines.len(), 5);
}

#[test]
fn test_invalid_filter_is_fatal_at_construction() {
    let mut config = test_config();
    config.filter.order = 0;
    let control = AcquisitionControl::new();
    let source = MemorySource::new(Vec::new());
    let err = AcquisitionLoop::new(&config, source, Arc::new(NullSink), control)
        .err()
        .unwrap();
    assert!(matches!(err, EmgError::InvalidFilterSpec(_)));
}

#[test]
fn test_start_polling_wakes_idle_loop() {
    let mut config = test_config();
    // Only a control change can wake the idle loop within the test deadline
    config.acquisition.idle_drain_interval_ms = 60_000;
    let control = AcquisitionControl::new();
    let source = MemorySource::open();
    let feed = source.feed();
    let acquisition = build_loop(&config, source, &control);
    let channels = acquisition.channels().clone();
    let handle = acquisition.spawn().unwrap();

    std::thread::sleep(Duration::from_millis(50));
    control.start_polling();
    std::thread::sleep(Duration::from_millis(100));
    feed.push_frame(&frame(1, 700));
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while channels[0].samples_processed() < 1 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    control.terminate();
    let report = handle.join().unwrap().unwrap();

    assert_eq!(report.stats.frames, 1);
    assert_eq!(channels[0].latest().0, 700.0);
}
