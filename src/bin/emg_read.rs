// src/bin/emg_read.rs
//! Headless EMG reader
//!
//! Loads the configuration, opens the serial port (or the simulated board),
//! starts polling and logs threshold detections as they change. In
//! calibration recording mode it also walks the default calibration patterns,
//! raising each pattern's cue flags, and stops once all are done.

use clap::Parser;
use olimex_emg::acquisition::{AcquisitionControl, AcquisitionLoop};
use olimex_emg::config::{ConfigLoader, RecordingMode, SourceKind, SystemConfig};
use olimex_emg::detection::{default_patterns, ThresholdDetector};
use olimex_emg::hal::{list_ports, ByteSource, SerialByteSource, SimulatedBoard, SimulatorConfig};
use olimex_emg::output::{CalibrationCue, DisplayRefresher, NullSink};
use olimex_emg::Result;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "emg-read", author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file; defaults apply when omitted
    config: Option<PathBuf>,

    /// Stop after this many seconds
    #[arg(long)]
    seconds: Option<u64>,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,
}

fn open_source(config: &SystemConfig) -> Result<Box<dyn ByteSource>> {
    Ok(match config.acquisition.source {
        SourceKind::Serial => Box::new(SerialByteSource::open(&config.serial)?),
        SourceKind::Simulated => Box::new(SimulatedBoard::new(SimulatorConfig {
            sample_rate_hz: config.acquisition.sample_rate_hz,
            mains_freq_hz: config.filter.mains_freq_hz,
            ..Default::default()
        })),
    })
}

/// Sleep until `deadline`; false if terminated first
fn hold_until(control: &AcquisitionControl, deadline: Instant) -> bool {
    loop {
        if control.is_terminated() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        control.wait_for_change(control.is_polling(), deadline - now);
    }
}

/// Prompt every calibration pattern in turn, then end the run
fn drive_calibration(
    ids: Vec<String>,
    cue: CalibrationCue,
    control: AcquisitionControl,
) -> Result<JoinHandle<()>> {
    Ok(thread::Builder::new()
        .name("emg-calibration".to_string())
        .spawn(move || {
            let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
            let patterns = default_patterns(&ids);
            for (n, pattern) in patterns.iter().enumerate() {
                let slots = pattern.cue_slots(&ids);
                info!(
                    pattern = n + 1,
                    of = patterns.len(),
                    primary = ?pattern.primary,
                    secondary = ?pattern.secondary,
                    "calibration pattern"
                );
                for step in pattern.schedule() {
                    if step.active {
                        cue.set_active(&slots);
                    } else {
                        cue.clear();
                    }
                    if !hold_until(&control, Instant::now() + step.duration) {
                        cue.clear();
                        return;
                    }
                }
            }
            cue.clear();
            info!("calibration complete");
            control.terminate();
        })?)
}

fn run(args: Args) -> Result<()> {
    if args.list_ports {
        for port in list_ports()? {
            match port.usb_product {
                Some(product) => println!("{}\t{}", port.name, product),
                None => println!("{}", port.name),
            }
        }
        return Ok(());
    }

    let loader = match &args.config {
        Some(path) => ConfigLoader::with_file(path),
        None => ConfigLoader::new(),
    };
    let config = loader.load()?;

    // Port failures are fatal before any thread starts
    let source = open_source(&config)?;
    let control = AcquisitionControl::new();
    let acquisition = AcquisitionLoop::new(&config, source, Arc::new(NullSink), control.clone())?;

    let detector = ThresholdDetector::from_config(&config.detection);
    let mut active = [false; olimex_emg::config::CHANNEL_COUNT];
    let refresher = DisplayRefresher::spawn(
        acquisition.channels().clone(),
        control.clone(),
        Duration::from_millis(config.display.refresh_interval_ms),
        move |snapshots| {
            for (slot, snapshot) in snapshots.iter().enumerate() {
                let detection = detector.evaluate_snapshot(snapshot);
                if detection.active != active[slot] {
                    active[slot] = detection.active;
                    info!(
                        channel = %snapshot.name,
                        active = detection.active,
                        peak_to_peak = detection.peak_to_peak,
                        "detection changed"
                    );
                }
            }
        },
    )?;

    let calibration = if config.recording.mode == RecordingMode::Calibration {
        let ids = acquisition.channels().iter().map(|c| c.id().to_string()).collect();
        Some(drive_calibration(ids, acquisition.calibration_cue().clone(), control.clone())?)
    } else {
        None
    };

    let handle = acquisition.spawn()?;
    control.start_polling();

    if let Some(seconds) = args.seconds {
        let stop = control.clone();
        thread::spawn(move || {
            if hold_until(&stop, Instant::now() + Duration::from_secs(seconds)) {
                stop.terminate();
            }
        });
    }

    let report = handle
        .join()
        .map_err(|_| olimex_emg::EmgError::WorkerPanicked("emg-acquisition".to_string()))?;
    control.terminate();
    refresher.join()?;
    if let Some(calibration) = calibration {
        calibration
            .join()
            .map_err(|_| olimex_emg::EmgError::WorkerPanicked("emg-calibration".to_string()))?;
    }

    let report = report?;
    info!(
        reason = ?report.reason,
        frames = report.stats.frames,
        dropped = report.stats.dropped_samples,
        overruns = report.stats.dispatch.overruns,
        "done"
    );
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "emg-read failed");
            ExitCode::FAILURE
        }
    }
}
