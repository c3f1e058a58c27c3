// src/output/recorder.rs
//! CSV recording of received frames
//!
//! Two layouts exist. Raw mode writes the decoded frame as is:
//!
//! ```text
//! RAW DATA ONLY
//! OCRval,count,Ch0,Ch1,Ch2,Ch3
//! 1,5,16,32,48,832
//! ```
//!
//! Calibration mode writes a two-row header naming each channel's
//! raw/filtered/flag triplet, then per frame
//! `counter,sequence,(raw,filtered,flag) x 4`.

use crate::config::constants::signal::CHANNEL_COUNT;
use crate::config::RecordingMode;
use crate::error::{EmgError, Result};
use crate::hal::protocol::Frame;
use chrono::Local;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Per-channel calibration flags, raised by whoever drives the calibration
/// prompts and sampled into every calibration row
#[derive(Debug, Clone, Default)]
pub struct CalibrationCue {
    flags: Arc<[AtomicBool; CHANNEL_COUNT]>,
}

impl CalibrationCue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, slot: usize, active: bool) {
        if let Some(flag) = self.flags.get(slot) {
            flag.store(active, Ordering::Relaxed);
        }
    }

    /// Raise exactly the flags in `slots`
    pub fn set_active(&self, slots: &[usize]) {
        for (slot, flag) in self.flags.iter().enumerate() {
            flag.store(slots.contains(&slot), Ordering::Relaxed);
        }
    }

    pub fn clear(&self) {
        self.set_active(&[]);
    }

    pub fn flags(&self) -> [bool; CHANNEL_COUNT] {
        std::array::from_fn(|slot| self.flags[slot].load(Ordering::Relaxed))
    }
}

#[derive(Debug)]
enum Layout {
    Raw,
    Calibration(CalibrationCue),
}

/// Writes one row per frame to a CSV stream
pub struct CsvRecorder<W: Write> {
    writer: csv::Writer<W>,
    layout: Layout,
    rows: u64,
}

impl<W: Write> CsvRecorder<W> {
    /// Raw layout; writes the header immediately
    pub fn raw(sink: W) -> Result<Self> {
        let mut writer = Self::writer(sink);
        writer.write_record(["RAW DATA ONLY"])?;
        let mut header = vec!["OCRval".to_string(), "count".to_string()];
        header.extend((0..CHANNEL_COUNT).map(|ch| format!("Ch{ch}")));
        writer.write_record(&header)?;
        Ok(Self { writer, layout: Layout::Raw, rows: 0 })
    }

    /// Calibration layout for channels named `ids` (packet order)
    pub fn calibration(sink: W, ids: &[&str], cue: CalibrationCue) -> Result<Self> {
        if ids.len() != CHANNEL_COUNT {
            return Err(EmgError::Recording(format!(
                "calibration layout needs {} channel ids, got {}",
                CHANNEL_COUNT,
                ids.len()
            )));
        }
        let mut writer = Self::writer(sink);
        let mut names = vec![String::new(), String::new()];
        let mut fields = vec!["OCRval".to_string(), "count".to_string()];
        for id in ids {
            for field in ["raw", "filtered", "cal"] {
                names.push(id.to_string());
                fields.push(field.to_string());
            }
        }
        writer.write_record(&names)?;
        writer.write_record(&fields)?;
        Ok(Self {
            writer,
            layout: Layout::Calibration(cue),
            rows: 0,
        })
    }

    fn writer(sink: W) -> csv::Writer<W> {
        csv::WriterBuilder::new()
            .flexible(true)
            .has_headers(false)
            .from_writer(sink)
    }

    /// Append one frame; `filtered` holds each channel's newest output
    pub fn record(&mut self, frame: &Frame, filtered: &[f64; CHANNEL_COUNT]) -> Result<()> {
        let mut row = vec![frame.counter.to_string(), frame.sequence.to_string()];
        match &self.layout {
            Layout::Raw => {
                row.extend(frame.samples.iter().map(|s| s.to_string()));
            }
            Layout::Calibration(cue) => {
                let flags = cue.flags();
                for slot in 0..CHANNEL_COUNT {
                    row.push(frame.samples[slot].to_string());
                    row.push(filtered[slot].to_string());
                    row.push(u8::from(flags[slot]).to_string());
                }
            }
        }
        self.writer.write_record(&row)?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and hand back the underlying writer
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| EmgError::Recording(e.to_string()))
    }
}

/// A recorder writing to a timestamped file
pub struct RecordingSession {
    recorder: CsvRecorder<File>,
    path: PathBuf,
}

impl RecordingSession {
    /// Open a session for `mode`; `Ok(None)` when recording is off
    pub fn open(
        mode: RecordingMode,
        directory: &Path,
        ids: &[&str],
        cue: &CalibrationCue,
    ) -> Result<Option<Self>> {
        let tag = match mode {
            RecordingMode::Off => return Ok(None),
            RecordingMode::Raw => "raw",
            RecordingMode::Calibration => "calibration",
        };
        fs::create_dir_all(directory).map_err(|e| {
            EmgError::Recording(format!("cannot create {}: {e}", directory.display()))
        })?;
        let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S%.3f");
        let path = directory.join(format!("emg_{tag}_{timestamp}.csv"));
        let file = File::create(&path)
            .map_err(|e| EmgError::Recording(format!("cannot create {}: {e}", path.display())))?;

        let recorder = match mode {
            RecordingMode::Calibration => CsvRecorder::calibration(file, ids, cue.clone())?,
            _ => CsvRecorder::raw(file)?,
        };
        info!(path = %path.display(), mode = tag, "recording started");
        Ok(Some(Self { recorder, path }))
    }

    pub fn record(&mut self, frame: &Frame, filtered: &[f64; CHANNEL_COUNT]) -> Result<()> {
        self.recorder.record(frame, filtered)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and close the file, returning the rows written
    pub fn finish(mut self) -> Result<u64> {
        self.recorder.flush()?;
        let rows = self.recorder.rows();
        info!(path = %self.path.display(), rows, "recording finished");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Frame {
        Frame { counter: 1, sequence: 5, samples: [16, 32, 48, 832] }
    }

    #[test]
    fn test_raw_layout() {
        let mut recorder = CsvRecorder::raw(Vec::new()).unwrap();
        recorder.record(&frame(), &[0.0; 4]).unwrap();
        let text = String::from_utf8(recorder.into_inner().unwrap()).unwrap();
        assert_eq!(text, "RAW DATA ONLY\nOCRval,count,Ch0,Ch1,Ch2,Ch3\n1,5,16,32,48,832\n");
    }

    #[test]
    fn test_calibration_layout() {
        let cue = CalibrationCue::new();
        cue.set_active(&[1]);
        let mut recorder =
            CsvRecorder::calibration(Vec::new(), &["a", "b", "c", "d"], cue).unwrap();
        recorder.record(&frame(), &[1.5, 2.5, 3.5, 4.5]).unwrap();
        let text = String::from_utf8(recorder.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], ",,a,a,a,b,b,b,c,c,c,d,d,d");
        assert!(lines[1].starts_with("OCRval,count,raw,filtered,cal,raw"));
        assert_eq!(lines[2], "1,5,16,1.5,0,32,2.5,1,48,3.5,0,832,4.5,0");
    }

    #[test]
    fn test_calibration_needs_four_ids() {
        let err = CsvRecorder::calibration(Vec::new(), &["a"], CalibrationCue::new())
            .err()
            .unwrap();
        assert!(matches!(err, EmgError::Recording(_)));
    }

    #[test]
    fn test_cue_flags() {
        let cue = CalibrationCue::new();
        cue.set(2, true);
        assert_eq!(cue.flags(), [false, false, true, false]);
        cue.set_active(&[0, 3]);
        assert_eq!(cue.flags(), [true, false, false, true]);
        cue.clear();
        assert_eq!(cue.flags(), [false; 4]);
    }
}
