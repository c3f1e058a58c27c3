// src/output/display.rs
//! Periodic snapshot delivery for a display layer
//!
//! The refresher reads every channel at a fixed wall-clock cadence. Channels
//! are copied one after the other, so a snapshot set may be torn by a sample
//! between channels.

use crate::acquisition::channel::{Channel, ChannelSnapshot};
use crate::acquisition::control::AcquisitionControl;
use crate::config::constants::signal::CHANNEL_COUNT;
use crate::error::{EmgError, Result};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

/// Copy the current state of every channel
pub fn snapshot_all(channels: &[Arc<Channel>; CHANNEL_COUNT]) -> [ChannelSnapshot; CHANNEL_COUNT] {
    std::array::from_fn(|slot| channels[slot].snapshot())
}

/// Background thread handing snapshots to a callback
pub struct DisplayRefresher {
    handle: Option<JoinHandle<u64>>,
}

impl DisplayRefresher {
    /// Call `on_refresh` every `interval` until `control` is terminated
    pub fn spawn<F>(
        channels: [Arc<Channel>; CHANNEL_COUNT],
        control: AcquisitionControl,
        interval: Duration,
        mut on_refresh: F,
    ) -> Result<Self>
    where
        F: FnMut(&[ChannelSnapshot; CHANNEL_COUNT]) + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name("emg-display".to_string())
            .spawn(move || {
                let mut refreshes = 0u64;
                let mut next = Instant::now();
                while !control.is_terminated() {
                    let snapshots = snapshot_all(&channels);
                    on_refresh(&snapshots);
                    refreshes += 1;

                    next += interval;
                    let mut now = Instant::now();
                    if next <= now {
                        next = now;
                    }
                    // Polling changes also wake the wait; only terminate cuts it short
                    while now < next && !control.is_terminated() {
                        control.wait_for_change(control.is_polling(), next - now);
                        now = Instant::now();
                    }
                }
                debug!(refreshes, "display refresher exited");
                refreshes
            })?;
        Ok(Self { handle: Some(handle) })
    }

    /// Wait for the thread after terminating the control; returns the number
    /// of refreshes delivered
    pub fn join(mut self) -> Result<u64> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| EmgError::WorkerPanicked("emg-display".to_string())),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelConfig;
    use crate::output::sink::NullSink;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_refresher_delivers_until_terminated() {
        let channels: [Arc<Channel>; CHANNEL_COUNT] = std::array::from_fn(|slot| {
            let mut config = ChannelConfig::with_defaults(&format!("ch{slot}"), slot as u8 + 2);
            config.history_length = 32;
            config.spectrum = None;
            Arc::new(Channel::new(config, Arc::new(NullSink)).unwrap())
        });
        let control = AcquisitionControl::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let refresher = DisplayRefresher::spawn(
            channels,
            control.clone(),
            Duration::from_millis(5),
            move |snaps| {
                assert_eq!(snaps[3].id, "ch3");
                assert_eq!(snaps[0].filtered.len(), 32);
                counter.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();

        thread::sleep(Duration::from_millis(60));
        control.terminate();
        let refreshes = refresher.join().unwrap();
        assert!(refreshes >= 2);
        assert_eq!(refreshes as usize, seen.load(Ordering::SeqCst));
    }
}
