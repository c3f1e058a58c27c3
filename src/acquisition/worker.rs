// src/acquisition/worker.rs
//! Per-channel worker threads and the dispatcher feeding them
//!
//! Each channel gets its own thread and a bounded queue, so a slow filter
//! never blocks the serial reader. Samples are queued in frame order and each
//! worker processes its queue strictly in order.

use crate::acquisition::channel::Channel;
use crate::acquisition::control::AcquisitionControl;
use crate::config::constants::timing::WORKER_POLL_INTERVAL_MS;
use crate::error::{EmgError, Result};
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// One pending value for a worker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dispatch {
    pub value: f64,
    /// Device ticks since the previous value; 1 means no samples missed
    pub gap: u32,
}

/// Handle to one running channel worker
#[derive(Debug)]
pub struct ChannelWorker {
    name: String,
    sender: Option<Sender<Dispatch>>,
    handle: Option<JoinHandle<()>>,
}

impl ChannelWorker {
    /// Spawn the worker thread for `channel`
    pub fn spawn(
        channel: Arc<Channel>,
        control: AcquisitionControl,
        queue_depth: usize,
    ) -> Result<Self> {
        let (sender, receiver) = bounded(queue_depth.max(1));
        let name = format!("emg-worker-{}", channel.id());
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_worker(channel, receiver, control))?;
        Ok(Self {
            name,
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn try_send(&self, dispatch: Dispatch) -> std::result::Result<(), TrySendError<Dispatch>> {
        match &self.sender {
            Some(sender) => sender.try_send(dispatch),
            None => Err(TrySendError::Disconnected(dispatch)),
        }
    }

    /// Close the queue; the worker drains what is left, then exits
    fn close(&mut self) {
        self.sender.take();
    }

    fn join(&mut self) -> Result<()> {
        self.close();
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| EmgError::WorkerPanicked(self.name.clone())),
            None => Ok(()),
        }
    }
}

fn run_worker(channel: Arc<Channel>, receiver: Receiver<Dispatch>, control: AcquisitionControl) {
    debug!(channel = %channel.id(), "worker started");
    let poll = Duration::from_millis(WORKER_POLL_INTERVAL_MS);
    loop {
        match receiver.recv_timeout(poll) {
            Ok(dispatch) => {
                channel.ingest(dispatch.value, dispatch.gap);
            }
            Err(RecvTimeoutError::Timeout) => {
                if control.is_terminated() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!(
        channel = %channel.id(),
        processed = channel.samples_processed(),
        "worker exited"
    );
}

/// Counters kept by the [`Dispatcher`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Values handed to a worker queue
    pub dispatched: u64,
    /// Values dropped because a worker queue was full
    pub overruns: u64,
}

/// Fans values out to one worker per channel
#[derive(Debug)]
pub struct Dispatcher {
    workers: Vec<ChannelWorker>,
    /// Values each worker missed since its last accepted dispatch
    missed: Vec<u32>,
    interpolate_gaps: bool,
    stats: DispatchStats,
}

impl Dispatcher {
    /// Spawn one worker per channel, in channel order
    pub fn spawn(
        channels: &[Arc<Channel>],
        control: &AcquisitionControl,
        queue_depth: usize,
        interpolate_gaps: bool,
    ) -> Result<Self> {
        let mut workers = Vec::with_capacity(channels.len());
        for channel in channels {
            match ChannelWorker::spawn(channel.clone(), control.clone(), queue_depth) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    // Do not leak the workers already running
                    for mut worker in workers {
                        if let Err(join_error) = worker.join() {
                            warn!(error = %join_error, "worker join failed during rollback");
                        }
                    }
                    return Err(e);
                }
            }
        }
        info!(workers = workers.len(), queue_depth, "channel workers started");
        Ok(Self {
            missed: vec![0; workers.len()],
            workers,
            interpolate_gaps,
            stats: DispatchStats::default(),
        })
    }

    /// Queue `values[i]` for worker `i`
    ///
    /// Never blocks. A full queue drops the value and counts an overrun; with
    /// gap interpolation on, the dropped ticks widen the next gap instead.
    pub fn dispatch(&mut self, values: &[f64], gap: u32) {
        let targets = self.workers.iter().zip(self.missed.iter_mut());
        for ((worker, missed), &value) in targets.zip(values) {
            // Ticks since this worker's last accepted value
            let ticks = gap.max(1).saturating_add(*missed);
            let gap = if self.interpolate_gaps { ticks } else { 1 };
            match worker.try_send(Dispatch { value, gap }) {
                Ok(()) => {
                    *missed = 0;
                    self.stats.dispatched += 1;
                }
                Err(TrySendError::Full(_)) => {
                    *missed = ticks;
                    self.stats.overruns += 1;
                    warn!(worker = %worker.name(), "worker queue full, value dropped");
                }
                Err(TrySendError::Disconnected(_)) => {
                    self.stats.overruns += 1;
                    error!(worker = %worker.name(), "worker queue disconnected");
                }
            }
        }
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Close every queue and join every worker
    ///
    /// Queued values are still processed. Reports the first panicked worker.
    pub fn shutdown(mut self) -> Result<()> {
        self.join_all()
    }

    fn join_all(&mut self) -> Result<()> {
        for worker in &mut self.workers {
            worker.close();
        }
        let mut first_error = None;
        for worker in &mut self.workers {
            if let Err(e) = worker.join() {
                error!(error = %e, "worker join failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        let _ = self.join_all();
    }
}
