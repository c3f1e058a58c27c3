// src/output/sink.rs
//! Output sinks receiving every processed sample

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};

/// Receiver of processed samples
///
/// Called from a channel worker for every sample; implementations must not
/// block for long.
pub trait SampleSink: Send + Sync {
    fn push(&self, channel_id: &str, raw: f64, filtered: f64);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl SampleSink for NullSink {
    fn push(&self, _channel_id: &str, _raw: f64, _filtered: f64) {}
}

/// One processed sample as delivered by [`QueueSink`]
#[derive(Debug, Clone, PartialEq)]
pub struct SinkSample {
    pub channel_id: String,
    pub raw: f64,
    pub filtered: f64,
}

/// Forwards samples into a bounded queue, dropping when the reader lags
pub struct QueueSink {
    sender: Sender<SinkSample>,
    dropped: AtomicU64,
}

impl QueueSink {
    pub fn bounded(capacity: usize) -> (Self, Receiver<SinkSample>) {
        let (sender, receiver) = bounded(capacity);
        (
            Self {
                sender,
                dropped: AtomicU64::new(0),
            },
            receiver,
        )
    }

    /// Samples lost because the queue was full or the reader went away
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl SampleSink for QueueSink {
    fn push(&self, channel_id: &str, raw: f64, filtered: f64) {
        let sample = SinkSample {
            channel_id: channel_id.to_string(),
            raw,
            filtered,
        };
        match self.sender.try_send(sample) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_sink_delivers_in_order() {
        let (sink, rx) = QueueSink::bounded(4);
        sink.push("a", 1.0, 0.5);
        sink.push("a", 2.0, 1.5);
        assert_eq!(rx.try_recv().unwrap().raw, 1.0);
        assert_eq!(rx.try_recv().unwrap().filtered, 1.5);
    }

    #[test]
    fn test_queue_sink_counts_overflow() {
        let (sink, _rx) = QueueSink::bounded(1);
        sink.push("a", 1.0, 1.0);
        sink.push("a", 2.0, 2.0);
        sink.push("a", 3.0, 3.0);
        assert_eq!(sink.dropped(), 2);
    }
}
