// src/error.rs
//! Unified error handling for the acquisition core
//!
//! Every fallible operation in the crate returns [`Result`], so errors from the
//! serial layer, the filter designer and the recorders propagate with `?`
//! up to whoever started acquisition.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, EmgError>;

/// Unified error type for the EMG acquisition system
#[derive(Debug, Error)]
pub enum EmgError {
    /// Filter parameters that cannot produce a valid bandstop design
    #[error("invalid filter specification: {0}")]
    InvalidFilterSpec(String),

    /// Configuration and setup errors
    #[error("configuration error in {component}: {reason}")]
    Configuration {
        component: String,
        reason: String,
    },

    /// The serial port could not be opened
    #[error("failed to open serial port {port}: {source}")]
    Connection {
        port: String,
        #[source]
        source: serialport::Error,
    },

    /// The byte source reached end of stream
    #[error("byte stream closed")]
    StreamClosed,

    /// Read/write failure on the byte source or a file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A recording session could not be opened or written
    #[error("recording error: {0}")]
    Recording(String),

    /// CSV encoding failure while recording
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A worker thread panicked before it could be joined
    #[error("worker thread '{0}' panicked")]
    WorkerPanicked(String),
}

impl EmgError {
    /// Shorthand for a configuration error
    pub fn config(component: &str, reason: impl Into<String>) -> Self {
        EmgError::Configuration {
            component: component.to_string(),
            reason: reason.into(),
        }
    }

    /// True when the error means the source simply ran out of bytes
    pub fn is_stream_closed(&self) -> bool {
        matches!(self, EmgError::StreamClosed)
    }
}

impl From<config::ConfigError> for EmgError {
    fn from(err: config::ConfigError) -> Self {
        EmgError::config("loader", err.to_string())
    }
}

impl From<toml::de::Error> for EmgError {
    fn from(err: toml::de::Error) -> Self {
        EmgError::config("toml", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_helper() {
        let err = EmgError::config("channels", "duplicate packet index 3");
        assert_eq!(
            err.to_string(),
            "configuration error in channels: duplicate packet index 3"
        );
    }

    #[test]
    fn test_stream_closed_detection() {
        assert!(EmgError::StreamClosed.is_stream_closed());
        assert!(!EmgError::InvalidFilterSpec("order".into()).is_stream_closed());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let err: EmgError = io.into();
        assert!(matches!(err, EmgError::Io(_)));
    }
}
