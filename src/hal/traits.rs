// src/hal/traits.rs
//! Core HAL trait for byte-stream sources

use std::io;

/// A continuous stream of bytes from the acquisition board
///
/// `read_bytes` follows `std::io::Read` conventions: `Ok(0)` means the stream
/// is closed for good, while `ErrorKind::TimedOut`/`WouldBlock` only mean no
/// byte arrived in time.
pub trait ByteSource: Send {
    /// Read up to `buf.len()` bytes
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Discard anything buffered on the input side
    fn clear_input(&mut self) -> io::Result<()>;

    /// Release the underlying device
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Human readable name for logs
    fn describe(&self) -> String;
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_bytes(buf)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        (**self).clear_input()
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// True for errors that just mean "nothing to read yet"
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
