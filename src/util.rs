//! Helper traits to classify I/O failures on blocking sockets.

use std::io::{Error as IoError, ErrorKind as IoErrorKind};

use crate::error::Error;

/// Timeout detection.
///
/// A blocking socket with a read or write timeout reports expiry as
/// `WouldBlock` on Unix and as `TimedOut` on Windows, so both count.
pub trait TimeoutError {
    /// Returns `true` if this error was caused by an expired socket timeout.
    fn is_timeout(&self) -> bool;
}

impl TimeoutError for IoError {
    fn is_timeout(&self) -> bool {
        matches!(self.kind(), IoErrorKind::WouldBlock | IoErrorKind::TimedOut)
    }
}

impl TimeoutError for Error {
    fn is_timeout(&self) -> bool {
        match self {
            Error::Io(io_err) => io_err.is_timeout(),
            _ => false
        }
    }
}

/// Repeats a blocking call while it fails with `ErrorKind::Interrupted`.
pub fn retry_interrupted<T>(mut op: impl FnMut() -> Result<T, IoError>) -> Result<T, IoError> {
    loop {
        match op() {
            Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
            other => return other
        }
    }
}
