//! Error types for the output core.
//!
//! Driver failures are never fatal: the controller logs them and keeps its
//! prior state, so everything here degrades to "no audio" rather than a
//! crash. The `Error` type only surfaces at the device-driver boundary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Any device-driver call that came back with a non-success code.
    #[error("audio driver error: {0}")]
    Driver(String),

    /// The selected output device index does not (or no longer does) exist.
    #[error("no output device at index {0}")]
    DeviceNotFound(usize),

    /// The device rejected the requested sample rate / channel count.
    #[error("unsupported stream format: {0}")]
    Format(String),
}

/// Convenience Result type for driver-boundary calls.
pub type Result<T> = std::result::Result<T, Error>;
