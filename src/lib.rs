//! Glitch-free audio output core.
//!
//! Delivers decoded samples from a host playback engine to a physical
//! output device through a callback-driven backend (cpal), absorbing the
//! timing mismatch between the producer and the device's real-time pull
//! callback with a lock-free SPSC ring buffer.
//!
//! The host pushes interleaved f32 chunks through [`StreamController`];
//! the backend drains them on its own thread, applying software volume.
//! Backpressure is a single readiness signal ([`StreamController::update`]),
//! underruns degrade to silence and recover on the next latency query, and
//! a format change transparently cycles the device stream.

pub mod backend;
pub mod chunk;
pub mod controller;
pub mod driver;
pub mod error;
pub mod ring_buffer;

pub use backend::{CpalDriver, DriverRuntime};
pub use chunk::AudioChunk;
pub use controller::{db_to_linear, PullConsumer, StreamController};
pub use driver::{DeviceId, DeviceInfo, OutputDriver, OutputStream, StreamDesc};
pub use error::{Error, Result};

/// Whether the host must offer bit-depth configuration for this output.
/// Samples are always delivered to the driver as f32, so: no.
pub fn needs_bitdepth_config() -> bool {
    false
}

/// Whether the host must offer dither configuration for this output.
pub fn needs_dither_config() -> bool {
    false
}

/// Enumerate eligible output devices on the default backend, invoking
/// `on_device` once per device with its handle and display name.
pub fn enumerate_outputs<F>(on_device: F)
where
    F: FnMut(DeviceId, &str),
{
    CpalDriver::new().for_each_output_device(on_device);
}
