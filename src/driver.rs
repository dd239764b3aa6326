//! Device-driver boundary.
//!
//! The controller never talks to a concrete audio backend directly; it goes
//! through these traits so the stream lifecycle (open / start / abort /
//! close-on-drop) can be exercised against a mock in tests. The cpal
//! implementation lives in [`crate::backend`].

use serde::Serialize;

use crate::controller::PullConsumer;
use crate::error::Result;

/// Opaque handle selecting one physical output device.
///
/// Carries the device's index in the driver's output-device table directly,
/// instead of smuggling it through a subfield of some generic identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceId(usize);

impl DeviceId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

/// Static facts about one output device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    /// Device name (as reported by the driver).
    pub name: String,
    /// Maximum output channel count; 0 means not an output device.
    pub max_output_channels: u32,
    /// The device's default low-output latency, in seconds. Used as the
    /// suggested latency hint when opening a stream on it.
    pub default_low_output_latency: f64,
    /// Name of the host API the device belongs to (WASAPI, ALSA, ...).
    pub host_api: String,
}

/// Everything needed to open an output stream.
#[derive(Debug, Clone)]
pub struct StreamDesc {
    pub device_index: usize,
    pub channels: u32,
    pub sample_rate: u32,
    /// Fixed hardware block size requested per callback, in frames.
    pub frames_per_callback: u32,
    /// Suggested latency in seconds; backends that cannot honor it may
    /// ignore it.
    pub suggested_latency: f64,
}

/// An open output stream. Closing is dropping.
pub trait OutputStream {
    /// Start (or restart) playback. Idempotent: starting a running stream
    /// is a no-op.
    fn start(&mut self) -> Result<()>;

    /// Hard-stop playback without draining queued hardware buffers.
    fn abort(&mut self) -> Result<()>;

    fn is_stopped(&self) -> bool;
}

/// An audio backend able to enumerate output devices and open pull streams.
pub trait OutputDriver {
    type Stream: OutputStream;

    fn device_count(&self) -> usize;

    /// Facts about the device at `index`, or `None` if it does not exist.
    fn device_info(&self, index: usize) -> Option<DeviceInfo>;

    /// Open a stream on the described device. The driver invokes
    /// `consumer.fill()` from its own real-time thread whenever it needs
    /// another block of output samples. The stream starts stopped.
    fn open_stream(&self, desc: &StreamDesc, consumer: PullConsumer) -> Result<Self::Stream>;

    /// Invoke `on_device` once per eligible output device, with its handle
    /// and a display name of the form `"name (host api)"`.
    fn for_each_output_device<F>(&self, mut on_device: F)
    where
        F: FnMut(DeviceId, &str),
    {
        for index in 0..self.device_count() {
            let Some(info) = self.device_info(index) else {
                continue;
            };
            if info.max_output_channels == 0 {
                continue;
            }
            let label = format!("{} ({})", info.name, info.host_api);
            on_device(DeviceId::new(index), &label);
        }
    }
}
