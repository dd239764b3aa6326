//! cpal implementation of the device-driver boundary.
//!
//! Also owns the process-wide driver lifecycle: cpal needs no explicit
//! init/terminate, but the runtime object still models it so that shared
//! driver state is initialized on first use and torn down when the last
//! controller releases it, instead of hanging off an unguarded global flag.

use std::sync::{Arc, Weak};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig, SupportedBufferSize};
use parking_lot::Mutex;

use crate::controller::PullConsumer;
use crate::driver::{DeviceInfo, OutputDriver, OutputStream, StreamDesc};
use crate::error::{Error, Result};

/// Latency estimate used when a device does not report a usable minimum
/// buffer size.
const FALLBACK_LATENCY_SECS: f64 = 0.01;

static RUNTIME: Mutex<Weak<DriverRuntime>> = Mutex::new(Weak::new());

/// Process-wide driver state, shared by every live controller.
///
/// `acquire()` is init-on-first-use and idempotent: all callers get the same
/// instance while at least one is alive. Dropping the last handle tears the
/// driver state down.
pub struct DriverRuntime {
    _private: (),
}

impl DriverRuntime {
    pub fn acquire() -> Arc<Self> {
        let mut slot = RUNTIME.lock();
        if let Some(runtime) = slot.upgrade() {
            return runtime;
        }
        log::debug!("initializing audio driver runtime");
        let runtime = Arc::new(Self { _private: () });
        *slot = Arc::downgrade(&runtime);
        runtime
    }
}

impl Drop for DriverRuntime {
    fn drop(&mut self) {
        log::debug!("audio driver runtime released");
    }
}

/// The cpal-backed output driver.
pub struct CpalDriver {
    _runtime: Arc<DriverRuntime>,
    host: cpal::Host,
}

impl CpalDriver {
    pub fn new() -> Self {
        Self {
            _runtime: DriverRuntime::acquire(),
            host: cpal::default_host(),
        }
    }

    fn output_device(&self, index: usize) -> Option<cpal::Device> {
        self.host.output_devices().ok()?.nth(index)
    }

    /// Default low-output latency, estimated from the device's minimum
    /// hardware buffer size at its default sample rate.
    fn low_output_latency(device: &cpal::Device) -> f64 {
        let Ok(config) = device.default_output_config() else {
            return FALLBACK_LATENCY_SECS;
        };
        let rate = config.sample_rate().0;
        match (config.buffer_size(), rate) {
            (SupportedBufferSize::Range { min, .. }, rate) if *min > 0 && rate > 0 => {
                f64::from(*min) / f64::from(rate)
            }
            _ => FALLBACK_LATENCY_SECS,
        }
    }
}

impl Default for CpalDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputDriver for CpalDriver {
    type Stream = CpalStream;

    fn device_count(&self) -> usize {
        self.host
            .output_devices()
            .map(|devices| devices.count())
            .unwrap_or(0)
    }

    fn device_info(&self, index: usize) -> Option<DeviceInfo> {
        let device = self.output_device(index)?;
        let name = device.name().ok()?;

        let max_output_channels = device
            .supported_output_configs()
            .map(|configs| {
                configs
                    .map(|range| u32::from(range.channels()))
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0);

        Some(DeviceInfo {
            name,
            max_output_channels,
            default_low_output_latency: Self::low_output_latency(&device),
            host_api: self.host.id().name().to_string(),
        })
    }

    fn open_stream(&self, desc: &StreamDesc, consumer: PullConsumer) -> Result<Self::Stream> {
        let device = self
            .output_device(desc.device_index)
            .ok_or(Error::DeviceNotFound(desc.device_index))?;

        let config = StreamConfig {
            channels: desc.channels as u16,
            sample_rate: SampleRate(desc.sample_rate),
            buffer_size: BufferSize::Fixed(desc.frames_per_callback),
        };

        log::debug!(
            "opening output stream: {} Hz, {} ch, {} frames/callback, latency hint {:.1} ms",
            desc.sample_rate,
            desc.channels,
            desc.frames_per_callback,
            desc.suggested_latency * 1000.0
        );

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    consumer.fill(data);
                },
                |err| {
                    log::error!("output stream error: {}", err);
                },
                None,
            )
            .map_err(|e| match e {
                cpal::BuildStreamError::StreamConfigNotSupported => Error::Format(format!(
                    "{} Hz / {} ch rejected by device",
                    desc.sample_rate, desc.channels
                )),
                other => Error::Driver(format!("failed to build output stream: {}", other)),
            })?;

        Ok(CpalStream {
            stream,
            stopped: true,
        })
    }
}

/// An open cpal stream.
///
/// cpal offers no stopped-state query, so the wrapper tracks it with a flag
/// flipped by `start`/`abort`.
pub struct CpalStream {
    stream: cpal::Stream,
    stopped: bool,
}

impl OutputStream for CpalStream {
    fn start(&mut self) -> Result<()> {
        self.stream
            .play()
            .map_err(|e| Error::Driver(format!("failed to start stream: {}", e)))?;
        self.stopped = false;
        Ok(())
    }

    fn abort(&mut self) -> Result<()> {
        self.stream
            .pause()
            .map_err(|e| Error::Driver(format!("failed to abort stream: {}", e)))?;
        self.stopped = true;
        Ok(())
    }

    fn is_stopped(&self) -> bool {
        self.stopped
    }
}
