//! Stream controller: the producer-facing half of the output core.
//!
//! Owns the device-stream handle and the shared ring buffer, reacts to
//! format changes by cycling the stream, and supplies the pull consumer
//! that the driver invokes on its own real-time thread.
//!
//! Threading model (no lock anywhere on the audio path):
//!   - producer context: the host calls `process_samples` / `update` /
//!     `pause` / `flush` / `force_play` / `volume_set` / `get_latency`,
//!     serialized by the host
//!   - consumer context: the driver's callback drains via `PullConsumer`,
//!     on a thread the application does not schedule and must never block
//!
//! The two sides share only the ring buffer cursors, the gain, and the
//! underrun flag, all atomics. Gain is read without further synchronization;
//! a volume change may land one callback late, which is inaudible.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crate::backend::CpalDriver;
use crate::chunk::AudioChunk;
use crate::driver::{DeviceId, OutputDriver, OutputStream, StreamDesc};
use crate::error::Result;
use crate::ring_buffer::RingBuffer;

/// Ring capacity in sample slots. Power of 2; holds several seconds of
/// interleaved audio at any supported rate and channel count
/// (~11 s at 192 kHz stereo).
pub const RING_CAPACITY: usize = 2_097_152;

/// Fixed hardware block size requested per callback, in frames.
pub const FRAMES_PER_CALLBACK: u32 = 1024;

// ─── Atomic f32 helpers (lock-free volume) ───

#[inline]
fn f32_to_atomic(v: f32) -> u32 {
    v.to_bits()
}
#[inline]
fn atomic_to_f32(b: u32) -> f32 {
    f32::from_bits(b)
}

/// Decibels to linear gain: 0 dB is unity, negative values attenuate.
#[inline]
pub fn db_to_linear(db: f64) -> f32 {
    10.0_f64.powf(db / 20.0) as f32
}

// ─── Shared consumer state ───

/// Everything the real-time callback touches. Lives in an `Arc` shared
/// between the controller and the open stream.
struct Shared {
    ring: RingBuffer,
    /// Linear gain as f32 bits. Written by the producer, read per callback.
    gain_bits: AtomicU32,
    /// One-shot flag: the callback drained the buffer to empty. Cleared by
    /// the next latency query, which also aborts the stream.
    underrun: AtomicBool,
}

/// The pull side handed to the driver when a stream is opened.
///
/// `fill` never blocks and never signals the driver to abort; underrun
/// recovery goes through the one-shot flag instead, because a driver-level
/// abort from inside the callback can leave the stream unresumable.
pub struct PullConsumer {
    shared: Arc<Shared>,
}

impl PullConsumer {
    /// Drain the ring into one hardware output block, applying software
    /// volume. Emits silence and raises the underrun flag when the ring
    /// runs dry.
    pub fn fill(&self, out: &mut [f32]) {
        let gain = atomic_to_f32(self.shared.gain_bits.load(Ordering::Relaxed));
        let unity = gain == 1.0;
        let mut starved = false;

        for slot in out.iter_mut() {
            let (sample, underrun) = self.shared.ring.try_read_sample();
            if underrun {
                *slot = 0.0;
                starved = true;
            } else if unity {
                // The driver has no native volume control; skip the multiply
                // at unity so full volume stays bit-exact.
                *slot = sample;
            } else {
                *slot = sample * gain;
            }
        }

        if starved {
            self.shared.underrun.store(true, Ordering::Release);
        }
    }
}

// ─── Stream controller ───

pub struct StreamController<D: OutputDriver = CpalDriver> {
    driver: D,
    device_index: usize,
    /// Target buffering duration, in seconds of audio.
    buffer_seconds: f64,
    /// Requested output bit depth. Informational only: samples are always
    /// delivered to the driver as f32.
    bit_depth: u32,
    shared: Arc<Shared>,
    stream: Option<D::Stream>,
    /// Current negotiated format; 0 means no stream yet.
    sample_rate: u32,
    channels: u32,
    /// Occupancy below which `update` invites more data.
    ready_threshold: usize,
}

impl StreamController<CpalDriver> {
    /// Open a controller targeting `device`, buffering roughly
    /// `buffer_seconds` of audio. Initializes the shared driver runtime on
    /// first use.
    pub fn new(device: DeviceId, buffer_seconds: f64, bit_depth: u32) -> Self {
        Self::with_driver(CpalDriver::new(), device, buffer_seconds, bit_depth)
    }
}

impl<D: OutputDriver> StreamController<D> {
    pub fn with_driver(driver: D, device: DeviceId, buffer_seconds: f64, bit_depth: u32) -> Self {
        Self {
            driver,
            device_index: device.index(),
            buffer_seconds,
            bit_depth,
            shared: Arc::new(Shared {
                ring: RingBuffer::new(RING_CAPACITY),
                gain_bits: AtomicU32::new(f32_to_atomic(1.0)),
                underrun: AtomicBool::new(false),
            }),
            stream: None,
            sample_rate: 0,
            channels: 0,
            ready_threshold: RING_CAPACITY / 2,
        }
    }

    pub fn bit_depth(&self) -> u32 {
        self.bit_depth
    }

    /// Current linear gain (1.0 = unity).
    pub fn gain(&self) -> f32 {
        atomic_to_f32(self.shared.gain_bits.load(Ordering::Relaxed))
    }

    /// Send new samples to the device. The host must only call this after
    /// `update` has reported readiness.
    ///
    /// A sample-rate or channel-count change (or no stream being open yet)
    /// cycles the device stream first: close, reset the ring, recompute the
    /// readiness threshold, open at the new format. A failed open is logged
    /// and otherwise swallowed — playback stays silent until a later format
    /// change succeeds.
    pub fn process_samples(&mut self, chunk: &AudioChunk<'_>) {
        let new_rate = chunk.sample_rate();
        let new_channels = chunk.channels();

        if new_rate != self.sample_rate || new_channels != self.channels || self.stream.is_none() {
            self.reopen_stream(new_rate, new_channels);
        }

        // The interleaved pair swap only holds for exactly two channels;
        // every other layout is written in natural order.
        let swap_pair = self.channels == 2;
        for &sample in chunk.samples() {
            self.shared.ring.write_sample(sample, swap_pair);
        }

        self.resume_stream();
    }

    /// Query whether the device is ready for the next `process_samples`
    /// call. This is the sole backpressure signal to the producer.
    pub fn update(&self) -> bool {
        self.shared.ring.occupancy() < self.ready_threshold
    }

    /// Amount of audio queued for playback, in seconds.
    ///
    /// Also the underrun recovery point: a raised underrun flag aborts the
    /// stream and clears the flag, because a stream that drained to empty
    /// cannot be restarted without an explicit abort first.
    pub fn get_latency(&mut self) -> f64 {
        if self.shared.underrun.swap(false, Ordering::AcqRel) {
            self.abort_stream();
        }

        let occupied = self.shared.ring.occupancy();
        if occupied <= 1 || self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        occupied as f64 / (f64::from(self.channels) * f64::from(self.sample_rate))
    }

    /// Pause (`true`: abort the stream) or unpause (`false`: restart it).
    /// No-op while no stream is open.
    pub fn pause(&mut self, paused: bool) {
        if self.stream.is_none() {
            return;
        }
        if paused {
            self.abort_stream();
        } else {
            self.resume_stream();
        }
    }

    /// Discard queued audio: abort the stream and reset the ring. Called
    /// after a seek so stale pre-seek audio never reaches the device.
    pub fn flush(&mut self) {
        self.abort_stream();
        self.shared.ring.reset();
    }

    /// Unconditionally start the stream if it is stopped. Called when the
    /// producer has no more data, so a partially filled buffer still plays
    /// out instead of waiting for the readiness threshold.
    pub fn force_play(&mut self) {
        self.resume_stream();
    }

    /// Set playback volume. 0 dB is full volume; negative values attenuate.
    /// Applied on the consumer side, one callback late at worst.
    pub fn volume_set(&self, db: f64) {
        self.shared
            .gain_bits
            .store(f32_to_atomic(db_to_linear(db)), Ordering::Relaxed);
    }

    fn reopen_stream(&mut self, sample_rate: u32, channels: u32) {
        self.sample_rate = sample_rate;
        self.channels = channels;

        // A few seconds of audio, bounded one second's worth away from the
        // ring capacity so a ready producer can never overflow it.
        let per_second = sample_rate as usize * channels as usize;
        self.ready_threshold = ((per_second as f64 * self.buffer_seconds) as usize)
            .min(self.shared.ring.capacity().saturating_sub(per_second));

        if self.stream.take().is_some() {
            // Old stream closed by the drop; queued samples are stale now.
            self.shared.ring.reset();
        }

        let latency_hint = self
            .driver
            .device_info(self.device_index)
            .map(|info| info.default_low_output_latency)
            .unwrap_or(0.0);

        let desc = StreamDesc {
            device_index: self.device_index,
            channels,
            sample_rate,
            frames_per_callback: FRAMES_PER_CALLBACK,
            suggested_latency: latency_hint,
        };

        let consumer = PullConsumer {
            shared: Arc::clone(&self.shared),
        };
        match self.driver.open_stream(&desc, consumer) {
            Ok(stream) => {
                log::debug!("output stream open: {} Hz, {} ch", sample_rate, channels);
                self.stream = Some(stream);
            }
            Err(e) => log::error!("failed to open output stream: {}", e),
        }
    }

    fn resume_stream(&mut self) {
        if let Some(stream) = self.stream.as_mut() {
            if stream.is_stopped() {
                log_driver_error(stream.start());
            }
        }
    }

    fn abort_stream(&mut self) {
        if let Some(stream) = self.stream.as_mut() {
            log_driver_error(stream.abort());
        }
    }
}

impl<D: OutputDriver> Drop for StreamController<D> {
    fn drop(&mut self) {
        self.abort_stream();
    }
}

/// Driver errors are reported, never propagated: the controller stays in
/// its prior state and playback degrades to silence.
fn log_driver_error(result: Result<()>) {
    if let Err(e) = result {
        log::error!("audio driver error: {}", e);
    }
}
