//! Host-facing audio chunk boundary.
//!
//! The playback framework hands decoded audio to the output core as
//! interleaved f32 samples tagged with their format. The chunk borrows the
//! host's sample storage; the slice holds exactly the used samples.

pub struct AudioChunk<'a> {
    sample_rate: u32,
    channels: u32,
    samples: &'a [f32],
}

impl<'a> AudioChunk<'a> {
    /// Wrap a block of interleaved samples.
    ///
    /// `samples.len()` must be the used sample count (frames × channels for
    /// whole frames; a trailing partial frame is passed through as-is).
    pub fn new(sample_rate: u32, channels: u32, samples: &'a [f32]) -> Self {
        Self {
            sample_rate,
            channels,
            samples,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    /// Number of valid samples in this chunk.
    pub fn used_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn samples(&self) -> &[f32] {
        self.samples
    }
}
