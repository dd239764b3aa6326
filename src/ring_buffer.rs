//! Lock-free single-producer single-consumer (SPSC) ring buffer for audio.
//!
//! This is the core safety mechanism that prevents audio glitches:
//!   - The host playback engine WRITES samples into the buffer (producer)
//!   - The device callback READS samples from the buffer (consumer)
//!   - NO MUTEX is ever used — atomic read/write cursors only
//!   - The device callback NEVER blocks, even if the buffer is empty
//!
//! Cursors are bounded to `[0, capacity)` with a one-slot gap reserved so
//! that "empty" and "full" stay distinguishable: the buffer is empty exactly
//! when `(read + 1) % capacity == write`. A reset puts the write cursor at 1
//! and the read cursor at 0, which satisfies the empty condition immediately
//! but also means `occupancy()` counts the gap slot — callers treat an
//! occupancy of 1 or less as empty.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct RingBuffer {
    /// The sample data. Fixed-size, allocated once, zeroed.
    storage: Box<[UnsafeCell<f32>]>,
    /// Write cursor (only modified by the producer).
    write_pos: AtomicUsize,
    /// Read cursor (only modified by the consumer).
    read_pos: AtomicUsize,
    capacity: usize,
    /// Bit mask for fast modulo: capacity - 1 (capacity is a power of 2).
    mask: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "ring buffer capacity must be a power of 2"
        );

        Self {
            storage: (0..capacity).map(|_| UnsafeCell::new(0.0)).collect(),
            write_pos: AtomicUsize::new(1),
            read_pos: AtomicUsize::new(0),
            capacity,
            mask: capacity - 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Reinitialize the cursors to the empty state (write = 1, read = 0).
    /// Contents are not cleared.
    ///
    /// Producer side only, and only while no concurrent drain is running
    /// (format switch or flush, with the stream closed or aborted).
    pub fn reset(&self) {
        self.write_pos.store(1, Ordering::Release);
        self.read_pos.store(0, Ordering::Release);
    }

    /// Occupied sample count, `(write - read + capacity) % capacity`.
    ///
    /// Includes the reserved gap slot: a freshly reset buffer reports 1.
    /// Safe to call from either side for diagnostics.
    pub fn occupancy(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        (write + self.capacity - read) & self.mask
    }

    /// Store one sample at the current write cursor and advance it.
    ///
    /// With `swap_pair` set, the storage index is the cursor with its lowest
    /// bit flipped, which exchanges the two samples of each interleaved pair
    /// before they are later drained in natural order. This transform is
    /// only meaningful for exactly two interleaved channels; callers must
    /// not enable it for any other channel count.
    ///
    /// There is no fullness guard: the producer must not write more than
    /// `capacity - 1 - occupancy()` samples between drains, or it will
    /// overtake the read cursor.
    pub fn write_sample(&self, value: f32, swap_pair: bool) {
        let write = self.write_pos.load(Ordering::Relaxed);
        let index = if swap_pair { write ^ 1 } else { write };
        // Safe: the producer is the only thread that writes sample slots,
        // and the Release store below publishes the data before the
        // consumer can observe the advanced cursor.
        unsafe {
            *self.storage[index & self.mask].get() = value;
        }
        self.write_pos.store((write + 1) & self.mask, Ordering::Release);
    }

    /// Pop one sample, or report underrun.
    ///
    /// Returns `(sample, false)` and advances the read cursor, or
    /// `(0.0, true)` without advancing when the buffer is empty.
    /// Never blocks — callable from the real-time callback.
    pub fn try_read_sample(&self) -> (f32, bool) {
        let read = self.read_pos.load(Ordering::Relaxed);
        let write = self.write_pos.load(Ordering::Acquire);
        let next = (read + 1) & self.mask;
        if next == write {
            return (0.0, true);
        }
        let value = unsafe { *self.storage[read].get() };
        self.read_pos.store(next, Ordering::Release);
        (value, false)
    }
}

// Safety: RingBuffer is safe to share between threads because:
// - write_pos is only modified by the producer, read_pos only by the consumer
// - each side only ever reads the other's cursor
// - sample slots are published with Release stores and observed with
//   Acquire loads of the owning cursor, so the data is visible before the
//   cursor advance is
unsafe impl Sync for RingBuffer {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fresh_buffer_is_empty() {
        let ring = RingBuffer::new(8);
        assert_eq!(ring.occupancy(), 1);
        let (value, underrun) = ring.try_read_sample();
        assert_eq!(value, 0.0);
        assert!(underrun);
        // An empty read must not advance the cursor.
        assert_eq!(ring.occupancy(), 1);
    }

    #[test]
    fn natural_order_write_then_drain() {
        let ring = RingBuffer::new(8);
        for v in [1.0, 2.0, 3.0] {
            ring.write_sample(v, false);
        }
        assert_eq!(ring.occupancy(), 4);

        // The first drained slot is the reserved gap (still zeroed), then
        // the written samples follow in order.
        let mut drained = Vec::new();
        loop {
            let (value, underrun) = ring.try_read_sample();
            if underrun {
                break;
            }
            drained.push(value);
        }
        assert_eq!(drained, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(ring.occupancy(), 1);
    }

    #[test]
    fn pair_swap_drain_order() {
        // From the reset state the write cursor starts at 1, so the XOR
        // places the first sample in the gap slot and exchanges every
        // following interleaved pair.
        let ring = RingBuffer::new(16);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0, 6.0] {
            ring.write_sample(v, true);
        }

        let mut drained = Vec::new();
        loop {
            let (value, underrun) = ring.try_read_sample();
            if underrun {
                break;
            }
            drained.push(value);
        }
        assert_eq!(drained, vec![1.0, 0.0, 3.0, 2.0, 5.0, 4.0]);
    }

    #[test]
    fn occupancy_never_exceeds_capacity_minus_one() {
        let ring = RingBuffer::new(8);
        // Protocol-respecting producer: stop once only the gap remains.
        let mut written = 0;
        while ring.occupancy() < ring.capacity() - 1 {
            ring.write_sample(written as f32, false);
            written += 1;
        }
        assert_eq!(ring.occupancy(), ring.capacity() - 1);
        assert_eq!(written, 6);
    }

    #[test]
    fn wrap_around_preserves_order() {
        let ring = RingBuffer::new(8);
        let mut expected = vec![0.0]; // the gap slot drains first
        let mut next = 0.0f32;

        // Interleave writes and reads so the cursors wrap several times.
        let mut drained = Vec::new();
        for _ in 0..10 {
            for _ in 0..3 {
                if ring.occupancy() < ring.capacity() - 1 {
                    ring.write_sample(next, false);
                    expected.push(next);
                    next += 1.0;
                }
            }
            for _ in 0..3 {
                let (value, underrun) = ring.try_read_sample();
                if !underrun {
                    drained.push(value);
                }
            }
        }
        loop {
            let (value, underrun) = ring.try_read_sample();
            if underrun {
                break;
            }
            drained.push(value);
        }
        assert_eq!(drained, expected);
    }

    #[test]
    fn concurrent_producer_consumer_loses_nothing() {
        const SAMPLES: usize = 50_000;
        let ring = Arc::new(RingBuffer::new(1024));

        let producer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                let mut sent = 0usize;
                while sent < SAMPLES {
                    if ring.occupancy() < ring.capacity() - 1 {
                        ring.write_sample(sent as f32, false);
                        sent += 1;
                    } else {
                        thread::yield_now();
                    }
                }
            })
        };

        // The consumer sees the gap slot first, then every sample in order.
        let mut received = Vec::with_capacity(SAMPLES + 1);
        while received.len() < SAMPLES + 1 {
            let (value, underrun) = ring.try_read_sample();
            if underrun {
                thread::yield_now();
            } else {
                received.push(value);
            }
        }
        producer.join().unwrap();

        assert_eq!(received[0], 0.0);
        for (i, &value) in received[1..].iter().enumerate() {
            assert_eq!(value, i as f32, "sample {i} drained out of order");
        }
    }
}
