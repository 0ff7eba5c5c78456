//! Per-input capture staging rings.
//!
//! Device capture threads push samples in whatever chunk size the driver
//! delivers; the audio callback drains exactly one block per callback. The
//! ring is a wait-free SPSC over `rtrb` with a fixed power-of-two capacity;
//! when a capture burst exceeds the free space the excess samples are
//! dropped and counted exactly, and the reader substitutes silence for any
//! shortfall, so an overflow never turns into a glitch later.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rtrb::{Consumer, Producer, RingBuffer, chunks::ChunkError};

/// Shared overflow accounting for one staging ring.
#[derive(Debug, Default)]
pub struct StagingStats {
    dropped_samples: AtomicU64,
}

impl StagingStats {
    /// Total samples dropped because the ring was full.
    pub fn dropped_samples(&self) -> u64 {
        self.dropped_samples.load(Ordering::Relaxed)
    }
}

/// Capture-thread half: pushes driver chunks.
pub struct StagingWriter {
    producer: Producer<f32>,
    stats: Arc<StagingStats>,
}

/// Audio-thread half: drains one block per callback.
pub struct StagingReader {
    consumer: Consumer<f32>,
    stats: Arc<StagingStats>,
}

/// Builder for a staging ring pair.
pub struct StagingRing;

impl StagingRing {
    /// Create a ring with at least `min_capacity` samples, rounded up to a
    /// power of two.
    pub fn with_capacity(min_capacity: usize) -> (StagingWriter, StagingReader) {
        let capacity = min_capacity.max(2).next_power_of_two();
        let (producer, consumer) = RingBuffer::new(capacity);
        let stats = Arc::new(StagingStats::default());
        (
            StagingWriter {
                producer,
                stats: Arc::clone(&stats),
            },
            StagingReader { consumer, stats },
        )
    }
}

impl StagingWriter {
    /// Push a capture chunk, dropping (and counting) whatever does not fit.
    ///
    /// Returns the number of samples actually written.
    pub fn push(&mut self, samples: &[f32]) -> usize {
        let free = self.producer.slots();
        let writable = samples.len().min(free);
        if writable > 0 {
            // Chunk reservation cannot fail: `writable <= slots()` and this
            // is the only producer. `fill_from_iter` commits what it wrote.
            if let Ok(chunk) = self.producer.write_chunk_uninit(writable) {
                chunk.fill_from_iter(samples[..writable].iter().copied());
            }
        }
        let dropped = samples.len() - writable;
        if dropped > 0 {
            self.stats
                .dropped_samples
                .fetch_add(dropped as u64, Ordering::Relaxed);
        }
        writable
    }

    /// Overflow accounting handle.
    pub fn stats(&self) -> Arc<StagingStats> {
        Arc::clone(&self.stats)
    }
}

impl StagingReader {
    /// Drain exactly `block.len()` samples into `block`.
    ///
    /// A shortfall (capture under-run) fills the remainder with silence and
    /// returns the number of real samples delivered.
    pub fn read_block(&mut self, block: &mut [f32]) -> usize {
        let available = self.consumer.slots().min(block.len());
        if available > 0 {
            match self.consumer.read_chunk(available) {
                Ok(chunk) => {
                    let (first, second) = chunk.as_slices();
                    block[..first.len()].copy_from_slice(first);
                    block[first.len()..first.len() + second.len()].copy_from_slice(second);
                    chunk.commit_all();
                }
                Err(ChunkError::TooFewSlots(_)) => {}
            }
        }
        block[available..].fill(0.0);
        available
    }

    /// Discard everything currently buffered (preset-load boundary).
    pub fn clear(&mut self) {
        let n = self.consumer.slots();
        if n > 0
            && let Ok(chunk) = self.consumer.read_chunk(n)
        {
            chunk.commit_all();
        }
    }

    /// Samples currently buffered.
    pub fn buffered(&self) -> usize {
        self.consumer.slots()
    }

    /// Overflow accounting handle.
    pub fn stats(&self) -> Arc<StagingStats> {
        Arc::clone(&self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_read_roundtrip() {
        let (mut writer, mut reader) = StagingRing::with_capacity(64);
        let chunk: Vec<f32> = (0..32).map(|i| i as f32).collect();
        assert_eq!(writer.push(&chunk), 32);

        let mut block = [0.0_f32; 32];
        assert_eq!(reader.read_block(&mut block), 32);
        for (i, &s) in block.iter().enumerate() {
            assert_eq!(s, i as f32);
        }
    }

    #[test]
    fn shortfall_fills_silence() {
        let (mut writer, mut reader) = StagingRing::with_capacity(64);
        writer.push(&[1.0; 10]);

        let mut block = [9.9_f32; 32];
        assert_eq!(reader.read_block(&mut block), 10);
        assert!(block[..10].iter().all(|&s| s == 1.0));
        assert!(block[10..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn overflow_drops_and_counts_exactly() {
        let (mut writer, reader) = StagingRing::with_capacity(64);
        assert_eq!(reader.buffered(), 0);

        // Capacity is 64; a 25% overshoot of 80 samples drops exactly 16.
        let burst = vec![0.5_f32; 80];
        assert_eq!(writer.push(&burst), 64);
        assert_eq!(writer.stats().dropped_samples(), 16);
        assert_eq!(reader.buffered(), 64);
    }

    #[test]
    fn stream_recovers_after_overflow() {
        let (mut writer, mut reader) = StagingRing::with_capacity(64);
        writer.push(&vec![1.0_f32; 100]);

        let mut block = [0.0_f32; 64];
        reader.read_block(&mut block);
        assert!(block.iter().all(|&s| s == 1.0));

        // Ring drained; a fresh chunk flows through untouched.
        writer.push(&[2.0; 16]);
        let mut block = [0.0_f32; 16];
        assert_eq!(reader.read_block(&mut block), 16);
        assert!(block.iter().all(|&s| s == 2.0));
        assert_eq!(writer.stats().dropped_samples(), 36);
    }

    #[test]
    fn clear_discards_buffered_samples() {
        let (mut writer, mut reader) = StagingRing::with_capacity(64);
        writer.push(&[1.0; 40]);
        reader.clear();
        assert_eq!(reader.buffered(), 0);

        let mut block = [5.0_f32; 8];
        assert_eq!(reader.read_block(&mut block), 0);
        assert!(block.iter().all(|&s| s == 0.0));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;
        use std::collections::VecDeque;

        #[derive(Debug, Clone)]
        enum Op {
            Push(usize),
            Read(usize),
        }

        fn op_strategy() -> impl Strategy<Value = Op> {
            prop_oneof![
                (1usize..200).prop_map(Op::Push),
                (1usize..96).prop_map(Op::Read),
            ]
        }

        proptest! {
            /// The ring behaves exactly like a bounded FIFO model: pushes
            /// accept up to the free space (dropping and counting the
            /// rest), reads deliver in order and zero-fill shortfalls.
            #[test]
            fn mirrors_a_bounded_fifo(ops in prop::collection::vec(op_strategy(), 1..48)) {
                const CAPACITY: usize = 128;
                let (mut writer, mut reader) = StagingRing::with_capacity(CAPACITY);
                let mut model: VecDeque<f32> = VecDeque::new();
                let mut dropped = 0u64;
                let mut next_value = 0u32;

                for op in ops {
                    match op {
                        Op::Push(len) => {
                            let chunk: Vec<f32> =
                                (0..len).map(|i| (next_value + i as u32) as f32).collect();
                            next_value += len as u32;

                            let written = writer.push(&chunk);
                            prop_assert_eq!(written, len.min(CAPACITY - model.len()));
                            model.extend(&chunk[..written]);
                            dropped += (len - written) as u64;
                            prop_assert_eq!(writer.stats().dropped_samples(), dropped);
                        }
                        Op::Read(len) => {
                            let mut block = vec![-1.0_f32; len];
                            let delivered = reader.read_block(&mut block);
                            prop_assert_eq!(delivered, len.min(model.len()));
                            for &sample in &block[..delivered] {
                                prop_assert_eq!(sample, model.pop_front().unwrap());
                            }
                            prop_assert!(block[delivered..].iter().all(|&s| s == 0.0));
                        }
                    }
                }
            }
        }
    }
}
