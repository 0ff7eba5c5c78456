//! Atomic cells for lock-free UI ↔ audio communication.
//!
//! The audio thread publishes meter values and the sample clock through
//! these cells; the UI thread reads them without locking. Independent
//! values use `Relaxed` ordering; values that publish other data (the
//! sample clock guarding a block boundary) use acquire/release pairs.

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Atomic f32 stored as its bit pattern in an `AtomicU32`.
///
/// `Relaxed` ordering by default, which is sufficient for independent
/// parameters and meter values that do not synchronize other memory.
#[derive(Debug)]
pub struct AtomicF32 {
    bits: AtomicU32,
}

impl AtomicF32 {
    /// Create a new atomic f32 with the given initial value.
    #[inline]
    pub const fn new(value: f32) -> Self {
        Self {
            bits: AtomicU32::new(value.to_bits()),
        }
    }

    /// Get the current value.
    #[inline]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    /// Set a new value.
    #[inline]
    pub fn set(&self, value: f32) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Swap the value and return the old one.
    #[inline]
    pub fn swap(&self, value: f32) -> f32 {
        f32::from_bits(self.bits.swap(value.to_bits(), Ordering::Relaxed))
    }

    /// Get with acquire ordering (pairs with [`set_release`](Self::set_release)).
    #[inline]
    pub fn get_acquire(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Set with release ordering (pairs with [`get_acquire`](Self::get_acquire)).
    #[inline]
    pub fn set_release(&self, value: f32) {
        self.bits.store(value.to_bits(), Ordering::Release);
    }
}

impl Default for AtomicF32 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Clone for AtomicF32 {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

/// The engine's 64-bit sample clock, readable from any thread.
///
/// Advances by the block size once per callback; resets to zero on engine
/// restart and across a preset-load boundary. The store uses release
/// ordering so a reader that observes clock T also observes every write
/// the audio thread made while producing the block that ended at T.
#[derive(Debug, Default)]
pub struct AtomicSampleClock {
    clock: AtomicU64,
}

impl AtomicSampleClock {
    /// Create a clock starting at zero.
    pub const fn new() -> Self {
        Self {
            clock: AtomicU64::new(0),
        }
    }

    /// Current sample clock.
    #[inline]
    pub fn get(&self) -> u64 {
        self.clock.load(Ordering::Acquire)
    }

    /// Advance by one block. Audio thread only.
    #[inline]
    pub fn advance(&self, block_size: usize) -> u64 {
        let next = self.clock.load(Ordering::Relaxed) + block_size as u64;
        self.clock.store(next, Ordering::Release);
        next
    }

    /// Reset to zero (engine restart / preset-load boundary).
    #[inline]
    pub fn reset(&self) {
        self.clock.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_f32_roundtrip() {
        let cell = AtomicF32::new(1.0);
        assert!((cell.get() - 1.0).abs() < 1e-9);

        cell.set(0.5);
        assert!((cell.get() - 0.5).abs() < 1e-9);

        let old = cell.swap(0.75);
        assert!((old - 0.5).abs() < 1e-9);
        assert!((cell.get() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn atomic_f32_preserves_bit_patterns() {
        let cell = AtomicF32::new(0.0);
        cell.set(-0.0);
        assert_eq!(cell.get().to_bits(), (-0.0_f32).to_bits());
    }

    #[test]
    fn sample_clock_advances_by_block() {
        let clock = AtomicSampleClock::new();
        assert_eq!(clock.get(), 0);
        assert_eq!(clock.advance(256), 256);
        assert_eq!(clock.advance(256), 512);
        clock.reset();
        assert_eq!(clock.get(), 0);
    }
}
