//! The analysis signal bus: time-indexed sideband storage.
//!
//! For every producer slot in a chain the bus holds one ring per analysis
//! signal, capacity a power of two covering at least one analysis window.
//! Cells are atomic `f32` bit patterns, so the audio thread writes and both
//! the audio thread and the analysis worker read without any locking. The
//! index is simply `sample_time & (capacity - 1)`: writes wrap naturally,
//! stale reads are acceptable and preferred to stalls, and there is no
//! overflow signaling.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::signal::{AnalysisSignal, SIGNAL_COUNT, SignalMask};

/// One producer's rings, one per signal, flattened into a single cell array.
#[derive(Debug)]
struct ProducerLane {
    /// `SIGNAL_COUNT * capacity` cells; signal-major layout.
    cells: Vec<AtomicU32>,
}

/// Lock-free, time-indexed analysis signal storage.
///
/// Reallocated only at chain rebuild time; the `generation` tag lets capture
/// consumers discard records that reference a retired bus.
#[derive(Debug)]
pub struct SignalBus {
    generation: u64,
    capacity: usize,
    index_mask: u64,
    lanes: Vec<ProducerLane>,
}

impl SignalBus {
    /// Allocate a bus for `producer_count` lanes sized to cover
    /// `window_samples` (rounded up to a power of two).
    ///
    /// All cells start at 0.0.
    pub fn new(generation: u64, producer_count: usize, window_samples: usize) -> Self {
        let capacity = window_samples.max(1).next_power_of_two();
        let lanes = (0..producer_count)
            .map(|_| ProducerLane {
                cells: (0..SIGNAL_COUNT * capacity)
                    .map(|_| AtomicU32::new(0))
                    .collect(),
            })
            .collect();
        Self {
            generation,
            capacity,
            index_mask: capacity as u64 - 1,
            lanes,
        }
    }

    /// Generation tag assigned at the last chain rebuild.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Ring capacity in samples (power of two).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of producer lanes.
    #[inline]
    pub fn producer_count(&self) -> usize {
        self.lanes.len()
    }

    /// Write one sample of `signal` at `sample_time` into `lane`.
    ///
    /// Writes with negative time are dropped; out-of-range lanes are a
    /// wiring bug and are dropped the same way. Wraps at the ring capacity.
    #[inline]
    pub fn write(&self, lane: usize, signal: AnalysisSignal, sample_time: i64, value: f32) {
        if sample_time < 0 {
            return;
        }
        let Some(lane) = self.lanes.get(lane) else {
            return;
        };
        let slot = (sample_time as u64 & self.index_mask) as usize;
        lane.cells[signal.index() * self.capacity + slot]
            .store(value.to_bits(), Ordering::Relaxed);
    }

    /// Read one sample of `signal` at `sample_time` from `lane`.
    ///
    /// Returns 0.0 for negative times or out-of-range lanes. There is no
    /// freshness check: whatever the cell holds is returned.
    #[inline]
    pub fn read(&self, lane: usize, signal: AnalysisSignal, sample_time: i64) -> f32 {
        if sample_time < 0 {
            return 0.0;
        }
        let Some(lane) = self.lanes.get(lane) else {
            return 0.0;
        };
        let slot = (sample_time as u64 & self.index_mask) as usize;
        f32::from_bits(lane.cells[signal.index() * self.capacity + slot].load(Ordering::Relaxed))
    }
}

/// The set of signals some downstream consumer currently demands.
///
/// The UI and the analysis orchestrator update this bitmap; producers read
/// it each block and skip compute paths nothing is asking for.
#[derive(Debug, Default)]
pub struct RequestedSignals {
    bits: AtomicU32,
}

impl RequestedSignals {
    /// No demand.
    pub const fn new() -> Self {
        Self {
            bits: AtomicU32::new(0),
        }
    }

    /// Replace the demand set.
    pub fn set(&self, mask: SignalMask) {
        self.bits.store(u32::from(mask.0), Ordering::Release);
    }

    /// Add signals to the demand set.
    pub fn insert(&self, mask: SignalMask) {
        self.bits.fetch_or(u32::from(mask.0), Ordering::AcqRel);
    }

    /// Remove signals from the demand set.
    pub fn remove(&self, mask: SignalMask) {
        self.bits.fetch_and(!u32::from(mask.0), Ordering::AcqRel);
    }

    /// Current demand set.
    pub fn get(&self) -> SignalMask {
        SignalMask(self.bits.load(Ordering::Acquire) as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_rounds_to_power_of_two() {
        let bus = SignalBus::new(1, 1, 3000);
        assert_eq!(bus.capacity(), 4096);
        assert_eq!(bus.generation(), 1);
        assert_eq!(bus.producer_count(), 1);
    }

    #[test]
    fn write_read_roundtrip_at_sample_time() {
        let bus = SignalBus::new(0, 2, 1024);
        bus.write(1, AnalysisSignal::VoicingScore, 777, 0.85);
        assert_eq!(bus.read(1, AnalysisSignal::VoicingScore, 777), 0.85);
        // Other lanes and signals are untouched.
        assert_eq!(bus.read(0, AnalysisSignal::VoicingScore, 777), 0.0);
        assert_eq!(bus.read(1, AnalysisSignal::PitchHz, 777), 0.0);
    }

    #[test]
    fn wraparound_aliases_old_cells() {
        let bus = SignalBus::new(0, 1, 16);
        let cap = bus.capacity() as i64;
        bus.write(0, AnalysisSignal::SpectralFlux, 5, 1.0);
        // Same ring slot one revolution later.
        assert_eq!(bus.read(0, AnalysisSignal::SpectralFlux, 5 + cap), 1.0);
        bus.write(0, AnalysisSignal::SpectralFlux, 5 + cap, 2.0);
        assert_eq!(bus.read(0, AnalysisSignal::SpectralFlux, 5), 2.0);
    }

    #[test]
    fn negative_time_is_dropped() {
        let bus = SignalBus::new(0, 1, 16);
        bus.write(0, AnalysisSignal::PitchHz, -1, 440.0);
        assert_eq!(bus.read(0, AnalysisSignal::PitchHz, -1), 0.0);
        for t in 0..bus.capacity() as i64 {
            assert_eq!(bus.read(0, AnalysisSignal::PitchHz, t), 0.0);
        }
    }

    #[test]
    fn out_of_range_lane_is_silent() {
        let bus = SignalBus::new(0, 1, 16);
        bus.write(5, AnalysisSignal::PitchHz, 0, 440.0);
        assert_eq!(bus.read(5, AnalysisSignal::PitchHz, 0), 0.0);
    }

    #[test]
    fn requested_signals_updates() {
        let req = RequestedSignals::new();
        assert!(req.get().is_empty());

        req.insert(AnalysisSignal::PitchHz.bit());
        req.insert(AnalysisSignal::VoicingScore.bit());
        assert!(req.get().contains(AnalysisSignal::PitchHz));
        assert!(req.get().contains(AnalysisSignal::VoicingScore));

        req.remove(AnalysisSignal::PitchHz.bit());
        assert!(!req.get().contains(AnalysisSignal::PitchHz));

        req.set(SignalMask::EMPTY);
        assert!(req.get().is_empty());
    }
}
