//! Per-slot spectral delta: what did this plugin change, spectrally?
//!
//! Each slot keeps a pre-process copy of its block; when a visualizer asks
//! for it, the magnitude spectra of input and output are compared and a
//! single normalized difference scalar is published. The FFT pair only
//! runs while the `enabled` flag is set, mirroring the demand-driven
//! analysis policy everywhere else in the engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use hotmic_analysis::fft::{Fft, Window};
use hotmic_core::atomic::AtomicF32;

/// Shared reader handle for one slot's spectral delta.
#[derive(Debug, Default)]
pub struct SpectralDeltaCell {
    enabled: AtomicBool,
    value: AtomicF32,
}

impl SpectralDeltaCell {
    /// Ask for (or stop asking for) this slot's delta.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Whether a reader currently wants the delta.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Latest normalized spectral difference, in [0, 1]-ish range.
    pub fn value(&self) -> f32 {
        self.value.get()
    }
}

/// Audio-side spectral-delta scratch for one slot.
pub struct SpectralDelta {
    cell: Arc<SpectralDeltaCell>,
    fft: Fft,
    pre: Vec<f32>,
    pre_mags: Vec<f32>,
    post_mags: Vec<f32>,
}

impl SpectralDelta {
    /// Allocate scratch for `block_size` samples.
    pub fn new(block_size: usize) -> Self {
        let fft = Fft::new(block_size.max(2).next_power_of_two());
        let bins = fft.bins();
        Self {
            cell: Arc::new(SpectralDeltaCell::default()),
            fft,
            pre: vec![0.0; block_size],
            pre_mags: vec![0.0; bins],
            post_mags: vec![0.0; bins],
        }
    }

    /// Shared handle for readers.
    pub fn cell(&self) -> Arc<SpectralDeltaCell> {
        Arc::clone(&self.cell)
    }

    /// Snapshot the slot's input. Cheap copy, taken only while enabled.
    pub fn capture_pre(&mut self, buffer: &[f32]) {
        let n = buffer.len().min(self.pre.len());
        self.pre[..n].copy_from_slice(&buffer[..n]);
    }

    /// Compare the processed block against the snapshot and publish.
    pub fn compute(&mut self, post: &[f32]) {
        self.fft
            .forward_magnitudes(&self.pre, Window::Hann, &mut self.pre_mags);
        self.fft
            .forward_magnitudes(post, Window::Hann, &mut self.post_mags);

        let mut diff = 0.0_f32;
        let mut reference = 0.0_f32;
        for (a, b) in self.pre_mags.iter().zip(self.post_mags.iter()) {
            diff += (a - b).abs();
            reference += a.abs().max(b.abs());
        }
        let value = if reference > 1e-9 { diff / reference } else { 0.0 };
        self.cell.value.set(value);
    }

    /// Whether the reader side currently wants deltas.
    pub fn is_enabled(&self) -> bool {
        self.cell.is_enabled()
    }

    /// Zero the published value.
    pub fn reset(&mut self) {
        self.cell.value.set(0.0);
    }
}
