//! Spectral flux and onset detection.
//!
//! Flux is the half-wave-rectified frame-to-frame spectral difference; the
//! high-band variant restricted to the upper spectrum responds to
//! consonant onsets and transients rather than pitch movement.

use crate::fft::{Fft, Window};

/// Fraction of the spectrum (from the top) that counts as the high band.
const HIGH_BAND_FRACTION: f32 = 0.5;

/// Frame-to-frame spectral flux analyzer.
pub struct FluxAnalyzer {
    fft: Fft,
    magnitudes: Vec<f32>,
    previous: Vec<f32>,
    primed: bool,
}

/// One frame of flux measurements.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FluxFrame {
    /// Full-band spectral flux, normalized by bin count.
    pub flux: f32,
    /// High-band flux (onset indicator), normalized by bin count.
    pub onset_high: f32,
}

impl FluxAnalyzer {
    /// Create an analyzer for windows of `window_size` samples.
    pub fn new(window_size: usize) -> Self {
        let fft = Fft::new(window_size.max(2).next_power_of_two());
        let bins = fft.bins();
        Self {
            fft,
            magnitudes: vec![0.0; bins],
            previous: vec![0.0; bins],
            primed: false,
        }
    }

    /// Analyze one window and return its flux frame.
    ///
    /// The first call only primes the previous-frame state and reports
    /// zero flux.
    pub fn analyze(&mut self, window: &[f32]) -> FluxFrame {
        self.fft
            .forward_magnitudes(window, Window::Hann, &mut self.magnitudes);

        let frame = if self.primed {
            let bins = self.magnitudes.len();
            let high_start = ((bins as f32) * (1.0 - HIGH_BAND_FRACTION)) as usize;

            let mut flux = 0.0_f32;
            let mut high = 0.0_f32;
            for (i, (&cur, &prev)) in self
                .magnitudes
                .iter()
                .zip(self.previous.iter())
                .enumerate()
            {
                let diff = cur - prev;
                if diff > 0.0 {
                    let d2 = diff * diff;
                    flux += d2;
                    if i >= high_start {
                        high += d2;
                    }
                }
            }
            FluxFrame {
                flux: (flux / bins as f32).sqrt(),
                onset_high: (high / (bins - high_start).max(1) as f32).sqrt(),
            }
        } else {
            self.primed = true;
            FluxFrame::default()
        };

        self.previous.copy_from_slice(&self.magnitudes);
        frame
    }

    /// Forget the previous frame.
    pub fn reset(&mut self) {
        self.previous.fill(0.0);
        self.primed = false;
    }
}
