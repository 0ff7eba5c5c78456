//! Autocorrelation pitch tracking.
//!
//! FFT-based autocorrelation over the analysis window, peak-picked in the
//! speech range. Confidence is the normalized autocorrelation at the pitch
//! lag; the same peak yields a harmonics-to-noise estimate. The engine
//! treats this as an opaque block: window in, estimate out.

use hotmic_core::math::linear_to_db;

use crate::fft::Fft;

/// Lowest trackable fundamental in Hz.
const MIN_PITCH_HZ: f32 = 50.0;
/// Highest trackable fundamental in Hz.
const MAX_PITCH_HZ: f32 = 500.0;
/// Normalized autocorrelation below this is reported as unvoiced.
const VOICED_THRESHOLD: f32 = 0.30;

/// One pitch measurement.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PitchEstimate {
    /// Fundamental frequency in Hz; 0.0 when unvoiced.
    pub pitch_hz: f32,
    /// Normalized autocorrelation at the pitch lag, in [0, 1].
    pub confidence: f32,
    /// Harmonics-to-noise ratio in dB (0 when unvoiced).
    pub hnr_db: f32,
}

/// Autocorrelation pitch tracker for a fixed window size.
pub struct PitchTracker {
    fft: Fft,
    acf: Vec<f32>,
    sample_rate: f32,
    min_lag: usize,
    max_lag: usize,
}

impl PitchTracker {
    /// Create a tracker for `window_size` samples at `sample_rate`.
    pub fn new(sample_rate: f32, window_size: usize) -> Self {
        // Double-length FFT keeps the interesting lags alias-free.
        let fft = Fft::new((window_size * 2).next_power_of_two());
        let max_lag = (sample_rate / MIN_PITCH_HZ).ceil() as usize;
        let min_lag = (sample_rate / MAX_PITCH_HZ).floor().max(1.0) as usize;
        Self {
            acf: vec![0.0; max_lag + 2],
            fft,
            sample_rate,
            min_lag,
            max_lag,
        }
    }

    /// Estimate the pitch of one analysis window.
    pub fn analyze(&mut self, window: &[f32]) -> PitchEstimate {
        self.fft.autocorrelate(window, &mut self.acf);
        let r0 = self.acf[0];
        if r0 <= 1e-9 {
            return PitchEstimate::default();
        }

        // Strongest normalized peak in the candidate lag range.
        let hi = self.max_lag.min(self.acf.len() - 2);
        let mut best_lag = 0usize;
        let mut best_val = 0.0_f32;
        for lag in self.min_lag..=hi {
            let v = self.acf[lag];
            // Local maximum only; shoulders of the lag-0 peak don't count.
            if v > best_val && v >= self.acf[lag - 1] && v >= self.acf[lag + 1] {
                best_val = v;
                best_lag = lag;
            }
        }
        if best_lag == 0 {
            return PitchEstimate::default();
        }

        let confidence = (best_val / r0).clamp(0.0, 1.0);
        if confidence < VOICED_THRESHOLD {
            return PitchEstimate::default();
        }

        // Parabolic interpolation around the peak for sub-sample lag.
        let (a, b, c) = (
            self.acf[best_lag - 1],
            self.acf[best_lag],
            self.acf[best_lag + 1],
        );
        let denom = a - 2.0 * b + c;
        let offset = if denom.abs() > 1e-12 {
            (0.5 * (a - c) / denom).clamp(-0.5, 0.5)
        } else {
            0.0
        };
        let lag = best_lag as f32 + offset;

        // Periodic-to-aperiodic energy ratio at the pitch lag.
        let periodic = confidence.min(0.999);
        let hnr_db = linear_to_db((periodic / (1.0 - periodic)).sqrt());

        PitchEstimate {
            pitch_hz: self.sample_rate / lag,
            confidence,
            hnr_db,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn tone(sample_rate: f32, freq: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn tracks_a_pure_tone() {
        let mut tracker = PitchTracker::new(48000.0, 2048);
        let est = tracker.analyze(&tone(48000.0, 220.0, 2048));
        assert!(
            (est.pitch_hz - 220.0).abs() < 3.0,
            "pitch {}",
            est.pitch_hz
        );
        assert!(est.confidence > 0.8, "confidence {}", est.confidence);
        assert!(est.hnr_db > 6.0, "hnr {}", est.hnr_db);
    }

    #[test]
    fn tracks_a_low_voice_fundamental() {
        let mut tracker = PitchTracker::new(48000.0, 2048);
        let est = tracker.analyze(&tone(48000.0, 110.0, 2048));
        assert!((est.pitch_hz - 110.0).abs() < 2.0, "pitch {}", est.pitch_hz);
    }

    #[test]
    fn silence_is_unvoiced() {
        let mut tracker = PitchTracker::new(48000.0, 2048);
        let est = tracker.analyze(&vec![0.0; 2048]);
        assert_eq!(est, PitchEstimate::default());
    }

    #[test]
    fn noise_has_low_confidence() {
        let mut tracker = PitchTracker::new(48000.0, 2048);
        // Deterministic pseudo-noise.
        let mut state = 0x12345678_u32;
        let noise: Vec<f32> = (0..2048)
            .map(|_| {
                state = state.wrapping_mul(1664525).wrapping_add(1013904223);
                (state >> 8) as f32 / 8388608.0 - 1.0
            })
            .collect();
        let est = tracker.analyze(&noise);
        assert!(
            est.confidence < 0.5,
            "noise confidence {}",
            est.confidence
        );
    }
}
