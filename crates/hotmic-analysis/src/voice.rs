//! Speech-feature extraction: presence, voicing, fricatives, formants.
//!
//! Everything here is derived from one magnitude spectrum of the analysis
//! window plus the periodicity measured by the pitch tracker. The estimates
//! are deliberately simple band-energy heuristics; the engine only promises
//! "produce signal X from a window", not a particular algorithm.

use crate::fft::{Fft, Window};
use crate::pitch::PitchEstimate;

/// Band edges in Hz.
const VOICE_BAND: (f32, f32) = (80.0, 1000.0);
const FRICATIVE_BAND: (f32, f32) = (2000.0, 8000.0);
const SIBILANCE_BAND: (f32, f32) = (4000.0, 10000.0);
const F1_RANGE: (f32, f32) = (200.0, 1000.0);
const F2_RANGE: (f32, f32) = (800.0, 2800.0);
const F3_RANGE: (f32, f32) = (1700.0, 4000.0);

/// RMS below this is treated as silence.
const PRESENCE_FLOOR: f32 = 1e-4;

/// One window's worth of voice features.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VoiceFeatures {
    /// Probability speech is present at all, in [0, 1].
    pub speech_presence: f32,
    /// Continuous voicing score in [0, 1].
    pub voicing_score: f32,
    /// Quantized voicing: 0 unvoiced, 1 mixed, 2 voiced.
    pub voicing_state: f32,
    /// Fricative-band activity relative to total energy.
    pub fricative_activity: f32,
    /// Sibilance-band energy relative to total energy.
    pub sibilance_energy: f32,
    /// Formant estimates in Hz (0 when not found).
    pub formant_f1: f32,
    /// Second formant.
    pub formant_f2: f32,
    /// Third formant.
    pub formant_f3: f32,
    /// Confidence of the formant estimates, in [0, 1].
    pub formant_confidence: f32,
}

/// Band-energy voice analyzer over a fixed window size.
pub struct VoiceAnalyzer {
    fft: Fft,
    magnitudes: Vec<f32>,
    smoothed: Vec<f32>,
    sample_rate: f32,
}

impl VoiceAnalyzer {
    /// Create an analyzer for `window_size` samples at `sample_rate`.
    pub fn new(sample_rate: f32, window_size: usize) -> Self {
        let fft = Fft::new(window_size.max(2).next_power_of_two());
        let bins = fft.bins();
        Self {
            fft,
            magnitudes: vec![0.0; bins],
            smoothed: vec![0.0; bins],
            sample_rate,
        }
    }

    /// Extract features from one analysis window.
    ///
    /// `pitch` is the tracker's estimate for the same window; its
    /// confidence doubles as the periodicity cue for voicing.
    pub fn analyze(&mut self, window: &[f32], pitch: &PitchEstimate) -> VoiceFeatures {
        let rms = (window.iter().map(|s| s * s).sum::<f32>() / window.len().max(1) as f32).sqrt();
        if rms < PRESENCE_FLOOR {
            return VoiceFeatures::default();
        }

        self.fft
            .forward_magnitudes(window, Window::Hann, &mut self.magnitudes);

        let total: f32 = self.magnitudes.iter().map(|m| m * m).sum::<f32>().max(1e-12);
        let voice = self.band_energy(VOICE_BAND) / total;
        let fricative = self.band_energy(FRICATIVE_BAND) / total;
        let sibilance = self.band_energy(SIBILANCE_BAND) / total;

        // Presence: enough level and the energy looks speech-shaped
        // (either a voiced low band or a fricative high band).
        let level = ((rms / PRESENCE_FLOOR).log10() / 3.0).clamp(0.0, 1.0);
        let shape = (voice + fricative).clamp(0.0, 1.0);
        let speech_presence = (level * (0.25 + 0.75 * shape)).clamp(0.0, 1.0);

        // Voicing: periodicity dominates, low-band energy supports.
        let voicing_score = (0.7 * pitch.confidence + 0.3 * voice.min(1.0)).clamp(0.0, 1.0);
        let voicing_state = if voicing_score > 0.6 {
            2.0
        } else if voicing_score > 0.3 {
            1.0
        } else {
            0.0
        };

        let (f1, f2, f3, formant_confidence) = self.estimate_formants(voicing_score);

        VoiceFeatures {
            speech_presence,
            voicing_score,
            voicing_state,
            fricative_activity: fricative.clamp(0.0, 1.0),
            sibilance_energy: sibilance.clamp(0.0, 1.0),
            formant_f1: f1,
            formant_f2: f2,
            formant_f3: f3,
            formant_confidence,
        }
    }

    fn bin_hz(&self) -> f32 {
        self.sample_rate / self.fft.size() as f32
    }

    fn band_energy(&self, band: (f32, f32)) -> f32 {
        let bin_hz = self.bin_hz();
        let lo = (band.0 / bin_hz) as usize;
        let hi = ((band.1 / bin_hz) as usize).min(self.magnitudes.len().saturating_sub(1));
        if lo >= hi {
            return 0.0;
        }
        self.magnitudes[lo..=hi].iter().map(|m| m * m).sum()
    }

    /// Pick the strongest smoothed-spectrum peak inside each formant range.
    fn estimate_formants(&mut self, voicing_score: f32) -> (f32, f32, f32, f32) {
        // Formants only mean anything on voiced frames.
        if voicing_score < 0.3 {
            return (0.0, 0.0, 0.0, 0.0);
        }

        // 3-bin moving average knocks down harmonic ripple.
        let n = self.magnitudes.len();
        for i in 0..n {
            let a = self.magnitudes[i.saturating_sub(1)];
            let b = self.magnitudes[i];
            let c = self.magnitudes[(i + 1).min(n - 1)];
            self.smoothed[i] = (a + b + c) / 3.0;
        }

        let f1 = self.peak_in_range(F1_RANGE, 0.0);
        let f2 = self.peak_in_range(F2_RANGE, f1 + 150.0);
        let f3 = self.peak_in_range(F3_RANGE, f2 + 150.0);

        let found = [f1, f2, f3].iter().filter(|&&f| f > 0.0).count();
        let confidence = voicing_score * found as f32 / 3.0;
        (f1, f2, f3, confidence)
    }

    fn peak_in_range(&self, range: (f32, f32), above_hz: f32) -> f32 {
        let bin_hz = self.bin_hz();
        let lo = ((range.0.max(above_hz) / bin_hz) as usize).max(1);
        let hi = ((range.1 / bin_hz) as usize).min(self.smoothed.len().saturating_sub(2));
        if lo >= hi {
            return 0.0;
        }
        let mut best = 0usize;
        let mut best_val = 0.0_f32;
        for i in lo..=hi {
            let v = self.smoothed[i];
            if v > best_val && v >= self.smoothed[i - 1] && v >= self.smoothed[i + 1] {
                best_val = v;
                best = i;
            }
        }
        if best == 0 { 0.0 } else { best as f32 * bin_hz }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    /// Crude voiced-vowel stand-in: fundamental plus formant-ish partials.
    fn voiced_frame(sample_rate: f32, len: usize) -> Vec<f32> {
        let f0 = 120.0;
        (0..len)
            .map(|i| {
                let t = i as f32 / sample_rate;
                0.5 * (2.0 * PI * f0 * t).sin()
                    + 0.3 * (2.0 * PI * 600.0 * t).sin()
                    + 0.2 * (2.0 * PI * 1200.0 * t).sin()
            })
            .collect()
    }

    fn noise_frame(len: usize) -> Vec<f32> {
        let mut state = 0xdeadbeef_u32;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1664525).wrapping_add(1013904223);
                0.3 * ((state >> 8) as f32 / 8388608.0 - 1.0)
            })
            .collect()
    }

    #[test]
    fn silence_yields_no_features() {
        let mut analyzer = VoiceAnalyzer::new(48000.0, 2048);
        let features = analyzer.analyze(&vec![0.0; 2048], &PitchEstimate::default());
        assert_eq!(features, VoiceFeatures::default());
    }

    #[test]
    fn voiced_frame_scores_voiced() {
        let mut analyzer = VoiceAnalyzer::new(48000.0, 2048);
        let pitch = PitchEstimate {
            pitch_hz: 120.0,
            confidence: 0.9,
            hnr_db: 12.0,
        };
        let features = analyzer.analyze(&voiced_frame(48000.0, 2048), &pitch);
        assert!(features.speech_presence > 0.3);
        assert!(features.voicing_score > 0.6, "{}", features.voicing_score);
        assert_eq!(features.voicing_state, 2.0);
        assert!(features.formant_f1 > 0.0);
        assert!(features.formant_confidence > 0.0);
    }

    #[test]
    fn noise_frame_scores_unvoiced_with_high_bands() {
        let mut analyzer = VoiceAnalyzer::new(48000.0, 2048);
        let features = analyzer.analyze(&noise_frame(2048), &PitchEstimate::default());
        assert!(features.voicing_score < 0.3, "{}", features.voicing_score);
        assert_eq!(features.voicing_state, 0.0);
        assert!(features.sibilance_energy > 0.0);
        // Unvoiced frames carry no formants.
        assert_eq!(features.formant_f1, 0.0);
    }

    #[test]
    fn formants_are_ordered() {
        let mut analyzer = VoiceAnalyzer::new(48000.0, 2048);
        let pitch = PitchEstimate {
            pitch_hz: 120.0,
            confidence: 0.9,
            hnr_db: 12.0,
        };
        let features = analyzer.analyze(&voiced_frame(48000.0, 2048), &pitch);
        if features.formant_f2 > 0.0 {
            assert!(features.formant_f2 > features.formant_f1);
        }
        if features.formant_f3 > 0.0 {
            assert!(features.formant_f3 > features.formant_f2);
        }
    }
}
