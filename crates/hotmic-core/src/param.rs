//! Parameter smoothing for zipper-free changes.
//!
//! Gain and plugin parameters must not jump between blocks: a step change
//! produces an audible click. [`SmoothedParam`] is a one-pole exponential
//! smoother advanced once per sample; [`GainSmoother`] layers the dB→linear
//! conversion on top for channel gain stages.

use libm::expf;

use crate::math::db_to_linear;

/// A parameter with one-pole exponential smoothing.
///
/// The difference equation is `y[n] = y[n-1] + coeff * (target - y[n-1])`,
/// a first-order IIR with pole at `(1 - coeff)`. The time constant tau
/// (time to reach 63.2% of the target) relates to the coefficient by
/// `coeff = 1 - exp(-1 / (tau * sample_rate))`; after `5 * tau` the value
/// is within 0.7% of the target, settled for audio purposes.
#[derive(Debug, Clone)]
pub struct SmoothedParam {
    current: f32,
    target: f32,
    coeff: f32,
    sample_rate: f32,
    smoothing_time_ms: f32,
}

impl SmoothedParam {
    /// Create a smoothed parameter with an initial value and no smoothing.
    pub fn new(initial: f32) -> Self {
        Self {
            current: initial,
            target: initial,
            coeff: 1.0,
            sample_rate: 48000.0,
            smoothing_time_ms: 0.0,
        }
    }

    /// Create with full configuration.
    pub fn with_config(initial: f32, sample_rate: f32, smoothing_time_ms: f32) -> Self {
        let mut param = Self::new(initial);
        param.sample_rate = sample_rate;
        param.smoothing_time_ms = smoothing_time_ms;
        param.recalculate_coeff();
        param
    }

    /// Set the target value; the output approaches it exponentially.
    #[inline]
    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    /// Set and snap to a value with no smoothing.
    #[inline]
    pub fn set_immediate(&mut self, value: f32) {
        self.target = value;
        self.current = value;
    }

    /// Update the sample rate and recalculate the coefficient.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.recalculate_coeff();
    }

    /// Set the smoothing time constant in milliseconds.
    pub fn set_smoothing_time_ms(&mut self, time_ms: f32) {
        self.smoothing_time_ms = time_ms;
        self.recalculate_coeff();
    }

    /// Advance by one sample and return the smoothed value.
    #[inline]
    pub fn advance(&mut self) -> f32 {
        self.current += self.coeff * (self.target - self.current);
        self.current
    }

    /// Current smoothed value without advancing.
    #[inline]
    pub fn get(&self) -> f32 {
        self.current
    }

    /// Target value.
    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    /// Whether the value has effectively reached the target.
    #[inline]
    pub fn is_settled(&self) -> bool {
        (self.current - self.target).abs() < 1e-6
    }

    /// Jump to the target immediately.
    #[inline]
    pub fn snap_to_target(&mut self) {
        self.current = self.target;
    }

    fn recalculate_coeff(&mut self) {
        if self.smoothing_time_ms <= 0.0 || self.sample_rate <= 0.0 {
            self.coeff = 1.0;
        } else {
            let samples = self.smoothing_time_ms / 1000.0 * self.sample_rate;
            self.coeff = 1.0 - expf(-1.0 / samples);
        }
    }
}

impl Default for SmoothedParam {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Channel gain stage: a dB-domain target smoothed in the linear domain.
///
/// The UI and the parameter bridge talk in decibels; the audio thread
/// multiplies samples by the smoothed linear gain. A 5 ms time constant
/// settles well under the 30 ms budget for steady-state gain accuracy.
#[derive(Debug, Clone)]
pub struct GainSmoother {
    linear: SmoothedParam,
    target_db: f32,
}

/// Default smoothing time constant for gain stages.
const GAIN_SMOOTHING_MS: f32 = 5.0;

impl GainSmoother {
    /// Create a gain smoother at the given dB value.
    pub fn new(initial_db: f32, sample_rate: f32) -> Self {
        Self {
            linear: SmoothedParam::with_config(
                db_to_linear(initial_db),
                sample_rate,
                GAIN_SMOOTHING_MS,
            ),
            target_db: initial_db,
        }
    }

    /// Set the dB target. Clamping to a legal range is the caller's job.
    #[inline]
    pub fn set_target_db(&mut self, db: f32) {
        self.target_db = db;
        self.linear.set_target(db_to_linear(db));
    }

    /// Current dB target.
    #[inline]
    pub fn target_db(&self) -> f32 {
        self.target_db
    }

    /// Snap to the target (preset load / engine reset).
    #[inline]
    pub fn snap(&mut self) {
        self.linear.snap_to_target();
    }

    /// Update the sample rate.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.linear.set_sample_rate(sample_rate);
    }

    /// Apply the smoothed gain to a block in place.
    #[inline]
    pub fn apply(&mut self, buffer: &mut [f32]) {
        if self.linear.is_settled() {
            // Steady state: one multiply per sample, no smoother advance.
            let g = self.linear.get();
            if (g - 1.0).abs() > 1e-9 {
                for s in buffer.iter_mut() {
                    *s *= g;
                }
            }
        } else {
            for s in buffer.iter_mut() {
                *s *= self.linear.advance();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smoothed_param_instant_when_no_smoothing() {
        let mut param = SmoothedParam::new(1.0);
        param.set_target(0.5);
        assert!((param.advance() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn smoothed_param_converges() {
        let mut param = SmoothedParam::with_config(0.0, 48000.0, 10.0);
        param.set_target(1.0);
        for _ in 0..(48000 * 50 / 1000) {
            param.advance();
        }
        assert!((param.get() - 1.0).abs() < 0.01, "got {}", param.get());
    }

    #[test]
    fn smoothed_param_one_time_constant() {
        let mut param = SmoothedParam::with_config(0.0, 48000.0, 10.0);
        param.set_target(1.0);
        for _ in 0..480 {
            param.advance();
        }
        let expected = 1.0 - expf(-1.0);
        assert!(
            (param.get() - expected).abs() < 0.05,
            "expected ~{expected}, got {}",
            param.get()
        );
    }

    #[test]
    fn gain_smoother_settles_within_30ms() {
        let mut gain = GainSmoother::new(0.0, 48000.0);
        gain.set_target_db(-6.0);

        // Run 30 ms of blocks.
        let mut buf = [1.0_f32; 256];
        let blocks = 48000 * 30 / 1000 / 256 + 1;
        for _ in 0..blocks {
            buf.fill(1.0);
            gain.apply(&mut buf);
        }

        // Steady state: every sample scaled by ~0.5012.
        buf.fill(1.0);
        gain.apply(&mut buf);
        let expected = db_to_linear(-6.0);
        for &s in &buf {
            assert!((s - expected).abs() < expected * 0.01, "got {s}");
        }
    }

    #[test]
    fn gain_smoother_unity_is_identity() {
        let mut gain = GainSmoother::new(0.0, 48000.0);
        let mut buf = [0.25_f32, -0.5, 1.0, 0.0];
        let original = buf;
        gain.apply(&mut buf);
        assert_eq!(buf, original);
    }
}
