//! Master-section loudness metering (ITU-R BS.1770 / EBU R128).
//!
//! K-weighted loudness with momentary (400 ms), short-term (3 s), and
//! gated integrated measurements. Gating blocks are the standard 400 ms
//! windows at 75% overlap; the integrated relative gate is computed from a
//! fixed-bin power histogram, so the meter's memory footprint is constant
//! and the audio thread never allocates.

use std::sync::Arc;

use hotmic_core::atomic::AtomicF32;

/// 100 ms steps per momentary window (400 ms).
const MOMENTARY_BLOCKS: usize = 4;
/// 100 ms steps per short-term window (3 s).
const SHORT_TERM_BLOCKS: usize = 30;
/// Absolute gate in LUFS.
const ABSOLUTE_GATE_LUFS: f64 = -70.0;
/// Relative gate below the ungated mean, in LU.
const RELATIVE_GATE_LU: f64 = 10.0;
/// Histogram range and resolution: [-70, 0) LUFS at 0.1 LU per bin.
const HISTOGRAM_BINS: usize = 700;
const HISTOGRAM_MIN_LUFS: f64 = -70.0;
const HISTOGRAM_LU_PER_BIN: f64 = 0.1;
/// Reported when no signal has passed the gate.
const SILENCE_LUFS: f32 = -70.0;

/// One stage of the K-weighting filter (direct form II transposed).
#[derive(Debug, Clone, Copy, Default)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    z1: f64,
    z2: f64,
}

impl Biquad {
    #[inline]
    fn process(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        y
    }

    fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    /// BS.1770 stage 1: high shelf, +4 dB above ~1.68 kHz.
    fn k_shelf(sample_rate: f64) -> Self {
        let f0 = 1681.974450955533;
        let gain_db = 3.999843853973347;
        let q = 0.7071752369554196;

        let k = (std::f64::consts::PI * f0 / sample_rate).tan();
        let vh = 10.0_f64.powf(gain_db / 20.0);
        let vb = vh.powf(0.4996667741545416);
        let denom = 1.0 + k / q + k * k;
        Self {
            b0: (vh + vb * k / q + k * k) / denom,
            b1: 2.0 * (k * k - vh) / denom,
            b2: (vh - vb * k / q + k * k) / denom,
            a1: 2.0 * (k * k - 1.0) / denom,
            a2: (1.0 - k / q + k * k) / denom,
            z1: 0.0,
            z2: 0.0,
        }
    }

    /// BS.1770 stage 2: highpass below ~38 Hz.
    fn k_highpass(sample_rate: f64) -> Self {
        let f0 = 38.13547087602444;
        let q = 0.5003270373238773;

        let k = (std::f64::consts::PI * f0 / sample_rate).tan();
        let denom = 1.0 + k / q + k * k;
        Self {
            b0: 1.0 / denom,
            b1: -2.0 / denom,
            b2: 1.0 / denom,
            a1: 2.0 * (k * k - 1.0) / denom,
            a2: (1.0 - k / q + k * k) / denom,
            z1: 0.0,
            z2: 0.0,
        }
    }
}

/// Per-side K-weighting chain.
#[derive(Debug, Clone, Copy)]
struct KWeighting {
    shelf: Biquad,
    highpass: Biquad,
}

impl KWeighting {
    fn new(sample_rate: f64) -> Self {
        Self {
            shelf: Biquad::k_shelf(sample_rate),
            highpass: Biquad::k_highpass(sample_rate),
        }
    }

    #[inline]
    fn process(&mut self, x: f64) -> f64 {
        self.highpass.process(self.shelf.process(x))
    }

    fn reset(&mut self) {
        self.shelf.reset();
        self.highpass.reset();
    }
}

/// Atomically published loudness values, shared with readers.
#[derive(Debug, Default)]
pub struct LufsCell {
    momentary: AtomicF32,
    short_term: AtomicF32,
    integrated: AtomicF32,
}

impl LufsCell {
    /// New cell at silence.
    pub const fn new() -> Self {
        Self {
            momentary: AtomicF32::new(SILENCE_LUFS),
            short_term: AtomicF32::new(SILENCE_LUFS),
            integrated: AtomicF32::new(SILENCE_LUFS),
        }
    }

    /// Momentary loudness (400 ms window) in LUFS.
    pub fn momentary(&self) -> f32 {
        self.momentary.get()
    }

    /// Short-term loudness (3 s window) in LUFS.
    pub fn short_term(&self) -> f32 {
        self.short_term.get()
    }

    /// Gated integrated loudness in LUFS.
    pub fn integrated(&self) -> f32 {
        self.integrated.get()
    }

    /// Reset published values to silence.
    pub fn clear(&self) {
        self.momentary.set(SILENCE_LUFS);
        self.short_term.set(SILENCE_LUFS);
        self.integrated.set(SILENCE_LUFS);
    }
}

/// Audio-side LUFS meter state.
pub struct LufsMeter {
    cell: Arc<LufsCell>,
    filter_left: KWeighting,
    filter_right: KWeighting,
    /// Samples per 100 ms step.
    step_samples: usize,
    /// Running power accumulator for the current step.
    step_power: f64,
    step_filled: usize,
    /// Last MOMENTARY/SHORT_TERM 100 ms step powers.
    momentary_ring: [f64; MOMENTARY_BLOCKS],
    short_term_ring: [f64; SHORT_TERM_BLOCKS],
    steps_written: usize,
    /// Gated-power histogram for the integrated measurement.
    histogram_counts: Vec<u32>,
    histogram_power: Vec<f64>,
}

impl LufsMeter {
    /// Create a meter for the session sample rate.
    pub fn new(sample_rate: f32) -> Self {
        Self {
            cell: Arc::new(LufsCell::new()),
            filter_left: KWeighting::new(f64::from(sample_rate)),
            filter_right: KWeighting::new(f64::from(sample_rate)),
            step_samples: (sample_rate / 10.0) as usize,
            step_power: 0.0,
            step_filled: 0,
            momentary_ring: [0.0; MOMENTARY_BLOCKS],
            short_term_ring: [0.0; SHORT_TERM_BLOCKS],
            steps_written: 0,
            histogram_counts: vec![0; HISTOGRAM_BINS],
            histogram_power: vec![0.0; HISTOGRAM_BINS],
        }
    }

    /// Shared handle for readers.
    pub fn cell(&self) -> Arc<LufsCell> {
        Arc::clone(&self.cell)
    }

    /// Feed one stereo block.
    pub fn process_block(&mut self, left: &[f32], right: &[f32]) {
        for i in 0..left.len().min(right.len()) {
            let l = self.filter_left.process(f64::from(left[i]));
            let r = self.filter_right.process(f64::from(right[i]));
            // Stereo channel weights are both 1.0 in BS.1770.
            self.step_power += l * l + r * r;
            self.step_filled += 1;
            if self.step_filled >= self.step_samples {
                let mean = self.step_power / self.step_samples as f64;
                self.finish_step(mean);
                self.step_power = 0.0;
                self.step_filled = 0;
            }
        }
    }

    fn finish_step(&mut self, step_power: f64) {
        self.momentary_ring[self.steps_written % MOMENTARY_BLOCKS] = step_power;
        self.short_term_ring[self.steps_written % SHORT_TERM_BLOCKS] = step_power;
        self.steps_written += 1;

        let momentary_power = self.momentary_ring.iter().sum::<f64>()
            / (self.steps_written.min(MOMENTARY_BLOCKS)) as f64;
        let short_term_power = self.short_term_ring.iter().sum::<f64>()
            / (self.steps_written.min(SHORT_TERM_BLOCKS)) as f64;

        let momentary_lufs = lufs(momentary_power);
        self.cell.momentary.set(momentary_lufs as f32);
        self.cell.short_term.set(lufs(short_term_power) as f32);

        // Each 100 ms step completes one 400 ms gating block (75% overlap).
        // Gating starts once a whole block exists.
        if self.steps_written >= MOMENTARY_BLOCKS && momentary_lufs > ABSOLUTE_GATE_LUFS {
            let bin = (((momentary_lufs - HISTOGRAM_MIN_LUFS) / HISTOGRAM_LU_PER_BIN) as usize)
                .min(HISTOGRAM_BINS - 1);
            self.histogram_counts[bin] += 1;
            self.histogram_power[bin] += momentary_power;
            self.cell.integrated.set(self.integrated_from_histogram());
        }
    }

    fn integrated_from_histogram(&self) -> f32 {
        let mut count: u64 = 0;
        let mut power = 0.0_f64;
        for (c, p) in self.histogram_counts.iter().zip(&self.histogram_power) {
            count += u64::from(*c);
            power += p;
        }
        if count == 0 {
            return SILENCE_LUFS;
        }

        // Relative gate: -10 LU under the absolute-gated mean.
        let ungated = lufs(power / count as f64);
        let threshold = ungated - RELATIVE_GATE_LU;
        let first_bin = (((threshold - HISTOGRAM_MIN_LUFS) / HISTOGRAM_LU_PER_BIN).max(0.0)
            as usize)
            .min(HISTOGRAM_BINS - 1);

        let mut gated_count: u64 = 0;
        let mut gated_power = 0.0_f64;
        for bin in first_bin..HISTOGRAM_BINS {
            gated_count += u64::from(self.histogram_counts[bin]);
            gated_power += self.histogram_power[bin];
        }
        if gated_count == 0 {
            return SILENCE_LUFS;
        }
        lufs(gated_power / gated_count as f64) as f32
    }

    /// Reset all state (engine restart / preset-load boundary).
    pub fn reset(&mut self) {
        self.filter_left.reset();
        self.filter_right.reset();
        self.step_power = 0.0;
        self.step_filled = 0;
        self.momentary_ring = [0.0; MOMENTARY_BLOCKS];
        self.short_term_ring = [0.0; SHORT_TERM_BLOCKS];
        self.steps_written = 0;
        self.histogram_counts.fill(0);
        self.histogram_power.fill(0.0);
        self.cell.clear();
    }
}

#[inline]
fn lufs(power: f64) -> f64 {
    -0.691 + 10.0 * power.max(1e-12).log10()
}
