//! Peak/RMS metering with atomic publication.
//!
//! Each meter has two halves: [`Meter`], the audio-side state machine run
//! once per block, and [`MeterCell`], the atomically published values the
//! UI reads. Published values are linear floats; dB conversion and display
//! scaling (including the VOX scale) happen entirely on the reader side.

use std::sync::Arc;

use crate::atomic::AtomicF32;
use crate::math::linear_to_db;

/// How long a peak is held before the hold value starts to fall.
const PEAK_HOLD_SECONDS: f32 = 1.5;
/// Linear fall rate of the hold value once the hold time elapses, per second.
const PEAK_HOLD_DECAY_PER_SECOND: f32 = 1.2;
/// Per-block decay factor target for the ballistic peak (about 300 ms to
/// fall 20 dB at typical block rates).
const PEAK_DECAY_SECONDS: f32 = 0.3;
/// RMS integration window.
const RMS_WINDOW_SECONDS: f32 = 0.3;

/// Atomically published meter values, shared with readers.
///
/// All values are linear amplitudes. Use [`MeterCell::peak_db`] and friends
/// for presentation.
#[derive(Debug, Default)]
pub struct MeterCell {
    peak: AtomicF32,
    rms: AtomicF32,
    peak_hold: AtomicF32,
}

impl MeterCell {
    /// New cell at silence.
    pub const fn new() -> Self {
        Self {
            peak: AtomicF32::new(0.0),
            rms: AtomicF32::new(0.0),
            peak_hold: AtomicF32::new(0.0),
        }
    }

    /// Current ballistic peak (linear).
    #[inline]
    pub fn peak(&self) -> f32 {
        self.peak.get()
    }

    /// Current windowed RMS (linear).
    #[inline]
    pub fn rms(&self) -> f32 {
        self.rms.get()
    }

    /// Current held peak (linear).
    #[inline]
    pub fn peak_hold(&self) -> f32 {
        self.peak_hold.get()
    }

    /// Ballistic peak in dBFS.
    pub fn peak_db(&self) -> f32 {
        linear_to_db(self.peak())
    }

    /// Windowed RMS in dBFS.
    pub fn rms_db(&self) -> f32 {
        linear_to_db(self.rms())
    }

    /// Held peak in dBFS.
    pub fn peak_hold_db(&self) -> f32 {
        linear_to_db(self.peak_hold())
    }

    /// Zero all published values (fault semantics, preset-load reset).
    pub fn clear(&self) {
        self.peak.set(0.0);
        self.rms.set(0.0);
        self.peak_hold.set(0.0);
    }

    fn publish(&self, peak: f32, rms: f32, hold: f32) {
        self.peak.set(peak);
        self.rms.set(rms);
        self.peak_hold.set(hold);
    }
}

/// Audio-side meter state. One instance per metering point, run once per
/// block; never allocates after [`prepare`](Meter::prepare).
#[derive(Debug)]
pub struct Meter {
    cell: Arc<MeterCell>,
    /// Per-block mean-square history covering the RMS window.
    energy_ring: Vec<f32>,
    ring_pos: usize,
    ring_filled: usize,
    /// Ballistic peak with per-block decay.
    peak: f32,
    peak_decay: f32,
    /// Peak hold state.
    hold: f32,
    hold_blocks_left: u32,
    hold_blocks: u32,
    hold_decay_per_block: f32,
}

impl Meter {
    /// Create an unprepared meter. Call [`prepare`](Meter::prepare) before use.
    pub fn new() -> Self {
        Self {
            cell: Arc::new(MeterCell::new()),
            energy_ring: Vec::new(),
            ring_pos: 0,
            ring_filled: 0,
            peak: 0.0,
            peak_decay: 0.0,
            hold: 0.0,
            hold_blocks_left: 0,
            hold_blocks: 0,
            hold_decay_per_block: 0.0,
        }
    }

    /// Size internal state for the committed sample rate and block size.
    ///
    /// This is the meter's only allocation point.
    pub fn prepare(&mut self, sample_rate: f32, block_size: usize) {
        let blocks_per_second = sample_rate / block_size as f32;
        let window_blocks = (RMS_WINDOW_SECONDS * blocks_per_second).ceil().max(1.0) as usize;
        self.energy_ring = vec![0.0; window_blocks];
        self.ring_pos = 0;
        self.ring_filled = 0;
        // decay^blocks_in(PEAK_DECAY_SECONDS) == 0.1 (one decade)
        self.peak_decay = 0.1_f32.powf(1.0 / (PEAK_DECAY_SECONDS * blocks_per_second));
        self.hold_blocks = (PEAK_HOLD_SECONDS * blocks_per_second).ceil() as u32;
        self.hold_decay_per_block = PEAK_HOLD_DECAY_PER_SECOND / blocks_per_second;
        self.reset();
    }

    /// Shared handle for readers.
    pub fn cell(&self) -> Arc<MeterCell> {
        Arc::clone(&self.cell)
    }

    /// Run the meter over one block and publish.
    pub fn process_block(&mut self, buffer: &[f32]) {
        if buffer.is_empty() {
            return;
        }

        let mut block_peak = 0.0_f32;
        let mut sum_sq = 0.0_f32;
        for &s in buffer {
            let a = s.abs();
            if a > block_peak {
                block_peak = a;
            }
            sum_sq += s * s;
        }

        // Ballistic peak: instant attack, exponential release.
        self.peak = if block_peak > self.peak {
            block_peak
        } else {
            self.peak * self.peak_decay
        };

        // Windowed RMS over the energy ring.
        if !self.energy_ring.is_empty() {
            self.energy_ring[self.ring_pos] = sum_sq / buffer.len() as f32;
            self.ring_pos = (self.ring_pos + 1) % self.energy_ring.len();
            self.ring_filled = (self.ring_filled + 1).min(self.energy_ring.len());
        }
        // Unwritten entries are zero, so summing the whole ring and
        // dividing by the filled count is exact both before and after wrap.
        let mean_sq: f32 = if self.ring_filled == 0 {
            0.0
        } else {
            self.energy_ring.iter().sum::<f32>() / self.ring_filled as f32
        };
        let rms = mean_sq.max(0.0).sqrt();

        // Peak hold: latch on a new maximum, then linear fall after the
        // hold time.
        if block_peak >= self.hold {
            self.hold = block_peak;
            self.hold_blocks_left = self.hold_blocks;
        } else if self.hold_blocks_left > 0 {
            self.hold_blocks_left -= 1;
        } else {
            self.hold = (self.hold - self.hold_decay_per_block).max(0.0);
        }

        self.cell.publish(self.peak, rms, self.hold);
    }

    /// Zero all state and published values.
    pub fn reset(&mut self) {
        self.peak = 0.0;
        self.hold = 0.0;
        self.hold_blocks_left = 0;
        self.ring_pos = 0;
        self.ring_filled = 0;
        self.energy_ring.fill(0.0);
        self.cell.clear();
    }
}

impl Default for Meter {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a dB value onto a fader-style display position in [0, 1] using the
/// VOX scale: the [-30, 0] dB range is expanded over the top 75% of the
/// scale, everything between -60 and -30 is compressed into the bottom
/// quarter. Published meter values are untouched; this is presentation only.
pub fn vox_scale_position(db: f32) -> f32 {
    if db >= 0.0 {
        1.0
    } else if db >= -30.0 {
        0.25 + (db + 30.0) / 30.0 * 0.75
    } else if db >= -60.0 {
        (db + 60.0) / 30.0 * 0.25
    } else {
        0.0
    }
}
