//! The analysis tap: per-signal read-through, local generation, or block.
//!
//! A tap slot sits anywhere in a chain and decides, signal by signal, what
//! downstream slots (and the analysis worker) get to see:
//!
//! - **Read**: the upstream value passes through untouched
//! - **Generate**: the tap computes the signal locally and publishes it,
//!   shadowing any upstream producer
//! - **Block**: downstream consumers see no producer at all
//!
//! A tap can also claim the block's analysis capture, preempting the
//! output pipeline's default capture for the same block.

use hotmic_core::context::ProcessContext;
use hotmic_core::params::ParamDescriptor;
use hotmic_core::plugin::Plugin;
use hotmic_core::signal::{AnalysisSignal, SIGNAL_COUNT, SignalMask};

use crate::analyzer::SignalComputeCore;

/// Per-signal tap behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TapMode {
    /// Pass the upstream value through.
    #[default]
    Read,
    /// Generate the signal locally.
    Generate,
    /// Suppress the signal downstream.
    Block,
}

impl TapMode {
    fn from_param(value: f32) -> Self {
        match value as u32 {
            1 => TapMode::Generate,
            2 => TapMode::Block,
            _ => TapMode::Read,
        }
    }

    fn to_param(self) -> f32 {
        match self {
            TapMode::Read => 0.0,
            TapMode::Generate => 1.0,
            TapMode::Block => 2.0,
        }
    }
}

/// Analysis tap slot.
pub struct TapPlugin {
    modes: [TapMode; SIGNAL_COUNT],
    capture: bool,
    core: SignalComputeCore,
}

impl TapPlugin {
    /// Create a tap with every signal in read-through mode.
    pub fn new() -> Self {
        Self {
            modes: [TapMode::Read; SIGNAL_COUNT],
            capture: false,
            core: SignalComputeCore::new(),
        }
    }

    /// Mode for one signal.
    pub fn mode(&self, signal: AnalysisSignal) -> TapMode {
        self.modes[signal.index()]
    }

    /// Set the mode for one signal.
    pub fn set_mode(&mut self, signal: AnalysisSignal, mode: TapMode) {
        self.modes[signal.index()] = mode;
    }

    /// Enable or disable capture claiming.
    pub fn set_capture(&mut self, capture: bool) {
        self.capture = capture;
    }

    fn mask_for(&self, mode: TapMode) -> SignalMask {
        let mut mask = SignalMask::EMPTY;
        for signal in AnalysisSignal::ALL {
            if self.modes[signal.index()] == mode {
                mask = mask.union(signal.bit());
            }
        }
        mask
    }
}

impl Default for TapPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for TapPlugin {
    fn id(&self) -> &'static str {
        "analysis_tap"
    }

    fn name(&self) -> &'static str {
        "Analysis Tap"
    }

    fn initialize(&mut self, sample_rate: f32, _block_size: usize) {
        self.core.initialize(sample_rate);
    }

    fn reset(&mut self) {
        self.core.reset();
    }

    fn process(&mut self, buffer: &mut [f32], ctx: &mut ProcessContext<'_>) {
        // Generate paths run only when something downstream wants them.
        let generated = self.mask_for(TapMode::Generate);
        let needed = generated
            .intersection(ctx.requested_mask)
            .intersection(ctx.allowed_mask);
        self.core.push_block(buffer, ctx.sample_time, needed);
        for signal in needed.iter() {
            let value = self.core.value(signal);
            for i in 0..buffer.len() {
                ctx.write_signal(signal, ctx.sample_time + i as i64, value);
            }
        }
        if self.capture {
            ctx.wants_capture = true;
        }
    }

    fn param_count(&self) -> usize {
        SIGNAL_COUNT + 1
    }

    fn param_info(&self, index: usize) -> Option<ParamDescriptor> {
        if index < SIGNAL_COUNT {
            Some(ParamDescriptor::stepped(
                AnalysisSignal::ALL[index].name(),
                2.0,
                0.0,
            ))
        } else if index == SIGNAL_COUNT {
            Some(ParamDescriptor::stepped("Capture", 1.0, 0.0))
        } else {
            None
        }
    }

    fn get_param(&self, index: usize) -> f32 {
        if index < SIGNAL_COUNT {
            self.modes[index].to_param()
        } else if index == SIGNAL_COUNT {
            f32::from(u8::from(self.capture))
        } else {
            0.0
        }
    }

    fn set_param(&mut self, index: usize, value: f32) {
        if index < SIGNAL_COUNT {
            self.modes[index] = TapMode::from_param(value.clamp(0.0, 2.0));
        } else if index == SIGNAL_COUNT {
            self.capture = value >= 0.5;
        }
    }

    fn produced_signals(&self) -> Option<SignalMask> {
        // Always a producer, even with nothing in generate mode yet: the
        // chain assigns the bus lane at insert time, and modes flip live.
        Some(self.mask_for(TapMode::Generate))
    }

    fn blocked_signals(&self) -> Option<SignalMask> {
        let mask = self.mask_for(TapMode::Block);
        if mask.is_empty() { None } else { Some(mask) }
    }
}
