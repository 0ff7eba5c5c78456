//! Trim gain stage.

use hotmic_core::context::ProcessContext;
use hotmic_core::param::GainSmoother;
use hotmic_core::params::ParamDescriptor;
use hotmic_core::plugin::Plugin;

const PARAMS: [ParamDescriptor; 1] = [ParamDescriptor::gain_db("Gain", -24.0, 24.0, 0.0)];

/// Smoothed dB trim, the simplest useful chain member.
#[derive(Debug)]
pub struct GainPlugin {
    gain: GainSmoother,
}

impl GainPlugin {
    /// Create a trim stage at unity.
    pub fn new() -> Self {
        Self {
            gain: GainSmoother::new(0.0, 48000.0),
        }
    }
}

impl Default for GainPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for GainPlugin {
    fn id(&self) -> &'static str {
        "gain"
    }

    fn name(&self) -> &'static str {
        "Trim Gain"
    }

    fn initialize(&mut self, sample_rate: f32, _block_size: usize) {
        self.gain.set_sample_rate(sample_rate);
        self.gain.snap();
    }

    fn reset(&mut self) {
        self.gain.snap();
    }

    fn process(&mut self, buffer: &mut [f32], _ctx: &mut ProcessContext<'_>) {
        self.gain.apply(buffer);
    }

    fn param_count(&self) -> usize {
        PARAMS.len()
    }

    fn param_info(&self, index: usize) -> Option<ParamDescriptor> {
        PARAMS.get(index).copied()
    }

    fn get_param(&self, index: usize) -> f32 {
        match index {
            0 => self.gain.target_db(),
            _ => 0.0,
        }
    }

    fn set_param(&mut self, index: usize, value: f32) {
        if index == 0 {
            self.gain.set_target_db(PARAMS[0].clamp(value));
        }
    }
}
