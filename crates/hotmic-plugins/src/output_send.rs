//! Terminal output send: how a channel lands in the stereo bus.
//!
//! The plugin itself is a passthrough - the output pipeline queries the
//! channel's terminal send for its [`SendMode`] and performs the actual
//! mix (equal-power for `Both`). Keeping the mixing in the pipeline means
//! a channel without any send plugin can still default to `Both`.

use hotmic_core::context::ProcessContext;
use hotmic_core::params::ParamDescriptor;
use hotmic_core::plugin::{Plugin, SendMode};

const PARAMS: [ParamDescriptor; 1] = [ParamDescriptor::stepped("Send Mode", 2.0, 2.0)];

/// Channel-output endpoint with a Left / Right / Both send mode.
#[derive(Debug)]
pub struct OutputSendPlugin {
    mode: SendMode,
}

impl OutputSendPlugin {
    /// Create a send in `Both` mode.
    pub fn new() -> Self {
        Self {
            mode: SendMode::Both,
        }
    }

    /// Create a send with an explicit mode.
    pub fn with_mode(mode: SendMode) -> Self {
        Self { mode }
    }
}

impl Default for OutputSendPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for OutputSendPlugin {
    fn id(&self) -> &'static str {
        "output_send"
    }

    fn name(&self) -> &'static str {
        "Output Send"
    }

    fn initialize(&mut self, _sample_rate: f32, _block_size: usize) {}

    fn process(&mut self, _buffer: &mut [f32], _ctx: &mut ProcessContext<'_>) {
        // Passthrough; the pipeline reads `send_mode()` when mixing.
    }

    fn param_count(&self) -> usize {
        PARAMS.len()
    }

    fn param_info(&self, index: usize) -> Option<ParamDescriptor> {
        PARAMS.get(index).copied()
    }

    fn get_param(&self, index: usize) -> f32 {
        match index {
            0 => match self.mode {
                SendMode::Left => 0.0,
                SendMode::Right => 1.0,
                SendMode::Both => 2.0,
            },
            _ => 0.0,
        }
    }

    fn set_param(&mut self, index: usize, value: f32) {
        if index == 0 {
            self.mode = match PARAMS[0].clamp(value) as u32 {
                0 => SendMode::Left,
                1 => SendMode::Right,
                _ => SendMode::Both,
            };
        }
    }

    fn send_mode(&self) -> Option<SendMode> {
        Some(self.mode)
    }
}
