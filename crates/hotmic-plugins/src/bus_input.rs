//! Cross-channel input: reads another channel's output via the routing
//! context.
//!
//! A channel carrying this plugin sources (or blends in) the post-chain
//! output of another channel instead of a device capture. The scheduler
//! guarantees the source processed first; if the source is not ready
//! (cycle fallout, mid-recovery device), the plugin contributes silence -
//! never stale data, never NaN.

use hotmic_core::context::ProcessContext;
use hotmic_core::params::ParamDescriptor;
use hotmic_core::plugin::Plugin;

const PARAMS: [ParamDescriptor; 2] = [
    ParamDescriptor::stepped("Source Channel", 63.0, 0.0),
    ParamDescriptor::stepped("Mode", 1.0, 0.0),
];

/// How the source signal lands in this channel's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusInputMode {
    /// Replace the buffer with the source (copy).
    #[default]
    Copy,
    /// Sum the source into the buffer (merge).
    Mix,
}

/// Channel-input plugin reading a source channel's published output.
#[derive(Debug, Default)]
pub struct BusInputPlugin {
    source_channel: usize,
    mode: BusInputMode,
}

impl BusInputPlugin {
    /// Create a bus input reading channel 0 in copy mode.
    pub fn new() -> Self {
        Self::default()
    }

    /// The channel this input reads.
    pub fn source_channel(&self) -> usize {
        self.source_channel
    }

    /// Copy or mix.
    pub fn mode(&self) -> BusInputMode {
        self.mode
    }
}

impl Plugin for BusInputPlugin {
    fn id(&self) -> &'static str {
        "bus_input"
    }

    fn name(&self) -> &'static str {
        "Bus Input"
    }

    fn initialize(&mut self, _sample_rate: f32, _block_size: usize) {}

    fn process(&mut self, buffer: &mut [f32], ctx: &mut ProcessContext<'_>) {
        // Reading your own slot would always be un-ready; treat as silence.
        let source = if self.source_channel == ctx.channel_id {
            None
        } else {
            ctx.routing.output_of(self.source_channel)
        };

        match (source, self.mode) {
            (Some((src, _latency)), BusInputMode::Copy) => {
                let n = src.len().min(buffer.len());
                buffer[..n].copy_from_slice(&src[..n]);
                buffer[n..].fill(0.0);
            }
            (Some((src, _latency)), BusInputMode::Mix) => {
                for (dst, s) in buffer.iter_mut().zip(src.iter()) {
                    *dst += s;
                }
            }
            (None, BusInputMode::Copy) => buffer.fill(0.0),
            (None, BusInputMode::Mix) => {}
        }
    }

    fn param_count(&self) -> usize {
        PARAMS.len()
    }

    fn param_info(&self, index: usize) -> Option<ParamDescriptor> {
        PARAMS.get(index).copied()
    }

    fn get_param(&self, index: usize) -> f32 {
        match index {
            0 => self.source_channel as f32,
            1 => match self.mode {
                BusInputMode::Copy => 0.0,
                BusInputMode::Mix => 1.0,
            },
            _ => 0.0,
        }
    }

    fn set_param(&mut self, index: usize, value: f32) {
        match index {
            0 => self.source_channel = PARAMS[0].clamp(value) as usize,
            1 => {
                self.mode = if PARAMS[1].clamp(value) >= 0.5 {
                    BusInputMode::Mix
                } else {
                    BusInputMode::Copy
                };
            }
            _ => {}
        }
    }

    fn is_channel_input(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotmic_core::bus::SignalBus;
    use hotmic_core::context::RoutingContext;
    use hotmic_core::signal::{ProducerMap, SignalMask};

    fn ctx<'a>(
        routing: &'a RoutingContext,
        bus: &'a SignalBus,
        channel_id: usize,
    ) -> ProcessContext<'a> {
        ProcessContext {
            sample_rate: 48000.0,
            block_size: 4,
            sample_clock: 0,
            sample_time: 0,
            slot_index: 0,
            cumulative_latency: 0,
            channel_id,
            routing,
            bus,
            producer_map: ProducerMap::empty(),
            producer_lane: None,
            allowed_mask: SignalMask::EMPTY,
            requested_mask: SignalMask::EMPTY,
            wants_capture: false,
        }
    }

    #[test]
    fn copies_ready_source() {
        let mut routing = RoutingContext::new();
        routing.resize(2, 4);
        routing.begin_block(0);
        routing.publish(0, &[0.1, 0.2, 0.3, 0.4], 32);
        let bus = SignalBus::new(0, 0, 16);

        let mut plugin = BusInputPlugin::new();
        plugin.set_param(0, 0.0);

        let mut buf = [9.0_f32; 4];
        plugin.process(&mut buf, &mut ctx(&routing, &bus, 1));
        assert_eq!(buf, [0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn mixes_when_in_merge_mode() {
        let mut routing = RoutingContext::new();
        routing.resize(2, 4);
        routing.begin_block(0);
        routing.publish(0, &[1.0, 1.0, 1.0, 1.0], 0);
        let bus = SignalBus::new(0, 0, 16);

        let mut plugin = BusInputPlugin::new();
        plugin.set_param(0, 0.0);
        plugin.set_param(1, 1.0);

        let mut buf = [0.5_f32; 4];
        plugin.process(&mut buf, &mut ctx(&routing, &bus, 1));
        assert_eq!(buf, [1.5, 1.5, 1.5, 1.5]);
    }

    #[test]
    fn unready_source_copies_silence() {
        let mut routing = RoutingContext::new();
        routing.resize(2, 4);
        routing.begin_block(0);
        let bus = SignalBus::new(0, 0, 16);

        let mut plugin = BusInputPlugin::new();
        let mut buf = [9.0_f32; 4];
        plugin.process(&mut buf, &mut ctx(&routing, &bus, 1));
        assert_eq!(buf, [0.0; 4]);
        assert!(buf.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn unready_source_leaves_mix_untouched() {
        let mut routing = RoutingContext::new();
        routing.resize(2, 4);
        routing.begin_block(0);
        let bus = SignalBus::new(0, 0, 16);

        let mut plugin = BusInputPlugin::new();
        plugin.set_param(1, 1.0);
        let mut buf = [0.25_f32; 4];
        plugin.process(&mut buf, &mut ctx(&routing, &bus, 1));
        assert_eq!(buf, [0.25; 4]);
    }

    #[test]
    fn reading_own_channel_is_silence() {
        let mut routing = RoutingContext::new();
        routing.resize(2, 4);
        routing.begin_block(0);
        routing.publish(1, &[1.0; 4], 0);
        let bus = SignalBus::new(0, 0, 16);

        let mut plugin = BusInputPlugin::new();
        plugin.set_param(0, 1.0);
        let mut buf = [9.0_f32; 4];
        plugin.process(&mut buf, &mut ctx(&routing, &bus, 1));
        assert_eq!(buf, [0.0; 4]);
    }

    #[test]
    fn declares_channel_input_capability() {
        assert!(BusInputPlugin::new().is_channel_input());
    }
}
