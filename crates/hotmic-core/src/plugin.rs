//! The plugin contract: every in-chain DSP unit implements [`Plugin`].
//!
//! The trait is object-safe; a chain stores `Box<dyn Plugin + Send>` and
//! dispatches block processing, parameter access, and state persistence
//! through one vtable. Optional capabilities (analysis-signal producer,
//! blocker, consumer, channel input, channel output endpoint) are modeled
//! as queries with `None` defaults rather than a type hierarchy.
//!
//! ## Real-Time Rules
//!
//! `process` runs on the audio callback thread: no allocation, no locking,
//! no I/O. All sizing happens in `initialize(sample_rate, block_size)`,
//! which is only ever called off the audio thread. `dispose` likewise runs
//! off-thread, after the slot has been retired from the chain.

use crate::context::ProcessContext;
use crate::params::ParamDescriptor;
use crate::signal::SignalMask;

/// Where an output-send endpoint places its channel in the stereo bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendMode {
    /// Left side only.
    Left,
    /// Right side only.
    Right,
    /// Both sides with equal-power weighting.
    #[default]
    Both,
}

/// Capability view for analysis-signal consumers.
///
/// The chain walk tells a consumer, per block, whether every signal it
/// cares about currently has an upstream producer; consumers use this to
/// fall back to local estimates (or skip work) when the chain cannot feed
/// them.
pub trait SignalConsumer {
    /// Signals this consumer reads from the bus.
    fn consumed_signals(&self) -> SignalMask;

    /// Called each block before `process`: `available` is true when every
    /// consumed signal has a mapped upstream producer.
    fn set_availability(&mut self, available: bool);
}

/// Uniform contract for in-chain DSP units.
pub trait Plugin: Send {
    /// Stable type identifier (registry key, persisted in presets).
    fn id(&self) -> &'static str;

    /// Human-readable display name.
    fn name(&self) -> &'static str;

    /// Processing latency in samples. Zero for most units.
    fn latency_samples(&self) -> u32 {
        0
    }

    /// Size all internal state for the committed sample rate and block
    /// size. The only allocation point; never called on the audio thread.
    fn initialize(&mut self, sample_rate: f32, block_size: usize);

    /// Clear internal state (delay lines, envelopes) without touching
    /// parameters.
    fn reset(&mut self) {}

    /// Process one block in place.
    fn process(&mut self, buffer: &mut [f32], ctx: &mut ProcessContext<'_>);

    /// Number of parameters.
    fn param_count(&self) -> usize {
        0
    }

    /// Descriptor for the parameter at `index`, or `None` out of range.
    fn param_info(&self, _index: usize) -> Option<ParamDescriptor> {
        None
    }

    /// Current value of the parameter at `index` (0.0 out of range).
    fn get_param(&self, _index: usize) -> f32 {
        0.0
    }

    /// Set the parameter at `index`, clamping to the descriptor range.
    /// Must be safe to call from the audio thread with any float.
    fn set_param(&mut self, _index: usize, _value: f32) {}

    /// Opaque state blob for persistence.
    fn save_state(&self) -> Vec<u8> {
        Vec::new()
    }

    /// Restore from a state blob. Unknown or malformed blobs are ignored.
    fn load_state(&mut self, _bytes: &[u8]) {}

    /// Release resources. Runs off the audio thread after removal.
    fn dispose(&mut self) {}

    // ── Optional capabilities ────────────────────────────────────────────

    /// Signals this plugin produces onto the bus, if it is a producer.
    fn produced_signals(&self) -> Option<SignalMask> {
        None
    }

    /// Signals this plugin suppresses for downstream slots, if it is a
    /// blocker.
    fn blocked_signals(&self) -> Option<SignalMask> {
        None
    }

    /// Consumer view, if this plugin reads analysis signals.
    fn as_signal_consumer(&mut self) -> Option<&mut dyn SignalConsumer> {
        None
    }

    /// Whether this plugin sources the channel's input from another
    /// channel (via the routing context) instead of a device capture.
    fn is_channel_input(&self) -> bool {
        false
    }

    /// Send mode, if this plugin is the channel's output endpoint.
    fn send_mode(&self) -> Option<SendMode> {
        None
    }
}

/// Find the parameter index for a (case-insensitive) name, if any.
///
/// Setup-path helper used by preset loading; O(n) over the table.
pub fn find_param_by_name(plugin: &dyn Plugin, name: &str) -> Option<usize> {
    (0..plugin.param_count()).find(|&i| {
        plugin
            .param_info(i)
            .is_some_and(|d| d.name.eq_ignore_ascii_case(name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SignalBus;
    use crate::context::RoutingContext;
    use crate::signal::ProducerMap;

    struct UnitGain;

    impl Plugin for UnitGain {
        fn id(&self) -> &'static str {
            "unit_gain"
        }
        fn name(&self) -> &'static str {
            "Unit Gain"
        }
        fn initialize(&mut self, _sample_rate: f32, _block_size: usize) {}
        fn process(&mut self, _buffer: &mut [f32], _ctx: &mut ProcessContext<'_>) {}
        fn param_count(&self) -> usize {
            1
        }
        fn param_info(&self, index: usize) -> Option<ParamDescriptor> {
            (index == 0).then(|| ParamDescriptor::gain_db("Gain", -60.0, 12.0, 0.0))
        }
    }

    #[test]
    fn defaults_are_inert() {
        let mut plugin = UnitGain;
        assert_eq!(plugin.latency_samples(), 0);
        assert!(plugin.produced_signals().is_none());
        assert!(plugin.blocked_signals().is_none());
        assert!(plugin.as_signal_consumer().is_none());
        assert!(!plugin.is_channel_input());
        assert!(plugin.send_mode().is_none());
        assert!(plugin.save_state().is_empty());
    }

    #[test]
    fn param_lookup_by_name_is_case_insensitive() {
        let plugin = UnitGain;
        assert_eq!(find_param_by_name(&plugin, "gain"), Some(0));
        assert_eq!(find_param_by_name(&plugin, "GAIN"), Some(0));
        assert_eq!(find_param_by_name(&plugin, "drive"), None);
    }

    #[test]
    fn object_safe_dispatch() {
        let mut boxed: Box<dyn Plugin + Send> = Box::new(UnitGain);
        let bus = SignalBus::new(0, 0, 64);
        let routing = RoutingContext::new();
        let mut ctx = ProcessContext {
            sample_rate: 48000.0,
            block_size: 4,
            sample_clock: 0,
            sample_time: 0,
            slot_index: 0,
            cumulative_latency: 0,
            channel_id: 0,
            routing: &routing,
            bus: &bus,
            producer_map: ProducerMap::empty(),
            producer_lane: None,
            allowed_mask: SignalMask::EMPTY,
            requested_mask: SignalMask::EMPTY,
            wants_capture: false,
        };
        let mut buf = [0.5_f32; 4];
        boxed.process(&mut buf, &mut ctx);
        assert_eq!(buf, [0.5; 4]);
        assert_eq!(boxed.id(), "unit_gain");
    }
}
