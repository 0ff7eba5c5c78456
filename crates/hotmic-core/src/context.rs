//! Per-block state threaded through a chain walk.
//!
//! [`RoutingContext`] is the cross-channel surface: one pre-sized slot per
//! channel, filled in scheduler order so dependent channels only ever read
//! slots already flagged ready. [`ProcessContext`] is what each plugin sees:
//! the clocks, its position in the chain, the routing view, and mask-guarded
//! access to the analysis signal bus.

use crate::bus::SignalBus;
use crate::signal::{AnalysisSignal, ProducerMap, SignalMask};

/// One channel's published output for the current block.
#[derive(Debug)]
pub struct RoutingSlot {
    /// Post-chain output copy, sized to the block.
    buffer: Vec<f32>,
    /// The channel's accumulated chain latency when it published.
    latency: u32,
    /// Set once the channel has processed this block.
    ready: bool,
}

/// Per-block cross-channel state: the sample clock plus one slot per channel.
#[derive(Debug, Default)]
pub struct RoutingContext {
    sample_clock: u64,
    slots: Vec<RoutingSlot>,
}

impl RoutingContext {
    /// Create a context with no channels. Use [`resize`](Self::resize) at
    /// block-size commitment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context with room for `max_channels` slots, so later
    /// [`add_slot`](Self::add_slot) calls never reallocate.
    pub fn with_capacity(max_channels: usize) -> Self {
        Self {
            sample_clock: 0,
            slots: Vec::with_capacity(max_channels),
        }
    }

    /// Size the context for `channels` slots of `block_size` samples.
    /// Allocation point; not for the audio thread.
    pub fn resize(&mut self, channels: usize, block_size: usize) {
        self.slots.clear();
        for _ in 0..channels {
            self.slots.push(RoutingSlot {
                buffer: vec![0.0; block_size],
                latency: 0,
                ready: false,
            });
        }
    }

    /// Append one channel slot using a buffer allocated by the caller
    /// (off the audio thread). Within the reserved capacity this does not
    /// allocate.
    pub fn add_slot(&mut self, buffer: Vec<f32>) {
        self.slots.push(RoutingSlot {
            buffer,
            latency: 0,
            ready: false,
        });
    }


    /// Begin a block: stamp the clock and clear every slot.
    pub fn begin_block(&mut self, sample_clock: u64) {
        self.sample_clock = sample_clock;
        for slot in &mut self.slots {
            slot.ready = false;
            slot.latency = 0;
            slot.buffer.fill(0.0);
        }
    }

    /// The block's sample clock.
    #[inline]
    pub fn sample_clock(&self) -> u64 {
        self.sample_clock
    }

    /// Number of channel slots.
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.slots.len()
    }

    /// Publish a channel's post-chain output and latency, flipping ready.
    pub fn publish(&mut self, channel: usize, output: &[f32], latency: u32) {
        if let Some(slot) = self.slots.get_mut(channel) {
            let n = output.len().min(slot.buffer.len());
            slot.buffer[..n].copy_from_slice(&output[..n]);
            slot.latency = latency;
            slot.ready = true;
        }
    }

    /// A channel's published output, or `None` until it is ready.
    ///
    /// The engine does not compensate latency between channels; the
    /// returned latency is the source's own, and consumers needing aligned
    /// reads must work in `sample_time` themselves.
    pub fn output_of(&self, channel: usize) -> Option<(&[f32], u32)> {
        let slot = self.slots.get(channel)?;
        if slot.ready {
            Some((slot.buffer.as_slice(), slot.latency))
        } else {
            None
        }
    }
}

/// Per-block, per-slot state handed to [`Plugin::process`](crate::plugin::Plugin::process).
///
/// The chain walk updates `slot_index`, `cumulative_latency`, `sample_time`,
/// the producer map, and the masks between slots; everything else is fixed
/// for the block.
pub struct ProcessContext<'a> {
    /// Session sample rate in Hz.
    pub sample_rate: f32,
    /// Samples per block.
    pub block_size: usize,
    /// Block arrival time on the output sample clock.
    pub sample_clock: u64,
    /// Latency-corrected time of the first sample in the buffer:
    /// `sample_clock - cumulative_latency`.
    pub sample_time: i64,
    /// This plugin's position in the chain.
    pub slot_index: usize,
    /// Latency accumulated by all upstream slots.
    pub cumulative_latency: u32,
    /// Owning channel id.
    pub channel_id: usize,
    /// Cross-channel routing view.
    pub routing: &'a RoutingContext,
    /// The analysis signal bus.
    pub bus: &'a SignalBus,
    /// Nearest upstream producer per signal, as of this slot.
    pub producer_map: ProducerMap,
    /// This slot's bus lane if it is a producer.
    pub producer_lane: Option<usize>,
    /// Signals this slot declared and may write.
    pub allowed_mask: SignalMask,
    /// Signals some downstream slot or the orchestrator demands.
    pub requested_mask: SignalMask,
    /// Set by a tap slot to claim this block's analysis capture.
    pub wants_capture: bool,
}

impl ProcessContext<'_> {
    /// Write an analysis signal at `sample_time`.
    ///
    /// Drops the write unless this slot is a producer and declared the
    /// signal - a cheap guard against mis-wiring.
    #[inline]
    pub fn write_signal(&self, signal: AnalysisSignal, sample_time: i64, value: f32) {
        if let Some(lane) = self.producer_lane
            && self.allowed_mask.contains(signal)
        {
            self.bus.write(lane, signal, sample_time, value);
        }
    }

    /// Read an analysis signal at `sample_time` through the producer map.
    ///
    /// Returns 0.0 when no upstream producer is mapped (including signals
    /// suppressed by a blocker).
    #[inline]
    pub fn read_signal(&self, signal: AnalysisSignal, sample_time: i64) -> f32 {
        match self.producer_map.lane(signal) {
            Some(lane) => self.bus.read(lane, signal, sample_time),
            None => 0.0,
        }
    }

    /// Whether a signal currently has an upstream producer.
    #[inline]
    pub fn signal_available(&self, signal: AnalysisSignal) -> bool {
        self.producer_map.lane(signal).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_slots_start_unready() {
        let mut ctx = RoutingContext::new();
        ctx.resize(2, 4);
        ctx.begin_block(128);
        assert_eq!(ctx.sample_clock(), 128);
        assert!(ctx.output_of(0).is_none());
        assert!(ctx.output_of(1).is_none());
        assert!(ctx.output_of(9).is_none());
    }

    #[test]
    fn publish_makes_output_visible() {
        let mut ctx = RoutingContext::new();
        ctx.resize(2, 4);
        ctx.begin_block(0);
        ctx.publish(1, &[0.1, 0.2, 0.3, 0.4], 64);

        let (buf, latency) = ctx.output_of(1).unwrap();
        assert_eq!(buf, &[0.1, 0.2, 0.3, 0.4]);
        assert_eq!(latency, 64);
        assert!(ctx.output_of(0).is_none());
    }

    #[test]
    fn begin_block_clears_previous_block() {
        let mut ctx = RoutingContext::new();
        ctx.resize(1, 4);
        ctx.begin_block(0);
        ctx.publish(0, &[1.0, 1.0, 1.0, 1.0], 0);
        ctx.begin_block(4);
        assert!(ctx.output_of(0).is_none());
    }

    #[test]
    fn context_signal_helpers_respect_masks() {
        let bus = SignalBus::new(0, 1, 64);
        let routing = RoutingContext::new();
        let mut map = ProducerMap::empty();
        map.assign(AnalysisSignal::VoicingScore.bit(), 0);

        let ctx = ProcessContext {
            sample_rate: 48000.0,
            block_size: 64,
            sample_clock: 64,
            sample_time: 64,
            slot_index: 0,
            cumulative_latency: 0,
            channel_id: 0,
            routing: &routing,
            bus: &bus,
            producer_map: map,
            producer_lane: Some(0),
            allowed_mask: AnalysisSignal::VoicingScore.bit(),
            requested_mask: SignalMask::ALL,
            wants_capture: false,
        };

        // Allowed write lands; undeclared write is dropped.
        ctx.write_signal(AnalysisSignal::VoicingScore, 10, 0.9);
        ctx.write_signal(AnalysisSignal::PitchHz, 10, 440.0);
        assert_eq!(ctx.read_signal(AnalysisSignal::VoicingScore, 10), 0.9);
        assert!(!ctx.signal_available(AnalysisSignal::PitchHz));
        assert_eq!(ctx.read_signal(AnalysisSignal::PitchHz, 10), 0.0);
    }
}
