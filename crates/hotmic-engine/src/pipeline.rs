//! The output pipeline: one render call drives one block end-to-end.
//!
//! Per callback, in order: drain structural commands, drain the parameter
//! bridge, begin the routing block, process channels in scheduler order,
//! mix terminal sends into the stereo bus (equal-power for `Both`), run
//! the master section (LUFS + peak/RMS), publish the block's analysis
//! capture, mirror to the monitor ring, and advance the sample clock.
//!
//! Everything the audio thread touches here was allocated beforehand;
//! structural growth arrives as pre-built objects inside commands, and
//! everything removed leaves through the retirement queue.

use std::sync::Arc;

use hotmic_core::atomic::AtomicSampleClock;
use hotmic_core::bus::{RequestedSignals, SignalBus};
use hotmic_core::capture::{CaptureLink, CaptureRecord, CaptureSource};
use hotmic_core::context::RoutingContext;
use hotmic_core::meter::{Meter, MeterCell};
use hotmic_core::plugin::SendMode;
use hotmic_core::ring::StagingWriter;
use hotmic_core::signal::ProducerMap;

use crate::MAX_CHANNELS;
use crate::bridge::{ParamChange, ParamReceiver, ParamTarget};
use crate::chain::CaptureScratch;
use crate::channel::ChannelStrip;
use crate::diag::EngineDiagnostics;
use crate::master::{LufsCell, LufsMeter};
use crate::shared::{ChainCommand, EngineShared, RetiredItem};

/// Legal channel gain range, mirrored from the config layer.
const GAIN_DB_MIN: f32 = -60.0;
const GAIN_DB_MAX: f32 = 12.0;

const FRAC_1_SQRT_2: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// The audio-thread half of the engine.
pub struct AudioEngine {
    shared: Arc<EngineShared>,
    diag: Arc<EngineDiagnostics>,
    requested: Arc<RequestedSignals>,
    /// Channel slots; `None` marks a removed (tombstoned) channel so ids
    /// stay stable for routing and parameter targets.
    channels: Vec<Option<ChannelStrip>>,
    routing: RoutingContext,
    bus: Arc<SignalBus>,
    clock: Arc<AtomicSampleClock>,
    params: ParamReceiver,
    capture_link: Arc<CaptureLink>,
    capture_scratch: CaptureScratch,
    lufs: LufsMeter,
    master_left: Meter,
    master_right: Meter,
    master_mute: bool,
    master_stereo: bool,
    frozen: bool,
    monitor: Option<StagingWriter>,
    bus_left: Vec<f32>,
    bus_right: Vec<f32>,
    sample_rate: f32,
    block_size: usize,
}

impl AudioEngine {
    /// Assemble the audio side. Called once, off the audio thread, by
    /// [`build_engine`](crate::handle::build_engine).
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        shared: Arc<EngineShared>,
        bus: Arc<SignalBus>,
        clock: Arc<AtomicSampleClock>,
        params: ParamReceiver,
        capture_link: Arc<CaptureLink>,
        monitor: Option<StagingWriter>,
        sample_rate: f32,
        block_size: usize,
    ) -> Self {
        let mut master_left = Meter::new();
        master_left.prepare(sample_rate, block_size);
        let mut master_right = Meter::new();
        master_right.prepare(sample_rate, block_size);

        Self {
            diag: shared.diag(),
            requested: shared.requested(),
            shared,
            channels: Vec::with_capacity(MAX_CHANNELS),
            routing: RoutingContext::with_capacity(MAX_CHANNELS),
            bus,
            clock,
            params,
            capture_link,
            capture_scratch: CaptureScratch::new(block_size),
            lufs: LufsMeter::new(sample_rate),
            master_left,
            master_right,
            master_mute: false,
            master_stereo: true,
            frozen: false,
            monitor,
            bus_left: vec![0.0; block_size],
            bus_right: vec![0.0; block_size],
            sample_rate,
            block_size,
        }
    }

    /// Master LUFS reader handle.
    pub fn lufs_cell(&self) -> Arc<LufsCell> {
        self.lufs.cell()
    }

    /// Master peak/RMS reader handles (left, right).
    pub fn master_meter_cells(&self) -> (Arc<MeterCell>, Arc<MeterCell>) {
        (self.master_left.cell(), self.master_right.cell())
    }

    /// Committed block size in samples.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Committed sample rate in Hz.
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Current sample clock.
    pub fn sample_clock(&self) -> u64 {
        self.clock.get()
    }

    /// Live chain order of a channel as instance ids (diagnostics and
    /// chain-parity checks).
    pub fn chain_order(&self, channel: usize) -> Option<Vec<u64>> {
        self.channels
            .get(channel)
            .and_then(Option::as_ref)
            .map(|strip| {
                strip
                    .chain()
                    .slots()
                    .iter()
                    .map(super::chain::PluginSlot::instance_id)
                    .collect()
            })
    }

    /// Render one block into an interleaved stereo buffer of
    /// `block_size * 2` samples.
    pub fn render(&mut self, output: &mut [f32]) {
        debug_assert_eq!(output.len(), self.block_size * 2);

        // 1. Structural commands, then parameters; both wait-free.
        self.drain_commands();
        self.drain_params();

        if self.frozen {
            output.fill(0.0);
            return;
        }

        let sample_clock = self.clock.get();

        // 2. Begin the block.
        self.routing.begin_block(sample_clock);
        self.capture_scratch.begin_block();
        self.bus_left.fill(0.0);
        self.bus_right.fill(0.0);

        let solo_active = self
            .channels
            .iter()
            .flatten()
            .any(ChannelStrip::is_soloed);
        let base_requested = self.requested.get();

        // 3. Channels in scheduler order; each publishes before the next
        //    dependent channel runs.
        let order = self.shared.load_order();
        let mut capture_fallback: Option<(u32, ProducerMap)> = None;
        for &channel in order.iter() {
            let Some(strip) = self.channels.get_mut(channel).and_then(Option::as_mut) else {
                continue;
            };
            let result = strip.process_block(
                sample_clock,
                channel,
                &self.routing,
                &self.bus,
                base_requested,
                solo_active,
                &mut self.capture_scratch,
                &self.diag,
            );
            if channel == 0 {
                capture_fallback = Some((result.cumulative_latency, result.producer_map));
            }
            self.routing
                .publish(channel, strip.output(), result.cumulative_latency);
        }

        // 4. Mix terminal sends into the stereo bus.
        for strip in self.channels.iter().flatten() {
            let out = strip.output();
            match strip.send_mode() {
                SendMode::Left => {
                    for (l, s) in self.bus_left.iter_mut().zip(out) {
                        *l += s;
                    }
                }
                SendMode::Right => {
                    for (r, s) in self.bus_right.iter_mut().zip(out) {
                        *r += s;
                    }
                }
                SendMode::Both => {
                    for ((l, r), s) in
                        self.bus_left.iter_mut().zip(&mut self.bus_right).zip(out)
                    {
                        *l += s * FRAC_1_SQRT_2;
                        *r += s * FRAC_1_SQRT_2;
                    }
                }
            }
        }

        if !self.master_stereo {
            // Mono-fold: both sides carry the mid signal.
            for (l, r) in self.bus_left.iter_mut().zip(&mut self.bus_right) {
                let mid = (*l + *r) * 0.5;
                *l = mid;
                *r = mid;
            }
        }
        if self.master_mute {
            self.bus_left.fill(0.0);
            self.bus_right.fill(0.0);
        }

        // 5. Master metering.
        self.lufs.process_block(&self.bus_left, &self.bus_right);
        self.master_left.process_block(&self.bus_left);
        self.master_right.process_block(&self.bus_right);

        // 6. Analysis capture: a tap's claim wins, otherwise channel 0.
        self.publish_capture(sample_clock, capture_fallback);

        // 7. Hand the bus to the device.
        for i in 0..self.block_size {
            output[2 * i] = self.bus_left[i];
            output[2 * i + 1] = self.bus_right[i];
        }

        // 8. Monitor mirror of the interleaved output; overflow drops.
        if let Some(monitor) = self.monitor.as_mut() {
            monitor.push(output);
        }

        self.clock.advance(self.block_size);
        self.diag.record_block();
    }

    fn publish_capture(&mut self, sample_clock: u64, fallback: Option<(u32, ProducerMap)>) {
        if let Some((samples, sample_time, producer_map, channel_id)) = self.capture_scratch.take()
        {
            let Some(mut slice) = self.capture_link.acquire_slice() else {
                return;
            };
            slice.fill_from(samples);
            self.capture_link.publish(CaptureRecord {
                sample_time,
                source: CaptureSource::PluginTap,
                slice,
                bus: Arc::clone(&self.bus),
                producer_map,
                channel_id,
            });
            return;
        }

        let Some((latency, producer_map)) = fallback else {
            return;
        };
        let Some((buffer, _)) = self.routing.output_of(0) else {
            return;
        };
        let Some(mut slice) = self.capture_link.acquire_slice() else {
            return;
        };
        slice.fill_from(buffer);
        self.capture_link.publish(CaptureRecord {
            sample_time: sample_clock as i64 - i64::from(latency),
            source: CaptureSource::Output,
            slice,
            bus: Arc::clone(&self.bus),
            producer_map,
            channel_id: 0,
        });
    }

    // ── Command application ──────────────────────────────────────────────

    fn drain_commands(&mut self) {
        let shared = Arc::clone(&self.shared);
        shared.try_drain_commands(|command| self.apply_command(command));
    }

    fn apply_command(&mut self, command: ChainCommand) {
        match command {
            ChainCommand::AddChannel {
                strip,
                routing_buffer,
            } => {
                if self.channels.len() < MAX_CHANNELS {
                    self.channels.push(Some(*strip));
                    self.routing.add_slot(routing_buffer);
                }
            }
            ChainCommand::RemoveChannel { channel } => {
                if let Some(slot) = self.channels.get_mut(channel)
                    && let Some(strip) = slot.take()
                {
                    self.shared.retire(RetiredItem::Channel(Box::new(strip)));
                }
            }
            ChainCommand::SetChannelInput { channel, reader } => {
                if let Some(strip) = self.channels.get_mut(channel).and_then(Option::as_mut) {
                    strip.set_input(reader);
                }
            }
            ChainCommand::InsertSlot {
                channel,
                index,
                slot,
            } => {
                if let Some(strip) = self.channels.get_mut(channel).and_then(Option::as_mut) {
                    strip.chain_mut().insert(index, *slot);
                }
            }
            ChainCommand::RemoveSlot {
                channel,
                instance_id,
            } => {
                if let Some(strip) = self.channels.get_mut(channel).and_then(Option::as_mut)
                    && let Some(slot) = strip.chain_mut().remove(instance_id)
                {
                    self.shared.retire(RetiredItem::Slot(Box::new(slot)));
                }
            }
            ChainCommand::Reorder { channel, order } => {
                if let Some(strip) = self.channels.get_mut(channel).and_then(Option::as_mut) {
                    strip.chain_mut().reorder(&order);
                }
            }
            ChainCommand::ReplaceChain { channel, slots } => {
                if let Some(strip) = self.channels.get_mut(channel).and_then(Option::as_mut) {
                    let old = strip.chain_mut().replace(slots);
                    self.shared.retire(RetiredItem::Chain(old));
                }
            }
            ChainCommand::SetSlotBypass {
                channel,
                instance_id,
                bypassed,
            } => {
                if let Some(strip) = self.channels.get_mut(channel).and_then(Option::as_mut) {
                    strip.chain_mut().set_bypassed(instance_id, bypassed);
                }
            }
            ChainCommand::SetBus { bus } => {
                let old = std::mem::replace(&mut self.bus, bus);
                self.shared.retire(RetiredItem::Bus(old));
            }
            ChainCommand::BeginPresetLoad => {
                self.frozen = true;
                for strip in self.channels.iter_mut().flatten() {
                    strip.clear();
                }
                self.routing.begin_block(0);
                self.capture_scratch.begin_block();
                self.lufs.reset();
                self.master_left.reset();
                self.master_right.reset();
                self.clock.reset();
            }
            ChainCommand::EndPresetLoad => {
                self.frozen = false;
            }
        }
    }

    // ── Parameter application ────────────────────────────────────────────

    fn drain_params(&mut self) {
        while let Some(change) = self.params.pop() {
            self.apply_param(change);
        }
    }

    fn apply_param(&mut self, change: ParamChange) {
        match change.target {
            ParamTarget::ChannelInputGain { channel } => {
                if let Some(strip) = self.channels.get_mut(channel).and_then(Option::as_mut) {
                    strip.set_input_gain_db(change.value.clamp(GAIN_DB_MIN, GAIN_DB_MAX));
                }
            }
            ParamTarget::ChannelOutputGain { channel } => {
                if let Some(strip) = self.channels.get_mut(channel).and_then(Option::as_mut) {
                    strip.set_output_gain_db(change.value.clamp(GAIN_DB_MIN, GAIN_DB_MAX));
                }
            }
            ParamTarget::ChannelMute { channel } => {
                if let Some(strip) = self.channels.get_mut(channel).and_then(Option::as_mut) {
                    strip.set_muted(change.value >= 0.5);
                }
            }
            ParamTarget::ChannelSolo { channel } => {
                if let Some(strip) = self.channels.get_mut(channel).and_then(Option::as_mut) {
                    strip.set_soloed(change.value >= 0.5);
                }
            }
            ParamTarget::PluginParam {
                channel,
                instance_id,
                param_index,
            } => {
                if let Some(strip) = self.channels.get_mut(channel).and_then(Option::as_mut)
                    && let Some(slot) = strip.chain_mut().slot_by_id_mut(instance_id)
                {
                    slot.plugin_mut().set_param(param_index, change.value);
                }
            }
            // Container bypass fans out through the graph as per-slot
            // bypass commands; a stray bridge message is dropped here.
            ParamTarget::ContainerBypass { .. } => {}
            ParamTarget::MasterMute => self.master_mute = change.value >= 0.5,
            ParamTarget::MasterStereo => self.master_stereo = change.value >= 0.5,
        }
    }
}
