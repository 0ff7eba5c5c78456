//! The channel strip: input → gain → meter → chain → gain → mute/solo →
//! meter → publish.
//!
//! A strip owns its block buffer and (optionally) the staging-ring reader
//! for a hardware input. Channels without a device input start each block
//! silent; a bus-input plugin in the chain fills them from another
//! channel's published output.

use std::sync::Arc;

use hotmic_core::bus::SignalBus;
use hotmic_core::context::RoutingContext;
use hotmic_core::meter::{Meter, MeterCell};
use hotmic_core::param::GainSmoother;
use hotmic_core::plugin::SendMode;
use hotmic_core::ring::StagingReader;
use hotmic_core::signal::SignalMask;

use crate::chain::{CaptureScratch, PluginChain, WalkParams, WalkResult};
use crate::diag::EngineDiagnostics;

/// One mixer channel.
pub struct ChannelStrip {
    name: String,
    sample_rate: f32,
    chain: PluginChain,
    input_gain: GainSmoother,
    output_gain: GainSmoother,
    muted: bool,
    soloed: bool,
    input_meter: Meter,
    output_meter: Meter,
    buffer: Vec<f32>,
    input: Option<StagingReader>,
    /// Latency reported by the last walk.
    last_latency: u32,
}

impl ChannelStrip {
    /// Build a strip. UI thread; allocates the block buffer and meters.
    pub fn new(name: impl Into<String>, sample_rate: f32, block_size: usize) -> Self {
        let mut input_meter = Meter::new();
        input_meter.prepare(sample_rate, block_size);
        let mut output_meter = Meter::new();
        output_meter.prepare(sample_rate, block_size);
        Self {
            name: name.into(),
            sample_rate,
            chain: PluginChain::new(),
            input_gain: GainSmoother::new(0.0, sample_rate),
            output_gain: GainSmoother::new(0.0, sample_rate),
            muted: false,
            soloed: false,
            input_meter,
            output_meter,
            buffer: vec![0.0; block_size],
            input: None,
            last_latency: 0,
        }
    }

    /// Channel display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach the staging-ring reader for a hardware input.
    pub fn set_input(&mut self, reader: Option<StagingReader>) {
        self.input = reader;
    }

    /// The strip's chain.
    pub fn chain(&self) -> &PluginChain {
        &self.chain
    }

    /// The strip's chain, mutably (command application).
    pub fn chain_mut(&mut self) -> &mut PluginChain {
        &mut self.chain
    }

    /// Set the input gain target in dB (already clamped by the caller).
    pub fn set_input_gain_db(&mut self, db: f32) {
        self.input_gain.set_target_db(db);
    }

    /// Set the output gain target in dB.
    pub fn set_output_gain_db(&mut self, db: f32) {
        self.output_gain.set_target_db(db);
    }

    /// Set the channel mute.
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Set the channel solo.
    pub fn set_soloed(&mut self, soloed: bool) {
        self.soloed = soloed;
    }

    /// Whether this channel is soloed.
    pub fn is_soloed(&self) -> bool {
        self.soloed
    }

    /// Input meter reader handle.
    pub fn input_meter_cell(&self) -> Arc<MeterCell> {
        self.input_meter.cell()
    }

    /// Output meter reader handle.
    pub fn output_meter_cell(&self) -> Arc<MeterCell> {
        self.output_meter.cell()
    }

    /// The post-chain output of the last processed block.
    pub fn output(&self) -> &[f32] {
        &self.buffer
    }

    /// Latency reported by the last walk.
    pub fn latency(&self) -> u32 {
        self.last_latency
    }

    /// Send mode of the terminal send slot; `Both` when the chain has
    /// none, so a bare channel still reaches the bus.
    pub fn send_mode(&self) -> SendMode {
        self.chain.send_mode().unwrap_or_default()
    }

    /// Process one block.
    ///
    /// `solo_active` is true when *any* channel in the engine is soloed;
    /// channel mute applies first, solo-implied mute second.
    #[allow(clippy::too_many_arguments)]
    pub fn process_block(
        &mut self,
        sample_clock: u64,
        channel_id: usize,
        routing: &RoutingContext,
        bus: &SignalBus,
        base_requested: SignalMask,
        solo_active: bool,
        capture: &mut CaptureScratch,
        diag: &EngineDiagnostics,
    ) -> WalkResult {
        // 1. Input block: device capture or silence for chain-fed channels.
        match self.input.as_mut() {
            Some(reader) => {
                reader.read_block(&mut self.buffer);
            }
            None => self.buffer.fill(0.0),
        }

        // 2. Input gain, per-sample smoothed.
        self.input_gain.apply(&mut self.buffer);

        // 3. Input meter.
        self.input_meter.process_block(&self.buffer);

        // 4. The chain walk.
        let mut params = WalkParams {
            sample_rate: self.sample_rate,
            block_size: self.buffer.len(),
            sample_clock,
            channel_id,
            routing,
            bus,
            base_requested,
            capture,
            diag,
        };
        let result = self.chain.process_block(&mut self.buffer, &mut params);
        self.last_latency = result.cumulative_latency;

        // 5. Output gain.
        self.output_gain.apply(&mut self.buffer);

        // 6. Mute, then solo-implied mute.
        if self.muted || (solo_active && !self.soloed) {
            self.buffer.fill(0.0);
        }

        // 7. Output meter.
        self.output_meter.process_block(&self.buffer);

        result
    }

    /// Clear buffers, meters, and DSP state (preset-load boundary).
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        if let Some(reader) = self.input.as_mut() {
            reader.clear();
        }
        self.chain.reset();
        self.input_meter.reset();
        self.output_meter.reset();
        self.input_gain.snap();
        self.output_gain.snap();
        self.last_latency = 0;
    }
}
