//! The UI-side engine handle and the engine builder.
//!
//! [`EngineHandle`] is the single entry point for everything the UI (or
//! CLI) does to a running engine: structural edits through the per-channel
//! [`PluginGraph`]s, parameter changes through the bridge, routing edits,
//! preset loads, and teardown of retired objects. [`build_engine`] wires a
//! persisted [`EngineConfig`] into a connected
//! ([`AudioEngine`], [`EngineHandle`]) pair.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use thiserror::Error;
use tracing::{info, warn};

use hotmic_config::{ChannelConfig, EngineConfig, MasterConfig};
use hotmic_core::atomic::AtomicSampleClock;
use hotmic_core::bus::SignalBus;
use hotmic_core::capture::CaptureLink;
use hotmic_core::meter::MeterCell;
use hotmic_core::plugin::Plugin;
use hotmic_core::ring::{StagingReader, StagingRing};
use hotmic_core::signal::SignalMask;

use crate::bridge::{ParamChange, ParamSender, ParamTarget, TargetParseError, param_bridge, parse_target};
use crate::diag::EngineDiagnostics;
use crate::graph::{GraphError, PluginGraph};
use crate::master::LufsCell;
use crate::pipeline::AudioEngine;
use crate::routing::{RoutingError, RoutingScheduler};
use crate::shared::{ChainCommand, EngineShared, RetiredItem};
use crate::{ANALYSIS_WINDOW_SAMPLES, CAPTURE_LINK_CAPACITY, MAX_CHANNELS};
use crate::channel::ChannelStrip;

/// Factory signature for creating plugins by type id.
pub type PluginFactory =
    dyn Fn(&str, f32, usize) -> Option<Box<dyn Plugin + Send>> + Send + Sync;

/// Minimum number of bus lanes, so small sessions can still add producers
/// without a bus rebuild.
const MIN_BUS_LANES: usize = 4;
/// Staging capacity for the monitor ring, in blocks.
const MONITOR_RING_BLOCKS: usize = 8;

/// Why an engine-level operation failed.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A graph edit failed.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// A routing edit failed.
    #[error(transparent)]
    Routing(#[from] RoutingError),
    /// A parameter path failed to parse.
    #[error(transparent)]
    Target(#[from] TargetParseError),
    /// Bad persisted configuration.
    #[error(transparent)]
    Config(#[from] hotmic_config::ConfigError),
    /// Referenced channel does not exist (or was removed).
    #[error("no channel {0}")]
    NoSuchChannel(usize),
    /// The engine is at its channel limit.
    #[error("channel limit of {0} reached")]
    ChannelLimit(usize),
    /// The last remaining channel cannot be removed.
    #[error("cannot remove the last channel")]
    LastChannel,
}

/// Hands out analysis-bus lanes to producer slots.
struct LaneAllocator {
    free: Vec<usize>,
    capacity: usize,
}

impl LaneAllocator {
    fn new(capacity: usize) -> Self {
        Self {
            free: (0..capacity).rev().collect(),
            capacity,
        }
    }

    fn allocate(&mut self) -> Option<usize> {
        self.free.pop()
    }

    fn release(&mut self, lane: usize) {
        if lane < self.capacity && !self.free.contains(&lane) {
            self.free.push(lane);
        }
    }

    fn grow(&mut self, new_capacity: usize) {
        for lane in self.capacity..new_capacity {
            self.free.insert(0, lane);
        }
        self.capacity = new_capacity;
    }
}

/// A built engine: the audio half, the control half, and the monitor tap.
pub struct EngineRig {
    /// Give this to the audio callback.
    pub audio: AudioEngine,
    /// Keep this on the UI thread.
    pub handle: EngineHandle,
    /// Feed this to the monitor output device, when configured.
    pub monitor: Option<StagingReader>,
}

/// UI-side control surface over a running engine.
pub struct EngineHandle {
    shared: Arc<EngineShared>,
    graphs: Vec<Option<PluginGraph>>,
    /// Per-channel (input, output) meter cells, kept when the strip ships
    /// to the audio side.
    channel_meters: Vec<Option<(Arc<MeterCell>, Arc<MeterCell>)>>,
    scheduler: RoutingScheduler,
    params: ParamSender,
    clock: Arc<AtomicSampleClock>,
    capture_link: Arc<CaptureLink>,
    lanes: LaneAllocator,
    bus: Arc<SignalBus>,
    factory: Arc<PluginFactory>,
    lufs: Arc<LufsCell>,
    master_meters: (Arc<MeterCell>, Arc<MeterCell>),
    master: MasterConfig,
    output_device: Option<String>,
    monitor_device: Option<String>,
    inputs: Vec<hotmic_config::InputConfig>,
    sample_rate: f32,
    block_size: usize,
}

/// Build a connected engine from a persisted config.
///
/// Fails on invalid audio formats or unknown plugin types; a config that
/// needed fixing (missing instance ids, torn containers) is normalized in
/// memory and can be re-persisted via [`EngineHandle::export_config`].
pub fn build_engine(
    config: &EngineConfig,
    factory: Arc<PluginFactory>,
) -> Result<EngineRig, EngineError> {
    config.validate()?;
    let sample_rate = config.sample_rate as f32;
    let block_size = config.block_size;

    let shared = EngineShared::new();
    let clock = Arc::new(AtomicSampleClock::new());
    let capture_link = CaptureLink::new(CAPTURE_LINK_CAPACITY, block_size);
    let (param_tx, param_rx) = param_bridge(shared.diag());

    // Size the bus for the configured producer count.
    let producer_count = config
        .channels
        .iter()
        .flat_map(|c| c.plugins.iter())
        .filter(|p| is_producer_type(&factory, &p.plugin_type, sample_rate, block_size))
        .count();
    let lane_capacity = producer_count.max(MIN_BUS_LANES).next_power_of_two();
    let bus = Arc::new(SignalBus::new(1, lane_capacity, ANALYSIS_WINDOW_SAMPLES));
    shared.bus_generation().store(1, Ordering::Release);

    let (monitor_writer, monitor_reader) = if config.monitor_device.is_some() {
        let (writer, reader) = StagingRing::with_capacity(block_size * 2 * MONITOR_RING_BLOCKS);
        (Some(writer), Some(reader))
    } else {
        (None, None)
    };

    let audio = AudioEngine::new(
        Arc::clone(&shared),
        Arc::clone(&bus),
        Arc::clone(&clock),
        param_rx,
        Arc::clone(&capture_link),
        monitor_writer,
        sample_rate,
        block_size,
    );

    let mut handle = EngineHandle {
        lufs: audio.lufs_cell(),
        master_meters: audio.master_meter_cells(),
        shared,
        graphs: Vec::new(),
        channel_meters: Vec::new(),
        scheduler: RoutingScheduler::new(),
        params: param_tx,
        clock,
        capture_link,
        lanes: LaneAllocator::new(lane_capacity),
        bus,
        factory,
        master: config.master.clone(),
        output_device: config.output_device.clone(),
        monitor_device: config.monitor_device.clone(),
        inputs: config.inputs.clone(),
        sample_rate,
        block_size,
    };

    // Channels; an empty config still gets its mandatory first channel.
    if config.channels.is_empty() {
        handle.add_channel("Mic 1")?;
    } else {
        for channel_config in &config.channels {
            let channel = handle.add_channel(channel_config.name.clone())?;
            handle.load_channel_config(channel, channel_config.clone())?;
        }
    }

    // Master flags ride the same bridge as everything else.
    handle.send_master_state();
    handle.publish_order();

    info!(
        sample_rate,
        block_size,
        channels = handle.graphs.len(),
        "engine built"
    );
    Ok(EngineRig {
        audio,
        handle,
        monitor: monitor_reader,
    })
}

fn is_producer_type(
    factory: &Arc<PluginFactory>,
    type_id: &str,
    sample_rate: f32,
    block_size: usize,
) -> bool {
    factory(type_id, sample_rate, block_size)
        .map(|p| p.produced_signals().is_some())
        .unwrap_or(false)
}

impl EngineHandle {
    // ── Channels ─────────────────────────────────────────────────────────

    /// Create a channel; returns its id.
    pub fn add_channel(&mut self, name: impl Into<String>) -> Result<usize, EngineError> {
        if self.graphs.len() >= MAX_CHANNELS {
            return Err(EngineError::ChannelLimit(MAX_CHANNELS));
        }
        let channel = self.graphs.len();
        let name = name.into();
        let strip = ChannelStrip::new(name.clone(), self.sample_rate, self.block_size);
        self.channel_meters
            .push(Some((strip.input_meter_cell(), strip.output_meter_cell())));
        self.shared.push_command(ChainCommand::AddChannel {
            strip: Box::new(strip),
            routing_buffer: vec![0.0; self.block_size],
        });
        self.graphs.push(Some(PluginGraph::new(
            channel,
            name,
            self.sample_rate,
            self.block_size,
            Arc::clone(&self.shared),
        )));
        self.publish_order();
        Ok(channel)
    }

    /// Remove a channel. Its id is never reused; routing and parameter
    /// targets referencing it become inert.
    pub fn remove_channel(&mut self, channel: usize) -> Result<(), EngineError> {
        let alive = self.graphs.iter().filter(|g| g.is_some()).count();
        if alive <= 1 {
            return Err(EngineError::LastChannel);
        }
        let slot = self
            .graphs
            .get_mut(channel)
            .ok_or(EngineError::NoSuchChannel(channel))?;
        let graph = slot.take().ok_or(EngineError::NoSuchChannel(channel))?;
        // Free the lanes its producers held.
        for entry in graph.entries() {
            if let Some(lane) = entry.lane() {
                self.lanes.release(lane);
            }
        }
        if let Some(cells) = self.channel_meters.get_mut(channel) {
            *cells = None;
        }
        self.scheduler.remove_channel(channel);
        self.shared
            .push_command(ChainCommand::RemoveChannel { channel });
        self.publish_order();
        Ok(())
    }

    /// Attach a staging-ring reader as a channel's hardware input.
    pub fn set_channel_input(
        &mut self,
        channel: usize,
        reader: Option<StagingReader>,
    ) -> Result<(), EngineError> {
        self.graph(channel)?;
        self.shared
            .push_command(ChainCommand::SetChannelInput { channel, reader });
        Ok(())
    }

    /// The graph for a channel.
    pub fn graph(&self, channel: usize) -> Result<&PluginGraph, EngineError> {
        self.graphs
            .get(channel)
            .and_then(Option::as_ref)
            .ok_or(EngineError::NoSuchChannel(channel))
    }

    /// The graph for a channel, mutably (container edits etc.).
    pub fn graph_mut(&mut self, channel: usize) -> Result<&mut PluginGraph, EngineError> {
        self.graphs
            .get_mut(channel)
            .and_then(Option::as_mut)
            .ok_or(EngineError::NoSuchChannel(channel))
    }

    /// Channel ids currently alive.
    pub fn channels(&self) -> impl Iterator<Item = usize> + '_ {
        self.graphs
            .iter()
            .enumerate()
            .filter_map(|(i, g)| g.as_ref().map(|_| i))
    }

    // ── Plugins ──────────────────────────────────────────────────────────

    /// Create a plugin by type id and insert it at `index`.
    pub fn insert_plugin(
        &mut self,
        channel: usize,
        type_id: &str,
        index: usize,
    ) -> Result<u64, EngineError> {
        let plugin = self.create_plugin(type_id)?;
        let lane = self.lane_for(plugin.as_ref())?;
        let graph = self.graph_mut(channel)?;
        Ok(graph.insert_built(plugin, index, lane)?)
    }

    /// Create a plugin and insert it into a container at `position`.
    pub fn insert_plugin_into_container(
        &mut self,
        channel: usize,
        type_id: &str,
        container_id: u64,
        position: usize,
    ) -> Result<u64, EngineError> {
        let plugin = self.create_plugin(type_id)?;
        let lane = self.lane_for(plugin.as_ref())?;
        let graph = self.graph_mut(channel)?;
        Ok(graph.insert_into_container(plugin, container_id, position, lane)?)
    }

    /// Remove a plugin, releasing its bus lane.
    pub fn remove_plugin(&mut self, channel: usize, instance_id: u64) -> Result<(), EngineError> {
        let graph = self.graph_mut(channel)?;
        let lane = graph.remove_plugin(instance_id)?;
        if let Some(lane) = lane {
            self.lanes.release(lane);
        }
        Ok(())
    }

    fn create_plugin(&self, type_id: &str) -> Result<Box<dyn Plugin + Send>, EngineError> {
        (self.factory)(type_id, self.sample_rate, self.block_size)
            .ok_or_else(|| EngineError::Graph(GraphError::UnknownPlugin(type_id.to_string())))
    }

    /// A bus lane for the plugin if it is a producer, growing the bus
    /// when the pool runs dry.
    fn lane_for(&mut self, plugin: &dyn Plugin) -> Result<Option<usize>, EngineError> {
        if plugin.produced_signals().is_none() {
            return Ok(None);
        }
        if let Some(lane) = self.lanes.allocate() {
            return Ok(Some(lane));
        }
        let new_capacity = (self.lanes.capacity * 2).max(MIN_BUS_LANES);
        self.grow_bus(new_capacity);
        Ok(Some(
            self.lanes.allocate().ok_or(GraphError::NoFreeLane)?,
        ))
    }

    /// Grow the bus in place: lane indices stay valid, only the capacity
    /// (and generation) change. In-flight captures for the old generation
    /// are discarded by the orchestrator.
    fn grow_bus(&mut self, lane_capacity: usize) {
        let generation = self.bus.generation() + 1;
        let bus = Arc::new(SignalBus::new(
            generation,
            lane_capacity,
            ANALYSIS_WINDOW_SAMPLES,
        ));
        self.bus = Arc::clone(&bus);
        self.lanes.grow(lane_capacity);
        self.shared
            .bus_generation()
            .store(generation, Ordering::Release);
        self.shared.push_command(ChainCommand::SetBus { bus });
        info!(generation, lane_capacity, "analysis bus grown");
    }

    // ── Parameters ───────────────────────────────────────────────────────

    /// Apply a parameter change by target path.
    ///
    /// Bad paths and unknown targets are rejected here, on the UI thread;
    /// nothing invalid ever reaches audio state.
    pub fn set_parameter(&mut self, path: &str, value: f32) -> Result<(), EngineError> {
        let target = parse_target(path)?;
        self.set_parameter_target(target, value)
    }

    /// Apply a pre-parsed parameter change.
    pub fn set_parameter_target(
        &mut self,
        target: ParamTarget,
        value: f32,
    ) -> Result<(), EngineError> {
        match target {
            ParamTarget::ChannelInputGain { channel } => {
                let clamped = value.clamp(hotmic_config::channel::GAIN_DB_MIN, hotmic_config::channel::GAIN_DB_MAX);
                self.graph_mut(channel)?.config_mut().input_gain_db = clamped;
                self.send(target, clamped);
            }
            ParamTarget::ChannelOutputGain { channel } => {
                let clamped = value.clamp(hotmic_config::channel::GAIN_DB_MIN, hotmic_config::channel::GAIN_DB_MAX);
                self.graph_mut(channel)?.config_mut().output_gain_db = clamped;
                self.send(target, clamped);
            }
            ParamTarget::ChannelMute { channel } => {
                self.graph_mut(channel)?.config_mut().muted = value >= 0.5;
                self.send(target, value);
            }
            ParamTarget::ChannelSolo { channel } => {
                self.graph_mut(channel)?.config_mut().soloed = value >= 0.5;
                self.send(target, value);
            }
            ParamTarget::PluginParam {
                channel,
                instance_id,
                param_index,
            } => {
                let clamped = self
                    .graph_mut(channel)?
                    .set_plugin_parameter(instance_id, param_index, value)?;
                self.send(target, clamped);
            }
            // Container bypass is a structural edit: it fans out to the
            // members as per-slot bypass commands through the graph.
            ParamTarget::ContainerBypass {
                channel,
                container_id,
            } => {
                self.graph_mut(channel)?
                    .set_container_bypass(container_id, value >= 0.5)?;
            }
            ParamTarget::MasterMute => {
                self.master.mute = value >= 0.5;
                self.send(target, value);
            }
            ParamTarget::MasterStereo => {
                self.master.stereo = value >= 0.5;
                self.send(target, value);
            }
        }
        Ok(())
    }

    fn send(&mut self, target: ParamTarget, value: f32) {
        let change = ParamChange {
            target,
            value,
            clock: self.clock.get(),
        };
        if !self.params.send(change) {
            warn!(?target, "parameter bridge full; change dropped");
        }
    }

    fn send_master_state(&mut self) {
        let mute = if self.master.mute { 1.0 } else { 0.0 };
        let stereo = if self.master.stereo { 1.0 } else { 0.0 };
        self.send(ParamTarget::MasterMute, mute);
        self.send(ParamTarget::MasterStereo, stereo);
    }

    // ── Routing ──────────────────────────────────────────────────────────

    /// Declare that `target` reads `source`'s output.
    pub fn add_dependency(&mut self, source: usize, target: usize) -> Result<(), EngineError> {
        self.graph(source)?;
        self.graph(target)?;
        self.scheduler.add_dependency(source, target)?;
        self.publish_order();
        Ok(())
    }

    /// Remove a routing dependency.
    pub fn remove_dependency(&mut self, source: usize, target: usize) -> bool {
        let removed = self.scheduler.remove_dependency(source, target);
        if removed {
            self.publish_order();
        }
        removed
    }

    fn publish_order(&mut self) {
        let alive: Vec<bool> = self.graphs.iter().map(Option::is_some).collect();
        let order =
            self.scheduler
                .compute_order(self.graphs.len(), &alive, &self.shared.diag());
        self.shared.store_order(order);
    }

    // ── Presets ──────────────────────────────────────────────────────────

    /// Freeze the engine for a preset load.
    pub fn begin_preset_load(&mut self) {
        self.shared.push_command(ChainCommand::BeginPresetLoad);
    }

    /// Resume after a preset load.
    pub fn end_preset_load(&mut self) {
        self.shared.push_command(ChainCommand::EndPresetLoad);
    }

    /// Load a whole persisted state: freeze, rebuild the bus and every
    /// chain, resume. Returns true when the config needed normalization.
    pub fn load_preset(&mut self, config: &EngineConfig) -> Result<bool, EngineError> {
        config.validate()?;
        self.begin_preset_load();

        // Fresh bus generation sized for the incoming producer set.
        let producer_count = config
            .channels
            .iter()
            .flat_map(|c| c.plugins.iter())
            .filter(|p| {
                is_producer_type(&self.factory, &p.plugin_type, self.sample_rate, self.block_size)
            })
            .count();
        self.rebuild_bus(producer_count.max(MIN_BUS_LANES).next_power_of_two());

        let mut changed = false;
        for (index, channel_config) in config.channels.iter().enumerate() {
            let channel = if self.graphs.get(index).map_or(false, Option::is_some) {
                index
            } else if index >= self.graphs.len() {
                self.add_channel(channel_config.name.clone())?
            } else {
                // Tombstoned id inside the range: skip, ids are not reused.
                continue;
            };
            changed |= self.load_channel_config(channel, channel_config.clone())?;
        }
        // Channels beyond the preset keep existing but empty would differ
        // from the preset; tombstone them.
        for channel in config.channels.len()..self.graphs.len() {
            if self.graphs[channel].is_some() && self.channels().count() > 1 {
                self.remove_channel(channel)?;
            }
        }

        self.master = config.master.clone();
        self.send_master_state();
        self.publish_order();
        self.end_preset_load();
        Ok(changed)
    }

    fn load_channel_config(
        &mut self,
        channel: usize,
        config: ChannelConfig,
    ) -> Result<bool, EngineError> {
        // Channel-level settings ride the bridge.
        let input_gain = config.input_gain_db;
        let output_gain = config.output_gain_db;
        let muted = config.muted;
        let soloed = config.soloed;

        let factory = Arc::clone(&self.factory);
        let lanes = &mut self.lanes;
        let graph = self
            .graphs
            .get_mut(channel)
            .and_then(Option::as_mut)
            .ok_or(EngineError::NoSuchChannel(channel))?;
        let changed = graph.load_from_config(
            config,
            &|type_id, sr, bs| factory(type_id, sr, bs),
            &mut || lanes.allocate(),
        )?;

        self.set_parameter_target(ParamTarget::ChannelInputGain { channel }, input_gain)?;
        self.set_parameter_target(ParamTarget::ChannelOutputGain { channel }, output_gain)?;
        self.set_parameter_target(
            ParamTarget::ChannelMute { channel },
            if muted { 1.0 } else { 0.0 },
        )?;
        self.set_parameter_target(
            ParamTarget::ChannelSolo { channel },
            if soloed { 1.0 } else { 0.0 },
        )?;
        Ok(changed)
    }

    fn rebuild_bus(&mut self, lane_capacity: usize) {
        let generation = self.bus.generation() + 1;
        let bus = Arc::new(SignalBus::new(
            generation,
            lane_capacity,
            ANALYSIS_WINDOW_SAMPLES,
        ));
        self.bus = Arc::clone(&bus);
        self.lanes = LaneAllocator::new(lane_capacity);
        self.shared
            .bus_generation()
            .store(generation, Ordering::Release);
        self.shared.push_command(ChainCommand::SetBus { bus });
        info!(generation, lane_capacity, "analysis bus rebuilt");
    }

    // ── Persistence ──────────────────────────────────────────────────────

    /// Snapshot the whole engine state as a persistable config.
    pub fn export_config(&self) -> EngineConfig {
        EngineConfig {
            sample_rate: self.sample_rate as u32,
            block_size: self.block_size,
            master: self.master.clone(),
            inputs: self.inputs.clone(),
            output_device: self.output_device.clone(),
            monitor_device: self.monitor_device.clone(),
            channels: self
                .graphs
                .iter()
                .flatten()
                .map(|g| g.config().clone())
                .collect(),
        }
    }

    // ── Housekeeping ─────────────────────────────────────────────────────

    /// Dispose retired slots, chains, and buses. Call periodically from
    /// the UI thread.
    pub fn drain_retired(&self) {
        self.shared.drain_retired(|item| match item {
            RetiredItem::Slot(mut slot) => slot.dispose(),
            RetiredItem::Chain(mut slots) => {
                for slot in &mut slots {
                    slot.dispose();
                }
            }
            RetiredItem::Channel(_) | RetiredItem::Bus(_) => {}
        });
    }

    /// Engine diagnostics.
    pub fn diagnostics(&self) -> Arc<EngineDiagnostics> {
        self.shared.diag()
    }

    /// The capture link (for wiring the analysis orchestrator).
    pub fn capture_link(&self) -> Arc<CaptureLink> {
        Arc::clone(&self.capture_link)
    }

    /// Shared demand bitmap handle (for the orchestrator).
    pub fn shared(&self) -> Arc<EngineShared> {
        Arc::clone(&self.shared)
    }

    /// Replace the visualizer signal demand.
    pub fn request_signals(&self, mask: SignalMask) {
        self.shared.requested().set(mask);
    }

    /// Master LUFS reader.
    pub fn lufs(&self) -> &Arc<LufsCell> {
        &self.lufs
    }

    /// Master peak/RMS readers (left, right).
    pub fn master_meters(&self) -> &(Arc<MeterCell>, Arc<MeterCell>) {
        &self.master_meters
    }

    /// A channel's (input, output) meter readers.
    pub fn channel_meters(
        &self,
        channel: usize,
    ) -> Option<&(Arc<MeterCell>, Arc<MeterCell>)> {
        self.channel_meters.get(channel).and_then(Option::as_ref)
    }

    /// Current sample clock.
    pub fn sample_clock(&self) -> u64 {
        self.clock.get()
    }

    /// Committed sample rate.
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Committed block size.
    pub fn block_size(&self) -> usize {
        self.block_size
    }
}
