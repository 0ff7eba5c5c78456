//! The plugin graph: canonical, UI-side model of a channel's chain.
//!
//! The graph owns three views that must stay mutually consistent after
//! every edit: the ordered entry list (mirroring the live chain), the
//! persisted [`ChannelConfig`], and the container set. Edits mutate the
//! model first, then [`normalize`](PluginGraph::normalize) restores every
//! invariant, then the matching [`ChainCommand`]s go to the audio side.
//!
//! Invariants after every operation:
//!
//! - config plugin order ≡ chain order, entry for entry
//! - every chain plugin has exactly one config entry, keyed by instance id
//! - each container's members exist, are sorted by chain position, and
//!   occupy a contiguous run; out-of-place members are dropped
//! - container ids are unique; an instance id joins at most one container

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use hotmic_config::{ChannelConfig, ContainerConfig, PluginConfig};
use hotmic_core::meter::MeterCell;
use hotmic_core::params::ParamDescriptor;
use hotmic_core::plugin::{Plugin, find_param_by_name};
use hotmic_core::signal::SignalMask;

use crate::MAX_SLOTS;
use crate::chain::{PluginSlot, SlotStats};
use crate::delta::SpectralDeltaCell;
use crate::shared::{ChainCommand, EngineShared};

/// Why a graph edit was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// Unknown plugin type id.
    #[error("unknown plugin type: {0}")]
    UnknownPlugin(String),
    /// No plugin with this instance id.
    #[error("no plugin with instance id {0}")]
    NoSuchPlugin(u64),
    /// No container with this id.
    #[error("no container with id {0}")]
    NoSuchContainer(u64),
    /// The chain is at capacity.
    #[error("chain is full ({0} slots)")]
    ChainFull(usize),
    /// A parameter index beyond the plugin's table.
    #[error("plugin {0} has no parameter {1}")]
    NoSuchParam(u64, usize),
    /// Every producer lane is taken.
    #[error("no free analysis bus lane")]
    NoFreeLane,
}

/// A named group of contiguous chain plugins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    /// Container id, unique within the channel, > 0.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Shared bypass; flipping it fans out to every member.
    pub bypassed: bool,
    /// Member instance ids in chain order.
    pub members: Vec<u64>,
}

/// UI-side record of one chain slot.
pub struct GraphEntry {
    instance_id: u64,
    type_id: String,
    bypassed: bool,
    produced: SignalMask,
    lane: Option<usize>,
    latency: u32,
    descriptors: Vec<ParamDescriptor>,
    param_values: Vec<f32>,
    meter: Arc<MeterCell>,
    stats: Arc<SlotStats>,
    delta: Arc<SpectralDeltaCell>,
}

impl GraphEntry {
    /// Stable instance id.
    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    /// Registry type id.
    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    /// User bypass flag (mirrored on the live slot and the config).
    pub fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    /// Signals this slot produces.
    pub fn produced_signals(&self) -> SignalMask {
        self.produced
    }

    /// Assigned bus lane, if a producer.
    pub fn lane(&self) -> Option<usize> {
        self.lane
    }

    /// Reported latency in samples.
    pub fn latency(&self) -> u32 {
        self.latency
    }

    /// Post-slot meter reader.
    pub fn meter(&self) -> &Arc<MeterCell> {
        &self.meter
    }

    /// Profiling counters reader.
    pub fn stats(&self) -> &Arc<SlotStats> {
        &self.stats
    }

    /// Spectral-delta reader.
    pub fn delta(&self) -> &Arc<SpectralDeltaCell> {
        &self.delta
    }

    /// Parameter descriptors.
    pub fn descriptors(&self) -> &[ParamDescriptor] {
        &self.descriptors
    }

    /// Mirrored parameter values.
    pub fn param_values(&self) -> &[f32] {
        &self.param_values
    }
}

/// Canonical model of one channel's chain and containers.
pub struct PluginGraph {
    channel: usize,
    sample_rate: f32,
    block_size: usize,
    next_instance_id: u64,
    next_container_id: u64,
    entries: Vec<GraphEntry>,
    containers: Vec<Container>,
    config: ChannelConfig,
    shared: Arc<EngineShared>,
}

impl PluginGraph {
    /// Create the graph for a fresh channel.
    pub fn new(
        channel: usize,
        name: impl Into<String>,
        sample_rate: f32,
        block_size: usize,
        shared: Arc<EngineShared>,
    ) -> Self {
        Self {
            channel,
            sample_rate,
            block_size,
            next_instance_id: 1,
            next_container_id: 1,
            entries: Vec::new(),
            containers: Vec::new(),
            config: ChannelConfig::new(name),
            shared,
        }
    }

    /// Channel id this graph manages.
    pub fn channel(&self) -> usize {
        self.channel
    }

    /// The persisted mirror; always normalized.
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Channel-level settings mirror (gains, mute, solo).
    pub fn config_mut(&mut self) -> &mut ChannelConfig {
        &mut self.config
    }

    /// Entries in chain order.
    pub fn entries(&self) -> &[GraphEntry] {
        &self.entries
    }

    /// Containers in creation order.
    pub fn containers(&self) -> &[Container] {
        &self.containers
    }

    /// Look up an entry and its chain index.
    pub fn entry(&self, instance_id: u64) -> Option<(usize, &GraphEntry)> {
        self.entries
            .iter()
            .enumerate()
            .find(|(_, e)| e.instance_id == instance_id)
    }

    /// Current chain order as instance ids.
    pub fn order(&self) -> Vec<u64> {
        self.entries.iter().map(|e| e.instance_id).collect()
    }

    // ── Plugin edits ─────────────────────────────────────────────────────

    /// Insert an already-created (and initialized) plugin at `index`;
    /// out-of-range indices append. Returns the assigned instance id.
    ///
    /// `lane` must be provided when the plugin declares produced signals.
    pub fn insert_built(
        &mut self,
        plugin: Box<dyn Plugin + Send>,
        index: usize,
        lane: Option<usize>,
    ) -> Result<u64, GraphError> {
        if self.entries.len() >= MAX_SLOTS {
            return Err(GraphError::ChainFull(MAX_SLOTS));
        }
        let instance_id = self.next_instance_id;
        self.next_instance_id += 1;

        let index = index.min(self.entries.len());
        let (entry, slot) = self.build_slot(instance_id, plugin, lane, false);
        self.entries.insert(index, entry);
        info!(
            channel = self.channel,
            instance_id,
            type_id = %self.entries[index].type_id,
            index,
            "insert plugin"
        );
        self.shared.push_command(ChainCommand::InsertSlot {
            channel: self.channel,
            index,
            slot: Box::new(slot),
        });
        self.normalize();
        Ok(instance_id)
    }

    /// Insert a plugin adjacent to a container's members and join it.
    ///
    /// `position` 0 goes immediately before the current first member;
    /// `position >= len` immediately after the last.
    pub fn insert_into_container(
        &mut self,
        plugin: Box<dyn Plugin + Send>,
        container_id: u64,
        position: usize,
        lane: Option<usize>,
    ) -> Result<u64, GraphError> {
        let container = self
            .containers
            .iter()
            .find(|c| c.id == container_id)
            .ok_or(GraphError::NoSuchContainer(container_id))?;

        let chain_index = if container.members.is_empty() {
            self.entries.len()
        } else {
            let positions: Vec<usize> = container
                .members
                .iter()
                .filter_map(|id| self.entry(*id).map(|(i, _)| i))
                .collect();
            let first = positions.iter().copied().min().unwrap_or(0);
            if position == 0 {
                first
            } else {
                let last = positions.iter().copied().max().unwrap_or(first);
                (first + position).min(last + 1)
            }
        };
        let member_position = position.min(
            self.containers
                .iter()
                .find(|c| c.id == container_id)
                .map_or(0, |c| c.members.len()),
        );

        let instance_id = self.insert_built(plugin, chain_index, lane)?;
        let mut inherits_bypass = false;
        if let Some(container) = self.containers.iter_mut().find(|c| c.id == container_id) {
            container.members.insert(member_position, instance_id);
            // A container's bypass covers everything inside it.
            inherits_bypass = container.bypassed;
        }
        if inherits_bypass {
            self.apply_bypass(instance_id, true);
        }
        self.normalize();
        Ok(instance_id)
    }

    /// Remove a plugin from the chain, its container, and the config.
    ///
    /// Returns the freed bus lane, if the plugin held one, so the caller
    /// can recycle it.
    pub fn remove_plugin(&mut self, instance_id: u64) -> Result<Option<usize>, GraphError> {
        let index = self
            .entries
            .iter()
            .position(|e| e.instance_id == instance_id)
            .ok_or(GraphError::NoSuchPlugin(instance_id))?;
        let entry = self.entries.remove(index);
        for container in &mut self.containers {
            container.members.retain(|&id| id != instance_id);
        }
        info!(channel = self.channel, instance_id, "remove plugin");
        self.shared.push_command(ChainCommand::RemoveSlot {
            channel: self.channel,
            instance_id,
        });
        self.normalize();
        Ok(entry.lane)
    }

    /// Move a plugin to a chain index (clamped). A move that would leave
    /// its container non-contiguous removes it from the container.
    ///
    /// Returns false for a no-op.
    pub fn move_plugin(&mut self, instance_id: u64, to_index: usize) -> Result<bool, GraphError> {
        let from = self
            .entries
            .iter()
            .position(|e| e.instance_id == instance_id)
            .ok_or(GraphError::NoSuchPlugin(instance_id))?;
        let to = to_index.min(self.entries.len().saturating_sub(1));
        if from == to {
            return Ok(false);
        }

        let entry = self.entries.remove(from);
        self.entries.insert(to, entry);

        // Membership policy: the moved plugin leaves its container if the
        // move broke the container's contiguity.
        if let Some(container) = self
            .containers
            .iter_mut()
            .find(|c| c.members.contains(&instance_id))
        {
            let positions: Vec<usize> = container
                .members
                .iter()
                .filter_map(|id| {
                    self.entries
                        .iter()
                        .position(|e| e.instance_id == *id)
                })
                .collect();
            let min = positions.iter().copied().min().unwrap_or(0);
            let max = positions.iter().copied().max().unwrap_or(0);
            if max - min + 1 != positions.len() {
                container.members.retain(|&id| id != instance_id);
                debug!(instance_id, "move tore container membership");
            }
        }

        self.push_reorder();
        self.normalize();
        Ok(true)
    }

    /// Permute a plugin within its container; slots outside the container
    /// keep their positions.
    pub fn move_plugin_within_container(
        &mut self,
        instance_id: u64,
        container_id: u64,
        position: usize,
    ) -> Result<bool, GraphError> {
        let container = self
            .containers
            .iter_mut()
            .find(|c| c.id == container_id)
            .ok_or(GraphError::NoSuchContainer(container_id))?;
        let member_index = container
            .members
            .iter()
            .position(|&id| id == instance_id)
            .ok_or(GraphError::NoSuchPlugin(instance_id))?;

        let position = position.min(container.members.len() - 1);
        if position == member_index {
            return Ok(false);
        }
        let id = container.members.remove(member_index);
        container.members.insert(position, id);
        let members = container.members.clone();

        // The container occupies a fixed set of chain positions; lay the
        // permuted members back into exactly those positions.
        let mut positions: Vec<usize> = members
            .iter()
            .filter_map(|id| {
                self.entries
                    .iter()
                    .position(|e| e.instance_id == *id)
            })
            .collect();
        positions.sort_unstable();
        for (slot_position, member) in positions.iter().zip(&members) {
            if let Some(current) = self
                .entries
                .iter()
                .position(|e| e.instance_id == *member)
                && current != *slot_position
            {
                let entry = self.entries.remove(current);
                self.entries.insert(*slot_position, entry);
            }
        }

        self.push_reorder();
        self.normalize();
        Ok(true)
    }

    // ── Containers ───────────────────────────────────────────────────────

    /// Create an empty container. Returns its id.
    pub fn create_container(&mut self, name: impl Into<String>) -> u64 {
        let id = self.next_container_id;
        self.next_container_id += 1;
        self.containers.push(Container {
            id,
            name: name.into(),
            bypassed: false,
            members: Vec::new(),
        });
        self.normalize();
        id
    }

    /// Delete a container. Its plugins stay in the chain, un-grouped.
    pub fn remove_container(&mut self, container_id: u64) -> Result<(), GraphError> {
        let before = self.containers.len();
        self.containers.retain(|c| c.id != container_id);
        if self.containers.len() == before {
            return Err(GraphError::NoSuchContainer(container_id));
        }
        self.normalize();
        Ok(())
    }

    /// Flip a container's bypass; every member follows.
    pub fn set_container_bypass(
        &mut self,
        container_id: u64,
        bypassed: bool,
    ) -> Result<(), GraphError> {
        let members = {
            let container = self
                .containers
                .iter_mut()
                .find(|c| c.id == container_id)
                .ok_or(GraphError::NoSuchContainer(container_id))?;
            container.bypassed = bypassed;
            container.members.clone()
        };
        for id in members {
            self.apply_bypass(id, bypassed);
        }
        self.normalize();
        Ok(())
    }

    /// Put a plugin into a container (leaving any previous one), moving it
    /// to sit immediately after the container's current members.
    pub fn assign_to_container(
        &mut self,
        instance_id: u64,
        container_id: u64,
    ) -> Result<(), GraphError> {
        let from = self
            .entries
            .iter()
            .position(|e| e.instance_id == instance_id)
            .ok_or(GraphError::NoSuchPlugin(instance_id))?;
        let (target, bypassed) = {
            let container = self
                .containers
                .iter()
                .find(|c| c.id == container_id)
                .ok_or(GraphError::NoSuchContainer(container_id))?;
            let target = container
                .members
                .iter()
                .filter(|&&id| id != instance_id)
                .filter_map(|id| self.entry(*id).map(|(i, _)| i))
                .max()
                .map_or(self.entries.len(), |last| last + 1);
            (target, container.bypassed)
        };
        for container in &mut self.containers {
            container.members.retain(|&id| id != instance_id);
        }

        // Move the plugin to sit immediately after the container's block.
        let target = if from < target {
            target.saturating_sub(1)
        } else {
            target
        };
        let entry = self.entries.remove(from);
        self.entries.insert(target.min(self.entries.len()), entry);

        if let Some(container) = self.containers.iter_mut().find(|c| c.id == container_id) {
            container.members.push(instance_id);
        }
        if bypassed {
            self.apply_bypass(instance_id, true);
        }
        self.push_reorder();
        self.normalize();
        Ok(())
    }

    /// Move a whole container block to a chain index, preserving internal
    /// order. Moving members are excluded from the displacement count, so
    /// the index addresses the chain as it looks without them.
    pub fn move_container(
        &mut self,
        container_id: u64,
        to_index: usize,
    ) -> Result<bool, GraphError> {
        let members = self
            .containers
            .iter()
            .find(|c| c.id == container_id)
            .ok_or(GraphError::NoSuchContainer(container_id))?
            .members
            .clone();
        if members.is_empty() {
            return Ok(false);
        }

        // Pull the block out in order. The target index then addresses
        // the chain without the moving members.
        let mut block = Vec::with_capacity(members.len());
        for id in &members {
            if let Some(pos) = self.entries.iter().position(|e| e.instance_id == *id) {
                block.push(self.entries.remove(pos));
            }
        }
        let mut to = to_index.min(self.entries.len());

        // Never land inside another container's span; its run is
        // preserved by snapping the insertion point past it.
        for other in &self.containers {
            if other.id == container_id || other.members.is_empty() {
                continue;
            }
            let positions: Vec<usize> = other
                .members
                .iter()
                .filter_map(|id| {
                    self.entries
                        .iter()
                        .position(|e| e.instance_id == *id)
                })
                .collect();
            if let (Some(&min), Some(&max)) = (positions.iter().min(), positions.iter().max())
                && to > min
                && to <= max
            {
                to = max + 1;
            }
        }

        for (offset, entry) in block.into_iter().enumerate() {
            self.entries.insert(to + offset, entry);
        }

        self.push_reorder();
        self.normalize();
        Ok(true)
    }

    // ── Plugin settings ──────────────────────────────────────────────────

    /// Set a plugin's bypass flag; mirrored onto the slot and the config.
    pub fn set_plugin_bypass(&mut self, instance_id: u64, bypassed: bool) -> Result<(), GraphError> {
        if self.entry(instance_id).is_none() {
            return Err(GraphError::NoSuchPlugin(instance_id));
        }
        self.apply_bypass(instance_id, bypassed);
        self.normalize();
        Ok(())
    }

    /// Mirror a parameter change into the model and config; returns the
    /// clamped value the caller should deliver over the bridge.
    pub fn set_plugin_parameter(
        &mut self,
        instance_id: u64,
        param_index: usize,
        value: f32,
    ) -> Result<f32, GraphError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.instance_id == instance_id)
            .ok_or(GraphError::NoSuchPlugin(instance_id))?;
        let Some(descriptor) = entry.descriptors.get(param_index) else {
            return Err(GraphError::NoSuchParam(instance_id, param_index));
        };
        let clamped = descriptor.clamp(value);
        entry.param_values[param_index] = clamped;
        let name = descriptor.name.to_string();
        if let Some(plugin_config) = self.config.plugin_mut(instance_id) {
            plugin_config.params.insert(name, clamped);
        }
        Ok(clamped)
    }

    /// Store a plugin state blob in the config. Applied to the live plugin
    /// at the next chain rebuild (state blobs are load-time data).
    pub fn set_plugin_state(&mut self, instance_id: u64, state: Vec<u8>) -> Result<(), GraphError> {
        let plugin_config = self
            .config
            .plugin_mut(instance_id)
            .ok_or(GraphError::NoSuchPlugin(instance_id))?;
        plugin_config.state = state;
        Ok(())
    }

    // ── Config rebuild ───────────────────────────────────────────────────

    /// Rebuild the whole chain from a persisted config.
    ///
    /// Instance ids of 0 (or colliding) are reassigned. Returns true when
    /// the loaded config needed fixing, so the caller may persist.
    ///
    /// `factory` creates plugins by type id; `allocate_lane` hands out bus
    /// lanes for producers.
    pub fn load_from_config(
        &mut self,
        mut config: ChannelConfig,
        factory: &dyn Fn(&str, f32, usize) -> Option<Box<dyn Plugin + Send>>,
        allocate_lane: &mut dyn FnMut() -> Option<usize>,
    ) -> Result<bool, GraphError> {
        let mut changed = false;
        config.clamp_gains();

        // Pass 1: resolve instance ids.
        let mut used: Vec<u64> = Vec::new();
        let mut next = self.next_instance_id.max(1);
        for plugin_config in &mut config.plugins {
            if plugin_config.instance_id == 0 || used.contains(&plugin_config.instance_id) {
                while used.contains(&next) {
                    next += 1;
                }
                plugin_config.instance_id = next;
                changed = true;
            }
            used.push(plugin_config.instance_id);
            next = next.max(plugin_config.instance_id + 1);
        }
        self.next_instance_id = next;

        // Pass 2: build slots.
        let mut entries = Vec::with_capacity(config.plugins.len());
        let mut slots = Vec::with_capacity(config.plugins.len());
        for plugin_config in &config.plugins {
            let mut plugin = factory(
                &plugin_config.plugin_type,
                self.sample_rate,
                self.block_size,
            )
            .ok_or_else(|| GraphError::UnknownPlugin(plugin_config.plugin_type.clone()))?;

            if !plugin_config.state.is_empty() {
                plugin.load_state(&plugin_config.state);
            }
            for (name, value) in &plugin_config.params {
                if let Some(index) = find_param_by_name(plugin.as_ref(), name) {
                    plugin.set_param(index, *value);
                }
            }

            let lane = if plugin.produced_signals().is_some() {
                Some(allocate_lane().ok_or(GraphError::NoFreeLane)?)
            } else {
                None
            };
            let (entry, slot) = self.build_slot(
                plugin_config.instance_id,
                plugin,
                lane,
                plugin_config.bypassed,
            );
            entries.push(entry);
            slots.push(slot);
        }

        // Pass 3: adopt containers.
        let mut containers = Vec::new();
        let mut next_container = self.next_container_id.max(1);
        for container_config in &config.containers {
            let mut id = container_config.id;
            if id == 0 || containers.iter().any(|c: &Container| c.id == id) {
                id = next_container;
                changed = true;
            }
            next_container = next_container.max(id + 1);
            containers.push(Container {
                id,
                name: container_config.name.clone(),
                bypassed: container_config.bypassed,
                members: container_config.plugin_instance_ids.clone(),
            });
        }
        self.next_container_id = next_container;

        self.entries = entries;
        self.containers = containers;
        self.config = config;

        info!(
            channel = self.channel,
            plugins = self.entries.len(),
            containers = self.containers.len(),
            "chain rebuilt from config"
        );
        self.shared.push_command(ChainCommand::ReplaceChain {
            channel: self.channel,
            slots,
        });

        // Container bypass fans out to the freshly built members.
        let fanout: Vec<(u64, bool)> = self
            .containers
            .iter()
            .filter(|c| c.bypassed)
            .flat_map(|c| c.members.iter().map(|&id| (id, true)))
            .collect();
        for (id, bypassed) in fanout {
            self.apply_bypass(id, bypassed);
        }

        changed |= self.normalize();
        Ok(changed)
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn build_slot(
        &self,
        instance_id: u64,
        plugin: Box<dyn Plugin + Send>,
        lane: Option<usize>,
        bypassed: bool,
    ) -> (GraphEntry, PluginSlot) {
        let descriptors: Vec<ParamDescriptor> = (0..plugin.param_count())
            .filter_map(|i| plugin.param_info(i))
            .collect();
        let param_values: Vec<f32> = (0..descriptors.len())
            .map(|i| plugin.get_param(i))
            .collect();
        let produced = plugin.produced_signals().unwrap_or(SignalMask::EMPTY);
        let latency = plugin.latency_samples();
        let type_id = plugin.id().to_string();

        let mut slot = PluginSlot::new(instance_id, plugin, self.sample_rate, self.block_size);
        slot.set_producer_lane(lane);
        slot.set_bypassed(bypassed);

        let entry = GraphEntry {
            instance_id,
            type_id,
            bypassed,
            produced,
            lane,
            latency,
            descriptors,
            param_values,
            meter: slot.meter_cell(),
            stats: slot.stats(),
            delta: slot.delta_cell(),
        };
        (entry, slot)
    }

    fn apply_bypass(&mut self, instance_id: u64, bypassed: bool) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.instance_id == instance_id)
        {
            entry.bypassed = bypassed;
        }
        if let Some(plugin_config) = self.config.plugin_mut(instance_id) {
            plugin_config.bypassed = bypassed;
        }
        self.shared.push_command(ChainCommand::SetSlotBypass {
            channel: self.channel,
            instance_id,
            bypassed,
        });
    }

    fn push_reorder(&self) {
        self.shared.push_command(ChainCommand::Reorder {
            channel: self.channel,
            order: self.order(),
        });
    }

    /// Restore every cross-view invariant. Returns true if anything moved.
    fn normalize(&mut self) -> bool {
        let mut changed = false;

        // Containers: members must exist, no double membership, sorted by
        // chain position, contiguous.
        let mut seen: Vec<u64> = Vec::new();
        for container in &mut self.containers {
            let before = container.members.clone();
            container
                .members
                .retain(|id| !seen.contains(id) && self.entries.iter().any(|e| e.instance_id == *id));
            container.members.sort_by_key(|id| {
                self.entries
                    .iter()
                    .position(|e| e.instance_id == *id)
                    .unwrap_or(usize::MAX)
            });

            // Contiguity: keep the run anchored at the first member; any
            // member past a gap is dropped.
            let positions: Vec<usize> = container
                .members
                .iter()
                .filter_map(|id| {
                    self.entries
                        .iter()
                        .position(|e| e.instance_id == *id)
                })
                .collect();
            let mut keep = container.members.len();
            for (i, window) in positions.windows(2).enumerate() {
                if window[1] != window[0] + 1 {
                    keep = i + 1;
                    break;
                }
            }
            container.members.truncate(keep);
            seen.extend(container.members.iter().copied());
            changed |= before != container.members;
        }

        // Config plugin order follows entry order; existing config data is
        // carried over by instance id, missing entries are created.
        let mut plugins = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let mut plugin_config = self
                .config
                .plugins
                .iter()
                .find(|p| p.instance_id == entry.instance_id)
                .cloned()
                .unwrap_or_else(|| {
                    changed = true;
                    PluginConfig::new(entry.type_id.clone()).with_instance_id(entry.instance_id)
                });
            plugin_config.bypassed = entry.bypassed;
            for (descriptor, value) in entry.descriptors.iter().zip(&entry.param_values) {
                plugin_config
                    .params
                    .insert(descriptor.name.to_string(), *value);
            }
            plugins.push(plugin_config);
        }
        if self.config.plugins.len() != plugins.len() {
            changed = true;
        }
        self.config.plugins = plugins;

        // Config containers mirror the model.
        self.config.containers = self
            .containers
            .iter()
            .map(|c| {
                let mut config = ContainerConfig::new(c.id, c.name.clone());
                config.bypassed = c.bypassed;
                config.plugin_instance_ids = c.members.clone();
                config
            })
            .collect();

        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotmic_core::context::ProcessContext;

    struct TestPlugin {
        kind: &'static str,
        produced: SignalMask,
    }

    impl TestPlugin {
        fn boxed(kind: &'static str) -> Box<dyn Plugin + Send> {
            Box::new(Self {
                kind,
                produced: SignalMask::EMPTY,
            })
        }

        fn producer(kind: &'static str, produced: SignalMask) -> Box<dyn Plugin + Send> {
            Box::new(Self { kind, produced })
        }
    }

    impl Plugin for TestPlugin {
        fn id(&self) -> &'static str {
            self.kind
        }
        fn name(&self) -> &'static str {
            self.kind
        }
        fn initialize(&mut self, _sample_rate: f32, _block_size: usize) {}
        fn process(&mut self, _buffer: &mut [f32], _ctx: &mut ProcessContext<'_>) {}
        fn param_count(&self) -> usize {
            1
        }
        fn param_info(&self, index: usize) -> Option<ParamDescriptor> {
            (index == 0).then(|| ParamDescriptor::gain_db("Level", -24.0, 24.0, 0.0))
        }
        fn get_param(&self, _index: usize) -> f32 {
            0.0
        }
        fn produced_signals(&self) -> Option<SignalMask> {
            if self.produced.is_empty() {
                None
            } else {
                Some(self.produced)
            }
        }
    }

    fn graph() -> PluginGraph {
        PluginGraph::new(0, "Test", 48000.0, 256, EngineShared::new())
    }

    #[test]
    fn insert_assigns_monotonic_ids() {
        let mut graph = graph();
        let a = graph.insert_built(TestPlugin::boxed("a"), 0, None).unwrap();
        let b = graph.insert_built(TestPlugin::boxed("b"), 99, None).unwrap();
        assert!(b > a);
        assert_eq!(graph.order(), vec![a, b]);
        // Config mirrors the chain, entry for entry.
        let config_ids: Vec<u64> = graph.config().plugins.iter().map(|p| p.instance_id).collect();
        assert_eq!(config_ids, vec![a, b]);
    }

    #[test]
    fn remove_returns_lane_and_cleans_config() {
        let mut graph = graph();
        let id = graph
            .insert_built(
                TestPlugin::producer("prod", hotmic_core::signal::AnalysisSignal::PitchHz.bit()),
                0,
                Some(3),
            )
            .unwrap();
        assert_eq!(graph.remove_plugin(id).unwrap(), Some(3));
        assert!(graph.config().plugins.is_empty());
        assert_eq!(
            graph.remove_plugin(id),
            Err(GraphError::NoSuchPlugin(id))
        );
    }

    #[test]
    fn move_is_clamped_and_noop_aware() {
        let mut graph = graph();
        let a = graph.insert_built(TestPlugin::boxed("a"), 0, None).unwrap();
        let b = graph.insert_built(TestPlugin::boxed("b"), 1, None).unwrap();
        // Same position: no-op.
        assert!(!graph.move_plugin(a, 0).unwrap());
        // Out-of-range clamps to the end.
        assert!(graph.move_plugin(a, 50).unwrap());
        assert_eq!(graph.order(), vec![b, a]);
    }

    #[test]
    fn container_lifecycle() {
        let mut graph = graph();
        let a = graph.insert_built(TestPlugin::boxed("a"), 0, None).unwrap();
        let b = graph.insert_built(TestPlugin::boxed("b"), 1, None).unwrap();
        let c = graph.insert_built(TestPlugin::boxed("c"), 2, None).unwrap();

        let group = graph.create_container("Group");
        graph.assign_to_container(a, group).unwrap();
        graph.assign_to_container(c, group).unwrap();

        // Members are contiguous and ordered by chain position.
        let container = &graph.containers()[0];
        assert_eq!(container.members, vec![a, c]);
        let pos_a = graph.entry(a).unwrap().0;
        let pos_c = graph.entry(c).unwrap().0;
        assert_eq!(pos_c, pos_a + 1);

        // Deleting the container keeps the plugins.
        graph.remove_container(group).unwrap();
        assert_eq!(graph.entries().len(), 3);
        assert!(graph.containers().is_empty());
        let _ = b;
    }

    #[test]
    fn container_bypass_fans_out_to_members() {
        let mut graph = graph();
        let a = graph.insert_built(TestPlugin::boxed("a"), 0, None).unwrap();
        let b = graph.insert_built(TestPlugin::boxed("b"), 1, None).unwrap();
        let group = graph.create_container("Group");
        graph.assign_to_container(a, group).unwrap();
        graph.assign_to_container(b, group).unwrap();

        graph.set_container_bypass(group, true).unwrap();
        assert!(graph.entry(a).unwrap().1.is_bypassed());
        assert!(graph.entry(b).unwrap().1.is_bypassed());
        assert!(graph.config().plugin(a).unwrap().bypassed);

        // A plugin inserted into a bypassed container inherits the state.
        let c = graph
            .insert_into_container(TestPlugin::boxed("c"), group, 1, None)
            .unwrap();
        assert!(graph.entry(c).unwrap().1.is_bypassed());
    }

    #[test]
    fn insert_into_container_positions() {
        let mut graph = graph();
        let outer = graph.insert_built(TestPlugin::boxed("x"), 0, None).unwrap();
        let a = graph.insert_built(TestPlugin::boxed("a"), 1, None).unwrap();
        let b = graph.insert_built(TestPlugin::boxed("b"), 2, None).unwrap();
        let group = graph.create_container("Group");
        graph.assign_to_container(a, group).unwrap();
        graph.assign_to_container(b, group).unwrap();

        // Position 0 lands immediately before the first member.
        let front = graph
            .insert_into_container(TestPlugin::boxed("f"), group, 0, None)
            .unwrap();
        assert_eq!(graph.order(), vec![outer, front, a, b]);
        assert_eq!(graph.containers()[0].members, vec![front, a, b]);

        // Position past the end lands after the last member.
        let back = graph
            .insert_into_container(TestPlugin::boxed("z"), group, 9, None)
            .unwrap();
        assert_eq!(graph.order(), vec![outer, front, a, b, back]);
        assert_eq!(graph.containers()[0].members, vec![front, a, b, back]);
    }

    #[test]
    fn move_within_container_leaves_outsiders_alone() {
        let mut graph = graph();
        let pre = graph.insert_built(TestPlugin::boxed("pre"), 0, None).unwrap();
        let a = graph.insert_built(TestPlugin::boxed("a"), 1, None).unwrap();
        let b = graph.insert_built(TestPlugin::boxed("b"), 2, None).unwrap();
        let c = graph.insert_built(TestPlugin::boxed("c"), 3, None).unwrap();
        let post = graph.insert_built(TestPlugin::boxed("post"), 4, None).unwrap();
        let group = graph.create_container("Group");
        for id in [a, b, c] {
            graph.assign_to_container(id, group).unwrap();
        }
        // Assignment packs the group at the end: [pre, post, a, b, c].
        assert_eq!(graph.order(), vec![pre, post, a, b, c]);

        // Permuting inside the group touches only the group's positions.
        graph.move_plugin_within_container(c, group, 0).unwrap();
        assert_eq!(graph.order(), vec![pre, post, c, a, b]);
        assert_eq!(graph.containers()[0].members, vec![c, a, b]);
    }

    #[test]
    fn move_that_tears_container_drops_membership() {
        let mut graph = graph();
        let a = graph.insert_built(TestPlugin::boxed("a"), 0, None).unwrap();
        let b = graph.insert_built(TestPlugin::boxed("b"), 1, None).unwrap();
        let tail = graph.insert_built(TestPlugin::boxed("t"), 2, None).unwrap();
        let group = graph.create_container("Group");
        graph.assign_to_container(a, group).unwrap();
        graph.assign_to_container(b, group).unwrap();
        // Group packed at the end: [tail, a, b].
        assert_eq!(graph.order(), vec![tail, a, b]);

        // Pull `a` to the front, past the ungrouped slot: the container
        // would tear, so the moved plugin leaves it.
        graph.move_plugin(a, 0).unwrap();
        assert_eq!(graph.containers()[0].members, vec![b]);
        assert_eq!(graph.order(), vec![a, tail, b]);
    }

    #[test]
    fn move_container_as_block() {
        let mut graph = graph();
        let a = graph.insert_built(TestPlugin::boxed("a"), 0, None).unwrap();
        let b = graph.insert_built(TestPlugin::boxed("b"), 1, None).unwrap();
        let x = graph.insert_built(TestPlugin::boxed("x"), 2, None).unwrap();
        let y = graph.insert_built(TestPlugin::boxed("y"), 3, None).unwrap();
        let group = graph.create_container("Group");
        graph.assign_to_container(a, group).unwrap();
        graph.assign_to_container(b, group).unwrap();
        // Group packed at the end: [x, y, a, b].
        assert_eq!(graph.order(), vec![x, y, a, b]);

        // Moving the whole group to the front keeps internal order.
        graph.move_container(group, 0).unwrap();
        assert_eq!(graph.order(), vec![a, b, x, y]);
        assert_eq!(graph.containers()[0].members, vec![a, b]);
    }

    #[test]
    fn load_from_config_assigns_missing_ids() {
        let mut graph = graph();
        let config = ChannelConfig::new("Mic")
            .with_plugin(PluginConfig::new("alpha"))
            .with_plugin(PluginConfig::new("beta").with_instance_id(7))
            .with_plugin(PluginConfig::new("alpha").with_instance_id(7)); // collision

        let factory = |type_id: &str, _: f32, _: usize| -> Option<Box<dyn Plugin + Send>> {
            match type_id {
                "alpha" => Some(TestPlugin::boxed("alpha")),
                "beta" => Some(TestPlugin::boxed("beta")),
                _ => None,
            }
        };
        let changed = graph
            .load_from_config(config, &factory, &mut || None)
            .unwrap();
        assert!(changed);

        let ids = graph.order();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[1], 7);
        assert_ne!(ids[0], ids[2]);
        assert!(ids.iter().all(|&id| id > 0));

        // A second load of the exported config is stable.
        let exported = graph.config().clone();
        let changed = graph
            .load_from_config(exported.clone(), &factory, &mut || None)
            .unwrap();
        assert!(!changed);
        assert_eq!(graph.config(), &exported);
    }

    #[test]
    fn load_rejects_unknown_plugin_types() {
        let mut graph = graph();
        let config = ChannelConfig::new("Mic").with_plugin(PluginConfig::new("mystery"));
        let factory =
            |_: &str, _: f32, _: usize| -> Option<Box<dyn Plugin + Send>> { None };
        assert_eq!(
            graph.load_from_config(config, &factory, &mut || None),
            Err(GraphError::UnknownPlugin("mystery".into()))
        );
    }

    #[test]
    fn parameter_mirrors_into_config() {
        let mut graph = graph();
        let id = graph.insert_built(TestPlugin::boxed("a"), 0, None).unwrap();
        let clamped = graph.set_plugin_parameter(id, 0, 99.0).unwrap();
        assert_eq!(clamped, 24.0);
        assert_eq!(graph.config().plugin(id).unwrap().params["Level"], 24.0);
        assert_eq!(
            graph.set_plugin_parameter(id, 5, 1.0),
            Err(GraphError::NoSuchParam(id, 5))
        );
    }
}
