//! The plugin chain: ordered slots walked once per block.
//!
//! Slots carry a stable instance id, the boxed plugin, a post-slot meter,
//! spectral-delta scratch, and profiling counters. The walk threads a
//! [`ProcessContext`] through the slots: the producer map evolves as
//! producers and blockers are passed, `sample_time` falls behind
//! `sample_clock` as latency accumulates, and any slot may claim the
//! block's analysis capture.
//!
//! Fault isolation happens here: a slot that emits a non-finite sample or
//! chronically overruns its time budget is auto-bypassed on the spot, with
//! nothing but counter increments and a latched diagnostic - no
//! allocation, no locks, no string formatting on the audio thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use hotmic_core::bus::SignalBus;
use hotmic_core::context::{ProcessContext, RoutingContext};
use hotmic_core::meter::{Meter, MeterCell};
use hotmic_core::plugin::{Plugin, SendMode};
use hotmic_core::signal::{ProducerMap, SignalMask};

use crate::MAX_SLOTS;
use crate::delta::{SpectralDelta, SpectralDeltaCell};
use crate::diag::{EngineDiagnostics, PluginFaultKind};

/// Fraction of the block's wall-clock a slot may spend before it counts
/// as over budget.
const BUDGET_FRACTION: f64 = 0.5;
/// Auto-bypass after this many budget breaches...
const BREACH_LIMIT: usize = 10;
/// ...within this window.
const BREACH_WINDOW_SECONDS: u64 = 30;

/// Published per-slot profiling counters.
#[derive(Debug, Default)]
pub struct SlotStats {
    last_elapsed_ns: AtomicU64,
    over_budget: AtomicU64,
    faults: AtomicU64,
    auto_bypassed: AtomicBool,
}

impl SlotStats {
    /// Wall-clock nanoseconds of the slot's last process call.
    pub fn last_elapsed_ns(&self) -> u64 {
        self.last_elapsed_ns.load(Ordering::Relaxed)
    }

    /// Blocks in which the slot exceeded its budget.
    pub fn over_budget(&self) -> u64 {
        self.over_budget.load(Ordering::Relaxed)
    }

    /// Faults this slot has raised.
    pub fn faults(&self) -> u64 {
        self.faults.load(Ordering::Relaxed)
    }

    /// Whether the engine force-bypassed this slot.
    pub fn is_auto_bypassed(&self) -> bool {
        self.auto_bypassed.load(Ordering::Acquire)
    }

    /// Clear the auto-bypass (UI re-arms the slot after a fault).
    pub fn clear_auto_bypass(&self) {
        self.auto_bypassed.store(false, Ordering::Release);
    }
}

/// One chain position.
pub struct PluginSlot {
    instance_id: u64,
    plugin: Box<dyn Plugin + Send>,
    bypassed: bool,
    producer_lane: Option<usize>,
    post_meter: Meter,
    spectral_delta: SpectralDelta,
    stats: Arc<SlotStats>,
    breach_clocks: [u64; BREACH_LIMIT],
    breach_pos: usize,
    breaches: u64,
}

impl PluginSlot {
    /// Build a slot around an initialized plugin. Runs on the UI thread;
    /// this is where the slot's meter and scratch buffers are allocated.
    pub fn new(
        instance_id: u64,
        plugin: Box<dyn Plugin + Send>,
        sample_rate: f32,
        block_size: usize,
    ) -> Self {
        debug_assert!(instance_id > 0, "instance id 0 is reserved");
        let mut post_meter = Meter::new();
        post_meter.prepare(sample_rate, block_size);
        Self {
            instance_id,
            plugin,
            bypassed: false,
            producer_lane: None,
            post_meter,
            spectral_delta: SpectralDelta::new(block_size),
            stats: Arc::new(SlotStats::default()),
            breach_clocks: [0; BREACH_LIMIT],
            breach_pos: 0,
            breaches: 0,
        }
    }

    /// Stable instance id.
    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    /// The plugin itself.
    pub fn plugin(&self) -> &dyn Plugin {
        self.plugin.as_ref()
    }

    /// The plugin, mutably (parameter application).
    pub fn plugin_mut(&mut self) -> &mut (dyn Plugin + Send) {
        self.plugin.as_mut()
    }

    /// User bypass flag.
    pub fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    /// Set the user bypass flag.
    pub fn set_bypassed(&mut self, bypassed: bool) {
        self.bypassed = bypassed;
    }

    /// Effective bypass: user flag or fault auto-bypass.
    pub fn is_inactive(&self) -> bool {
        self.bypassed || self.stats.is_auto_bypassed()
    }

    /// Bus lane if this slot is a producer.
    pub fn producer_lane(&self) -> Option<usize> {
        self.producer_lane
    }

    /// Assign the bus lane (graph-managed).
    pub fn set_producer_lane(&mut self, lane: Option<usize>) {
        self.producer_lane = lane;
    }

    /// Post-slot meter reader handle.
    pub fn meter_cell(&self) -> Arc<MeterCell> {
        self.post_meter.cell()
    }

    /// Spectral-delta reader handle.
    pub fn delta_cell(&self) -> Arc<SpectralDeltaCell> {
        self.spectral_delta.cell()
    }

    /// Profiling counters handle.
    pub fn stats(&self) -> Arc<SlotStats> {
        Arc::clone(&self.stats)
    }

    /// Dispose the plugin. Off the audio thread only.
    pub fn dispose(&mut self) {
        self.plugin.dispose();
    }

    /// Record a budget breach; trips the auto-bypass once `BREACH_LIMIT`
    /// breaches land inside the rolling window.
    fn record_breach(&mut self, sample_clock: u64, window_samples: u64) -> bool {
        self.stats.over_budget.fetch_add(1, Ordering::Relaxed);
        let oldest = self.breach_clocks[self.breach_pos];
        self.breach_clocks[self.breach_pos] = sample_clock;
        self.breach_pos = (self.breach_pos + 1) % BREACH_LIMIT;
        self.breaches += 1;

        self.breaches >= BREACH_LIMIT as u64 && sample_clock.saturating_sub(oldest) <= window_samples
    }
}

/// Where a chain walk left its capture claim, if any.
#[derive(Debug)]
pub struct CaptureScratch {
    active: bool,
    buffer: Vec<f32>,
    sample_time: i64,
    producer_map: ProducerMap,
    channel_id: usize,
}

impl CaptureScratch {
    /// Allocate scratch for one block.
    pub fn new(block_size: usize) -> Self {
        Self {
            active: false,
            buffer: vec![0.0; block_size],
            sample_time: 0,
            producer_map: ProducerMap::empty(),
            channel_id: 0,
        }
    }

    /// Clear the claim at block start.
    pub fn begin_block(&mut self) {
        self.active = false;
    }

    fn claim(&mut self, buffer: &[f32], sample_time: i64, map: ProducerMap, channel_id: usize) {
        let n = buffer.len().min(self.buffer.len());
        self.buffer[..n].copy_from_slice(&buffer[..n]);
        self.active = true;
        self.sample_time = sample_time;
        self.producer_map = map;
        self.channel_id = channel_id;
    }

    /// The claimed capture, if a tap took one this block.
    pub fn take(&mut self) -> Option<(&[f32], i64, ProducerMap, usize)> {
        if self.active {
            self.active = false;
            Some((
                self.buffer.as_slice(),
                self.sample_time,
                self.producer_map,
                self.channel_id,
            ))
        } else {
            None
        }
    }
}

/// Everything a chain walk needs from the outside.
pub struct WalkParams<'a> {
    /// Session sample rate.
    pub sample_rate: f32,
    /// Samples per block.
    pub block_size: usize,
    /// Block arrival time.
    pub sample_clock: u64,
    /// Owning channel id.
    pub channel_id: usize,
    /// Cross-channel routing view.
    pub routing: &'a RoutingContext,
    /// The analysis signal bus.
    pub bus: &'a SignalBus,
    /// Demand from the orchestrator/visualizers.
    pub base_requested: SignalMask,
    /// Capture claim target.
    pub capture: &'a mut CaptureScratch,
    /// Fault/counter sink.
    pub diag: &'a EngineDiagnostics,
}

/// Result of one chain walk.
#[derive(Debug, Clone, Copy)]
pub struct WalkResult {
    /// Total latency of the active slots.
    pub cumulative_latency: u32,
    /// Producer map as of the end of the chain.
    pub producer_map: ProducerMap,
}

/// Ordered sequence of plugin slots.
pub struct PluginChain {
    slots: Vec<PluginSlot>,
    /// Per-slot downstream demand, rebuilt each walk.
    demand_scratch: Vec<SignalMask>,
}

impl Default for PluginChain {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginChain {
    /// Create an empty chain with capacity for [`MAX_SLOTS`], so inserts
    /// applied on the audio thread never reallocate.
    pub fn new() -> Self {
        Self {
            slots: Vec::with_capacity(MAX_SLOTS),
            demand_scratch: Vec::with_capacity(MAX_SLOTS),
        }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slots in chain order.
    pub fn slots(&self) -> &[PluginSlot] {
        &self.slots
    }

    /// Slots in chain order, mutably.
    pub fn slots_mut(&mut self) -> &mut [PluginSlot] {
        &mut self.slots
    }

    /// Find a slot and its index by instance id.
    pub fn slot_by_id(&self, instance_id: u64) -> Option<(usize, &PluginSlot)> {
        self.slots
            .iter()
            .enumerate()
            .find(|(_, s)| s.instance_id == instance_id)
    }

    /// Find a slot mutably by instance id.
    pub fn slot_by_id_mut(&mut self, instance_id: u64) -> Option<&mut PluginSlot> {
        self.slots
            .iter_mut()
            .find(|s| s.instance_id == instance_id)
    }

    /// Insert a slot; out-of-range indices append. Within the reserved
    /// capacity this does not allocate, so it is safe to apply on the
    /// audio thread.
    pub fn insert(&mut self, index: usize, slot: PluginSlot) {
        let index = index.min(self.slots.len());
        self.slots.insert(index, slot);
    }

    /// Remove a slot by instance id, returning it for off-thread disposal.
    pub fn remove(&mut self, instance_id: u64) -> Option<PluginSlot> {
        let index = self
            .slots
            .iter()
            .position(|s| s.instance_id == instance_id)?;
        Some(self.slots.remove(index))
    }

    /// Permute the chain to match `order` (instance ids). Ids missing from
    /// `order` keep their relative order at the end; unknown ids are
    /// ignored. In-place, no allocation.
    pub fn reorder(&mut self, order: &[u64]) {
        let mut target = 0usize;
        for &id in order {
            if let Some(pos) = self.slots[target..]
                .iter()
                .position(|s| s.instance_id == id)
            {
                self.slots[target..=target + pos].rotate_right(1);
                target += 1;
            }
        }
    }

    /// Swap in a whole new chain (preset load), returning the old slots.
    pub fn replace(&mut self, mut new_slots: Vec<PluginSlot>) -> Vec<PluginSlot> {
        std::mem::swap(&mut self.slots, &mut new_slots);
        new_slots
    }

    /// Set a slot's user bypass flag.
    pub fn set_bypassed(&mut self, instance_id: u64, bypassed: bool) -> bool {
        if let Some(slot) = self.slot_by_id_mut(instance_id) {
            slot.set_bypassed(bypassed);
            true
        } else {
            false
        }
    }

    /// Send mode of the terminal output-send slot, if the chain has one.
    pub fn send_mode(&self) -> Option<SendMode> {
        self.slots.iter().rev().find_map(|s| {
            if s.is_inactive() {
                None
            } else {
                s.plugin.send_mode()
            }
        })
    }

    /// Total latency of active slots without walking.
    pub fn latency_samples(&self) -> u32 {
        self.slots
            .iter()
            .filter(|s| !s.is_inactive())
            .map(|s| s.plugin.latency_samples())
            .sum()
    }

    /// Walk the chain over one block.
    pub fn process_block(&mut self, buffer: &mut [f32], params: &mut WalkParams<'_>) -> WalkResult {
        // Downstream demand per slot: what any later consumer or the
        // orchestrator asks for. Built back-to-front.
        self.demand_scratch.clear();
        self.demand_scratch
            .resize(self.slots.len(), SignalMask::EMPTY);
        let mut demand = params.base_requested;
        for i in (0..self.slots.len()).rev() {
            self.demand_scratch[i] = demand;
            if !self.slots[i].is_inactive()
                && let Some(consumer) = self.slots[i].plugin.as_signal_consumer()
            {
                demand = demand.union(consumer.consumed_signals());
            }
        }

        let budget_ns =
            (f64::from(params.block_size as u32) / f64::from(params.sample_rate) * 1e9
                * BUDGET_FRACTION) as u64;
        let breach_window = (params.sample_rate as u64) * BREACH_WINDOW_SECONDS;

        let mut cumulative_latency: u32 = 0;
        let mut map = ProducerMap::empty();

        for index in 0..self.slots.len() {
            let slot = &mut self.slots[index];
            if slot.is_inactive() {
                continue;
            }

            // Consumers learn whether everything they read is mapped.
            let mapped = map.mapped();
            if let Some(consumer) = slot.plugin.as_signal_consumer() {
                let wanted = consumer.consumed_signals();
                consumer.set_availability(wanted.intersection(mapped) == wanted);
            }

            let allowed = slot.plugin.produced_signals().unwrap_or(SignalMask::EMPTY);
            let mut ctx = ProcessContext {
                sample_rate: params.sample_rate,
                block_size: params.block_size,
                sample_clock: params.sample_clock,
                sample_time: params.sample_clock as i64 - i64::from(cumulative_latency),
                slot_index: index,
                cumulative_latency,
                channel_id: params.channel_id,
                routing: params.routing,
                bus: params.bus,
                producer_map: map,
                producer_lane: slot.producer_lane,
                allowed_mask: allowed,
                requested_mask: self.demand_scratch[index],
                wants_capture: false,
            };

            let delta_enabled = slot.spectral_delta.is_enabled();
            if delta_enabled {
                slot.spectral_delta.capture_pre(buffer);
            }

            let started = Instant::now();
            slot.plugin.process(buffer, &mut ctx);
            let elapsed_ns = started.elapsed().as_nanos() as u64;
            slot.stats
                .last_elapsed_ns
                .store(elapsed_ns, Ordering::Relaxed);

            if elapsed_ns > budget_ns
                && slot.record_breach(params.sample_clock, breach_window)
            {
                slot.stats.auto_bypassed.store(true, Ordering::Release);
                slot.stats.faults.fetch_add(1, Ordering::Relaxed);
                params.diag.record_plugin_fault(
                    params.channel_id,
                    slot.instance_id,
                    PluginFaultKind::OverBudget,
                );
            }

            // Non-finite output: silence the block, sideline the plugin,
            // zero its meter. Diagnostics are counters only.
            if buffer.iter().any(|s| !s.is_finite()) {
                buffer.fill(0.0);
                slot.stats.auto_bypassed.store(true, Ordering::Release);
                slot.stats.faults.fetch_add(1, Ordering::Relaxed);
                slot.post_meter.reset();
                params.diag.record_plugin_fault(
                    params.channel_id,
                    slot.instance_id,
                    PluginFaultKind::NonFinite,
                );
            } else {
                slot.post_meter.process_block(buffer);
                if delta_enabled {
                    slot.spectral_delta.compute(buffer);
                }
            }

            cumulative_latency += slot.plugin.latency_samples();

            // Producer/blocker updates become visible to later slots.
            if let Some(lane) = slot.producer_lane
                && !allowed.is_empty()
            {
                map.assign(allowed, lane);
            }
            if let Some(blocked) = slot.plugin.blocked_signals() {
                map.block(blocked);
            }

            if ctx.wants_capture {
                params.capture.claim(
                    buffer,
                    params.sample_clock as i64 - i64::from(cumulative_latency),
                    map,
                    params.channel_id,
                );
            }
        }

        WalkResult {
            cumulative_latency,
            producer_map: map,
        }
    }

    /// Reset every slot's DSP state and meters.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.plugin.reset();
            slot.post_meter.reset();
            slot.spectral_delta.reset();
        }
    }
}
