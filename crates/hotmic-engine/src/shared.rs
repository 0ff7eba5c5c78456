//! State shared between the UI handle and the audio engine.
//!
//! Structural edits travel as [`ChainCommand`]s in a mutex-guarded queue:
//! the mutex only coordinates UI callers with each other, because the
//! audio thread drains with `try_lock` and simply skips a contended block.
//! Retired slots, chains, and buses travel the other way through a
//! lock-free queue so every `dispose`/deallocation runs off the audio
//! thread. The routing order is published through `ArcSwap` for wait-free
//! per-block loads.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use arc_swap::ArcSwap;
use crossbeam_queue::ArrayQueue;
use parking_lot::Mutex;

use hotmic_core::bus::{RequestedSignals, SignalBus};
use hotmic_core::ring::StagingReader;

use crate::chain::PluginSlot;
use crate::channel::ChannelStrip;
use crate::diag::EngineDiagnostics;

/// Retirement queue depth.
const RETIRED_CAPACITY: usize = 256;

/// Structural command from the UI graph to the audio engine.
pub enum ChainCommand {
    /// Bring a new channel online (strip pre-built on the UI thread).
    AddChannel {
        /// The strip, fully allocated.
        strip: Box<ChannelStrip>,
        /// Pre-allocated routing-slot buffer for the channel.
        routing_buffer: Vec<f32>,
    },
    /// Tombstone a channel; its strip comes back through retirement.
    RemoveChannel {
        /// Channel id.
        channel: usize,
    },
    /// Attach or detach a channel's hardware input reader.
    SetChannelInput {
        /// Channel id.
        channel: usize,
        /// Staging reader, `None` to detach.
        reader: Option<StagingReader>,
    },
    /// Insert a pre-built slot.
    InsertSlot {
        /// Channel id.
        channel: usize,
        /// Chain index (clamped to length).
        index: usize,
        /// The slot, built and initialized on the UI thread.
        slot: Box<PluginSlot>,
    },
    /// Remove a slot; it comes back through retirement for disposal.
    RemoveSlot {
        /// Channel id.
        channel: usize,
        /// Slot instance id.
        instance_id: u64,
    },
    /// Permute a chain into the given instance-id order.
    Reorder {
        /// Channel id.
        channel: usize,
        /// Complete new order of instance ids.
        order: Vec<u64>,
    },
    /// Swap a whole chain (preset load); old slots are retired.
    ReplaceChain {
        /// Channel id.
        channel: usize,
        /// New slots in order.
        slots: Vec<PluginSlot>,
    },
    /// Set a slot's user bypass flag.
    SetSlotBypass {
        /// Channel id.
        channel: usize,
        /// Slot instance id.
        instance_id: u64,
        /// New bypass state.
        bypassed: bool,
    },
    /// Swap the signal bus. Lane indices are grow-stable, so existing
    /// slots keep their assignments; new lanes arrive inside new slots.
    SetBus {
        /// The replacement bus.
        bus: Arc<SignalBus>,
    },
    /// Freeze for a preset load: silence output, clear all state, reset
    /// the sample clock.
    BeginPresetLoad,
    /// Resume after a preset load.
    EndPresetLoad,
}

/// Anything the audio thread hands back for off-thread teardown.
pub enum RetiredItem {
    /// A removed slot; dispose and drop on the UI thread.
    Slot(Box<PluginSlot>),
    /// A whole removed chain.
    Chain(Vec<PluginSlot>),
    /// A removed channel strip.
    Channel(Box<ChannelStrip>),
    /// A replaced signal bus.
    Bus(Arc<SignalBus>),
}

/// The bridge state both sides hold an `Arc` to.
pub struct EngineShared {
    commands: Mutex<VecDeque<ChainCommand>>,
    retired: ArrayQueue<RetiredItem>,
    /// Processing order over channel ids, recomputed on routing edits.
    order: ArcSwap<Vec<usize>>,
    /// Demand bitmap shared with producers and the orchestrator.
    requested: Arc<RequestedSignals>,
    /// Current bus generation; the orchestrator discards older captures.
    bus_generation: Arc<AtomicU64>,
    diag: Arc<EngineDiagnostics>,
}

impl EngineShared {
    /// Fresh shared state.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            commands: Mutex::new(VecDeque::new()),
            retired: ArrayQueue::new(RETIRED_CAPACITY),
            order: ArcSwap::from_pointee(Vec::new()),
            requested: Arc::new(RequestedSignals::new()),
            bus_generation: Arc::new(AtomicU64::new(0)),
            diag: Arc::new(EngineDiagnostics::new()),
        })
    }

    /// Queue a structural command (UI thread).
    pub fn push_command(&self, command: ChainCommand) {
        self.commands.lock().push_back(command);
    }

    /// Drain pending commands without blocking or allocating (audio
    /// thread). Each command is handed to `apply` as it is popped.
    ///
    /// Returns false when a UI caller holds the lock; the commands simply
    /// wait one more block.
    pub fn try_drain_commands(&self, mut apply: impl FnMut(ChainCommand)) -> bool {
        let Some(mut queue) = self.commands.try_lock() else {
            return false;
        };
        while let Some(command) = queue.pop_front() {
            apply(command);
        }
        true
    }

    /// Hand an item back for off-thread teardown (audio thread).
    ///
    /// On the (never expected) chance the retirement queue is full the
    /// item is dropped in place; losing that trade-off beats blocking the
    /// callback.
    pub fn retire(&self, item: RetiredItem) {
        let _ = self.retired.push(item);
    }

    /// Collect retired items for disposal (UI thread).
    pub fn drain_retired(&self, mut dispose: impl FnMut(RetiredItem)) {
        while let Some(item) = self.retired.pop() {
            dispose(item);
        }
    }

    /// Publish a new processing order (UI thread).
    pub fn store_order(&self, order: Vec<usize>) {
        self.order.store(Arc::new(order));
    }

    /// Load the processing order (audio thread, wait-free).
    pub fn load_order(&self) -> arc_swap::Guard<Arc<Vec<usize>>> {
        self.order.load()
    }

    /// The demand bitmap.
    pub fn requested(&self) -> Arc<RequestedSignals> {
        Arc::clone(&self.requested)
    }

    /// The bus-generation cell.
    pub fn bus_generation(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.bus_generation)
    }

    /// Engine diagnostics.
    pub fn diag(&self) -> Arc<EngineDiagnostics> {
        Arc::clone(&self.diag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_drain_in_push_order() {
        let shared = EngineShared::new();
        shared.push_command(ChainCommand::BeginPresetLoad);
        shared.push_command(ChainCommand::EndPresetLoad);

        let mut drained = Vec::new();
        assert!(shared.try_drain_commands(|c| drained.push(c)));
        assert_eq!(drained.len(), 2);
        assert!(matches!(drained[0], ChainCommand::BeginPresetLoad));
        assert!(matches!(drained[1], ChainCommand::EndPresetLoad));

        let mut second = 0;
        assert!(shared.try_drain_commands(|_| second += 1));
        assert_eq!(second, 0);
    }

    #[test]
    fn contended_drain_skips() {
        let shared = EngineShared::new();
        let _guard = shared.commands.lock();
        assert!(!shared.try_drain_commands(|_| {}));
    }

    #[test]
    fn retirement_roundtrip() {
        let shared = EngineShared::new();
        let bus = Arc::new(SignalBus::new(3, 1, 64));
        shared.retire(RetiredItem::Bus(bus));

        let mut seen = 0;
        shared.drain_retired(|item| {
            if let RetiredItem::Bus(bus) = item {
                assert_eq!(bus.generation(), 3);
                seen += 1;
            }
        });
        assert_eq!(seen, 1);
    }

    #[test]
    fn order_publication() {
        let shared = EngineShared::new();
        assert!(shared.load_order().is_empty());
        shared.store_order(vec![2, 0, 1]);
        assert_eq!(shared.load_order().as_slice(), &[2, 0, 1]);
    }
}
