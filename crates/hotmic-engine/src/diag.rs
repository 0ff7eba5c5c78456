//! Engine diagnostics: counters and latched faults.
//!
//! The audio thread records problems as counter increments and a latched
//! last-fault cell; the UI polls. No callback ever crosses the audio-thread
//! boundary synchronously.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// What went wrong inside a plugin slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginFaultKind {
    /// The plugin produced a NaN or infinite sample.
    NonFinite,
    /// The plugin repeatedly exceeded its block budget.
    OverBudget,
}

/// A latched plugin fault, readable until the next fault overwrites it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginFault {
    /// Channel the faulting slot belongs to.
    pub channel: usize,
    /// Instance id of the faulting slot.
    pub instance_id: u64,
    /// Fault kind.
    pub kind: PluginFaultKind,
}

/// Shared counters and latched events.
///
/// The latched fault is packed into one `AtomicU64` (channel in the top
/// 16 bits, kind in the next 8, instance id in the low 40) so readers see
/// a consistent triple without locking.
#[derive(Debug, Default)]
pub struct EngineDiagnostics {
    /// Plugin faults since start.
    plugin_faults: AtomicU64,
    /// Parameter changes dropped because the bridge was full.
    param_drops: AtomicU64,
    /// Routing dependencies dropped to break cycles.
    routing_drops: AtomicU64,
    /// Blocks rendered.
    blocks_rendered: AtomicU64,
    /// Packed latched fault; 0 = none.
    last_fault: AtomicU64,
    /// Device recovery in progress.
    recovering: AtomicBool,
}

const FAULT_KIND_NON_FINITE: u64 = 1;
const FAULT_KIND_OVER_BUDGET: u64 = 2;

impl EngineDiagnostics {
    /// Fresh diagnostics with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a plugin fault (audio thread).
    pub fn record_plugin_fault(&self, channel: usize, instance_id: u64, kind: PluginFaultKind) {
        self.plugin_faults.fetch_add(1, Ordering::Relaxed);
        let kind_bits = match kind {
            PluginFaultKind::NonFinite => FAULT_KIND_NON_FINITE,
            PluginFaultKind::OverBudget => FAULT_KIND_OVER_BUDGET,
        };
        let packed =
            ((channel as u64 & 0xffff) << 48) | (kind_bits << 40) | (instance_id & 0xff_ffff_ffff);
        self.last_fault.store(packed, Ordering::Release);
    }

    /// Read and clear the latched fault (UI thread).
    pub fn take_fault(&self) -> Option<PluginFault> {
        let packed = self.last_fault.swap(0, Ordering::AcqRel);
        if packed == 0 {
            return None;
        }
        let kind = match (packed >> 40) & 0xff {
            FAULT_KIND_NON_FINITE => PluginFaultKind::NonFinite,
            _ => PluginFaultKind::OverBudget,
        };
        Some(PluginFault {
            channel: (packed >> 48) as usize,
            instance_id: packed & 0xff_ffff_ffff,
            kind,
        })
    }

    /// Total plugin faults.
    pub fn plugin_faults(&self) -> u64 {
        self.plugin_faults.load(Ordering::Relaxed)
    }

    /// Count one dropped parameter change.
    pub fn record_param_drop(&self) {
        self.param_drops.fetch_add(1, Ordering::Relaxed);
    }

    /// Parameter changes dropped so far.
    pub fn param_drops(&self) -> u64 {
        self.param_drops.load(Ordering::Relaxed)
    }

    /// Count one dependency dropped to break a routing cycle.
    pub fn record_routing_drop(&self) {
        self.routing_drops.fetch_add(1, Ordering::Relaxed);
    }

    /// Routing dependencies dropped so far.
    pub fn routing_drops(&self) -> u64 {
        self.routing_drops.load(Ordering::Relaxed)
    }

    /// Count one rendered block.
    pub fn record_block(&self) {
        self.blocks_rendered.fetch_add(1, Ordering::Relaxed);
    }

    /// Blocks rendered since start.
    pub fn blocks_rendered(&self) -> u64 {
        self.blocks_rendered.load(Ordering::Relaxed)
    }

    /// Flag a device recovery in progress.
    pub fn set_recovering(&self, recovering: bool) {
        self.recovering.store(recovering, Ordering::Release);
    }

    /// Whether the engine is mid-recovery.
    pub fn is_recovering(&self) -> bool {
        self.recovering.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_latch_roundtrip() {
        let diag = EngineDiagnostics::new();
        assert_eq!(diag.take_fault(), None);

        diag.record_plugin_fault(3, 42, PluginFaultKind::NonFinite);
        let fault = diag.take_fault().unwrap();
        assert_eq!(fault.channel, 3);
        assert_eq!(fault.instance_id, 42);
        assert_eq!(fault.kind, PluginFaultKind::NonFinite);

        // Latch cleared by the read.
        assert_eq!(diag.take_fault(), None);
        assert_eq!(diag.plugin_faults(), 1);
    }

    #[test]
    fn later_fault_overwrites_earlier() {
        let diag = EngineDiagnostics::new();
        diag.record_plugin_fault(0, 1, PluginFaultKind::NonFinite);
        diag.record_plugin_fault(1, 2, PluginFaultKind::OverBudget);
        let fault = diag.take_fault().unwrap();
        assert_eq!(fault.instance_id, 2);
        assert_eq!(fault.kind, PluginFaultKind::OverBudget);
        assert_eq!(diag.plugin_faults(), 2);
    }

    #[test]
    fn counters_accumulate() {
        let diag = EngineDiagnostics::new();
        diag.record_param_drop();
        diag.record_param_drop();
        diag.record_routing_drop();
        diag.record_block();
        assert_eq!(diag.param_drops(), 2);
        assert_eq!(diag.routing_drops(), 1);
        assert_eq!(diag.blocks_rendered(), 1);
    }

    #[test]
    fn recovering_flag() {
        let diag = EngineDiagnostics::new();
        assert!(!diag.is_recovering());
        diag.set_recovering(true);
        assert!(diag.is_recovering());
    }
}
