//! HotMic Engine - the real-time data plane and its control surface.
//!
//! The engine splits cleanly across threads:
//!
//! - [`AudioEngine`] lives on the audio callback thread. It owns every
//!   channel strip, plugin slot, and buffer; one [`AudioEngine::render`]
//!   call drives a whole block end-to-end. It never allocates, never takes
//!   a blocking lock, and never does I/O.
//! - [`EngineHandle`] lives on the UI thread. It owns the canonical
//!   [`PluginGraph`] per channel, the routing scheduler, and the parameter
//!   sender. Structural edits become [`ChainCommand`]s the audio side
//!   drains at block start; parameter changes ride the SPSC bridge.
//! - Removed slots, retired chains, and replaced signal buses travel back
//!   through a retirement queue so disposal always happens off the audio
//!   thread.
//!
//! [`build_engine`] wires both halves from a persisted
//! [`EngineConfig`](hotmic_config::EngineConfig).

pub mod bridge;
pub mod chain;
pub mod channel;
pub mod delta;
pub mod diag;
pub mod graph;
pub mod handle;
pub mod master;
pub mod pipeline;
pub mod routing;
pub mod shared;

pub use bridge::{ParamChange, ParamSender, ParamTarget, TargetParseError, parse_target};
pub use chain::{PluginChain, PluginSlot, SlotStats};
pub use channel::ChannelStrip;
pub use diag::{EngineDiagnostics, PluginFault, PluginFaultKind};
pub use graph::{GraphError, PluginGraph};
pub use handle::{EngineError, EngineHandle, EngineRig, PluginFactory, build_engine};
pub use master::{LufsCell, LufsMeter};
pub use pipeline::AudioEngine;
pub use routing::{RoutingError, RoutingScheduler};
pub use shared::{ChainCommand, EngineShared, RetiredItem};

/// Hard upper bound on simultaneously existing channels.
pub const MAX_CHANNELS: usize = 64;
/// Hard upper bound on slots per chain; chains reserve this capacity so
/// inserts on the audio thread never reallocate.
pub const MAX_SLOTS: usize = 64;
/// Capture link depth in records.
pub const CAPTURE_LINK_CAPACITY: usize = 12;
/// Analysis window the signal bus must cover, in samples.
pub const ANALYSIS_WINDOW_SAMPLES: usize = 2048;
