//! HotMic Core - real-time primitives for the audio engine
//!
//! This crate provides the building blocks shared by every thread of the
//! HotMic engine: the plugin contract, the analysis signal bus, atomic meter
//! cells, parameter smoothing, and the lock-free staging rings. Everything
//! here is designed around one rule: the audio callback never allocates,
//! never locks, and never blocks.
//!
//! # Core Abstractions
//!
//! ## Plugin System
//!
//! - [`Plugin`] - Object-safe trait for all in-chain DSP units
//! - [`ProcessContext`] - Per-block state threaded through a chain walk
//! - [`ParamDescriptor`] - Parameter metadata for UI and persistence
//!
//! ## Analysis Sideband
//!
//! - [`AnalysisSignal`] / [`SignalMask`] - the closed set of per-sample
//!   analytic signals and bitmask operations over it
//! - [`SignalBus`] - per-producer, per-signal ring storage indexed by
//!   sample time; wait-free for writers and readers
//! - [`ProducerMap`] - nearest-upstream-producer lookup per signal
//!
//! ## Real-Time / UI Bridge
//!
//! - [`AtomicF32`] - bit-cast atomic float cells
//! - [`Meter`] / [`MeterCell`] - peak + RMS + peak-hold metering with
//!   atomic publication; dB conversion happens on the reader side
//! - [`SmoothedParam`] / [`GainSmoother`] - zipper-free parameter changes
//!
//! ## Capture Staging
//!
//! - [`StagingRing`](ring::StagingRing) - per-input SPSC ring with exact
//!   overflow accounting (`std` only)
//!
//! # no_std Support
//!
//! The math, parameter, and signal-id modules are `no_std` compatible for
//! embedded front-ends. Disable the default `std` feature:
//!
//! ```toml
//! [dependencies]
//! hotmic-core = { version = "0.1", default-features = false }
//! ```
//!
//! # Design Principles
//!
//! - **Real-time safe**: all allocation happens in `initialize` paths
//! - **Stale beats stalled**: signal-bus readers accept old samples rather
//!   than wait for fresh ones
//! - **Reader-side presentation**: meters publish linear floats; dB and
//!   display scaling are the reader's business

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod atomic;
pub mod math;
pub mod param;
pub mod params;
pub mod signal;

#[cfg(feature = "std")]
pub mod bus;
#[cfg(feature = "std")]
pub mod capture;
#[cfg(feature = "std")]
pub mod context;
#[cfg(feature = "std")]
pub mod meter;
#[cfg(feature = "std")]
pub mod plugin;
#[cfg(feature = "std")]
pub mod ring;

// Re-export main types at crate root
pub use atomic::{AtomicF32, AtomicSampleClock};
pub use math::{db_to_linear, equal_power_pan, flush_denormal, linear_to_db};
pub use param::{GainSmoother, SmoothedParam};
pub use params::{ParamDescriptor, ParamUnit};
pub use signal::{AnalysisSignal, ProducerMap, SIGNAL_COUNT, SignalMask};

#[cfg(feature = "std")]
pub use bus::{RequestedSignals, SignalBus};
#[cfg(feature = "std")]
pub use capture::{AudioSlice, CaptureLink, CaptureRecord, CaptureSource};
#[cfg(feature = "std")]
pub use context::{ProcessContext, RoutingContext, RoutingSlot};
#[cfg(feature = "std")]
pub use meter::{Meter, MeterCell, vox_scale_position};
#[cfg(feature = "std")]
pub use plugin::{Plugin, SendMode, SignalConsumer};
#[cfg(feature = "std")]
pub use ring::{StagingReader, StagingRing, StagingWriter};
