//! Built-in plugins for the HotMic engine.
//!
//! Four kinds of in-chain units live here:
//!
//! - plain DSP: [`GainPlugin`], [`GatePlugin`]
//! - routing endpoints: [`BusInputPlugin`] (reads another channel's output
//!   through the routing context) and [`OutputSendPlugin`] (the channel's
//!   terminal send into the stereo bus)
//! - analysis producers: [`VoiceAnalyzerPlugin`] computes voice signals at
//!   its chain position and writes them onto the signal bus
//! - the [`TapPlugin`], which per signal reads through, generates locally,
//!   or blocks, and can claim the block's analysis capture
//!
//! Everything implements [`hotmic_core::Plugin`]; instances are created
//! through `hotmic-registry`.

mod analyzer;
mod bus_input;
mod gain;
mod gate;
mod output_send;
mod tap;

pub use analyzer::{ANALYZER_SIGNALS, VoiceAnalyzerPlugin};
pub use bus_input::{BusInputMode, BusInputPlugin};
pub use gain::GainPlugin;
pub use gate::GatePlugin;
pub use output_send::OutputSendPlugin;
pub use tap::{TapMode, TapPlugin};
