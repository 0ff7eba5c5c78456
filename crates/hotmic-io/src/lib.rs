//! HotMic IO - device I/O for the engine.
//!
//! The engine core never talks to a platform audio API; it renders blocks
//! into whatever buffer it is handed. This crate provides:
//!
//! - [`AudioBackend`] - an object-safe backend abstraction with boxed
//!   callbacks and RAII [`StreamHandle`]s (cpal is the one shipped
//!   implementation; a mock backend serves the tests)
//! - device enumeration ([`list_devices`], [`default_devices`])
//! - [`AudioSession`] - wires an [`EngineRig`](hotmic_engine::EngineRig)
//!   to real streams: output rendering with block-size adaptation, input
//!   capture into per-input staging rings, and the optional monitor
//!   mirror

pub mod backend;
pub mod cpal_backend;
pub mod devices;
pub mod session;

pub use backend::{
    AudioBackend, BackendStreamConfig, ErrorCallback, InputCallback, OutputCallback, StreamHandle,
};
pub use cpal_backend::CpalBackend;
pub use devices::{AudioDevice, default_devices, list_devices};
pub use session::AudioSession;

use thiserror::Error;

/// Errors from device I/O.
#[derive(Debug, Error)]
pub enum IoError {
    /// No usable device.
    #[error("no audio device available")]
    NoDevice,
    /// A named device was not found.
    #[error("audio device not found: {0}")]
    DeviceNotFound(String),
    /// Stream construction or control failed.
    #[error("audio stream error: {0}")]
    Stream(String),
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, IoError>;
