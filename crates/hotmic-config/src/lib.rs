//! HotMic Config - persisted engine state.
//!
//! Everything the engine needs to come back up the way it was left:
//! channels with their plugin chains and containers, device selection, and
//! the global audio format. Stored as TOML, round-trippable byte-for-byte
//! after one normalization pass.
//!
//! The structures here are plain data. All invariants (chain/config order
//! parity, container contiguity, instance-id uniqueness) are enforced by
//! the plugin graph when a config is loaded, never by deserialization.

pub mod channel;
pub mod engine;
pub mod error;
pub mod paths;

pub use channel::{ChannelConfig, ContainerConfig, PluginConfig};
pub use engine::{EngineConfig, InputConfig, MasterConfig};
pub use error::ConfigError;
