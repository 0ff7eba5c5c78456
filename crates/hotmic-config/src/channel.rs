//! Per-channel persisted state: chain, containers, strip settings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Legal channel gain range in dB.
pub const GAIN_DB_MIN: f32 = -60.0;
/// Upper end of the channel gain range in dB.
pub const GAIN_DB_MAX: f32 = 12.0;

/// One plugin entry in a persisted chain.
///
/// Entries are stored in chain order; the plugin graph keeps that ordering
/// in lockstep with the live chain after every edit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PluginConfig {
    /// Instance id, unique within the channel. 0 means "assign on load".
    #[serde(default)]
    pub instance_id: u64,

    /// Registry type id (e.g. `"gate"`).
    #[serde(rename = "type")]
    pub plugin_type: String,

    /// Whether the plugin is bypassed.
    #[serde(default)]
    pub bypassed: bool,

    /// Name of the factory preset the settings came from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset_name: Option<String>,

    /// Parameter values by descriptor name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, f32>,

    /// Opaque plugin state blob.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub state: Vec<u8>,
}

impl PluginConfig {
    /// Create an entry for a plugin type with defaults.
    pub fn new(plugin_type: impl Into<String>) -> Self {
        Self {
            instance_id: 0,
            plugin_type: plugin_type.into(),
            bypassed: false,
            preset_name: None,
            params: BTreeMap::new(),
            state: Vec::new(),
        }
    }

    /// Builder: set the instance id.
    pub fn with_instance_id(mut self, id: u64) -> Self {
        self.instance_id = id;
        self
    }

    /// Builder: set a parameter value.
    pub fn with_param(mut self, name: impl Into<String>, value: f32) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    /// Builder: set the bypass flag.
    pub fn with_bypass(mut self, bypassed: bool) -> Self {
        self.bypassed = bypassed;
        self
    }
}

/// A named group of contiguous chain plugins with shared bypass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContainerConfig {
    /// Container id, unique within the channel, > 0.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Whether the whole container is bypassed.
    #[serde(default)]
    pub bypassed: bool,
    /// Member instance ids in chain order.
    #[serde(default)]
    pub plugin_instance_ids: Vec<u64>,
}

impl ContainerConfig {
    /// Create an empty container.
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            bypassed: false,
            plugin_instance_ids: Vec::new(),
        }
    }
}

/// One channel strip's persisted state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelConfig {
    /// Display name.
    pub name: String,
    /// Input gain in dB, clamped to [-60, +12].
    #[serde(default)]
    pub input_gain_db: f32,
    /// Output gain in dB, clamped to [-60, +12].
    #[serde(default)]
    pub output_gain_db: f32,
    /// Channel mute.
    #[serde(default)]
    pub muted: bool,
    /// Channel solo.
    #[serde(default)]
    pub soloed: bool,
    /// Plugin chain in processing order.
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
    /// Containers over the chain.
    #[serde(default)]
    pub containers: Vec<ContainerConfig>,
}

impl ChannelConfig {
    /// Create an empty channel at unity gain.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_gain_db: 0.0,
            output_gain_db: 0.0,
            muted: false,
            soloed: false,
            plugins: Vec::new(),
            containers: Vec::new(),
        }
    }

    /// Builder: append a plugin entry.
    pub fn with_plugin(mut self, plugin: PluginConfig) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Clamp both gains to the legal range.
    pub fn clamp_gains(&mut self) {
        self.input_gain_db = self.input_gain_db.clamp(GAIN_DB_MIN, GAIN_DB_MAX);
        self.output_gain_db = self.output_gain_db.clamp(GAIN_DB_MIN, GAIN_DB_MAX);
    }

    /// Find a plugin entry by instance id.
    pub fn plugin(&self, instance_id: u64) -> Option<&PluginConfig> {
        self.plugins.iter().find(|p| p.instance_id == instance_id)
    }

    /// Find a plugin entry by instance id, mutably.
    pub fn plugin_mut(&mut self, instance_id: u64) -> Option<&mut PluginConfig> {
        self.plugins
            .iter_mut()
            .find(|p| p.instance_id == instance_id)
    }
}
