//! Top-level persisted engine state.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::channel::ChannelConfig;
use crate::error::ConfigError;

/// Block sizes the engine supports.
pub const SUPPORTED_BLOCK_SIZES: [usize; 4] = [128, 256, 512, 1024];
/// Sample rates the engine supports.
pub const SUPPORTED_SAMPLE_RATES: [u32; 2] = [44100, 48000];

/// Master section settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MasterConfig {
    /// Master mute.
    #[serde(default)]
    pub mute: bool,
    /// Stereo output (false collapses the bus to dual mono).
    #[serde(default = "default_true")]
    pub stereo: bool,
}

fn default_true() -> bool {
    true
}

/// One hardware input assignment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputConfig {
    /// Device name as reported by the backend.
    pub device: String,
    /// Channel index this input feeds.
    pub channel: usize,
}

/// The whole persisted engine state.
///
/// # TOML Format
///
/// ```toml
/// sample_rate = 48000
/// block_size = 256
/// output_device = "HotMic Virtual Output"
///
/// [master]
/// stereo = true
///
/// [[inputs]]
/// device = "USB Microphone"
/// channel = 0
///
/// [[channels]]
/// name = "Mic 1"
/// input_gain_db = 3.0
///
/// [[channels.plugins]]
/// type = "gate"
/// instance_id = 1
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Session sample rate in Hz.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Samples per block (power of two in 128..=1024).
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Master section.
    #[serde(default)]
    pub master: MasterConfig,

    /// Hardware input assignments.
    #[serde(default)]
    pub inputs: Vec<InputConfig>,

    /// Output device name, `None` for the system default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_device: Option<String>,

    /// Monitor device name, `None` disables monitoring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor_device: Option<String>,

    /// Channel strips in creation order.
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

fn default_sample_rate() -> u32 {
    48000
}

fn default_block_size() -> usize {
    256
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            block_size: default_block_size(),
            master: MasterConfig::default(),
            inputs: Vec::new(),
            output_device: None,
            monitor_device: None,
            channels: vec![ChannelConfig::new("Mic 1")],
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let config: EngineConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a TOML file, creating parent directories as needed.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check the audio format against the supported set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !SUPPORTED_BLOCK_SIZES.contains(&self.block_size) {
            return Err(ConfigError::BadBlockSize(self.block_size));
        }
        if !SUPPORTED_SAMPLE_RATES.contains(&self.sample_rate) {
            return Err(ConfigError::BadSampleRate(self.sample_rate));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::PluginConfig;

    #[test]
    fn default_has_one_channel() {
        let config = EngineConfig::default();
        assert_eq!(config.channels.len(), 1);
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.block_size, 256);
        assert!(config.master.stereo);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_bad_block_size() {
        let mut config = EngineConfig::default();
        config.block_size = 300;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BadBlockSize(300))
        ));
    }

    #[test]
    fn rejects_bad_sample_rate() {
        let mut config = EngineConfig::default();
        config.sample_rate = 96000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BadSampleRate(96000))
        ));
    }

    #[test]
    fn toml_roundtrip() {
        let mut config = EngineConfig::default();
        config.output_device = Some("HotMic Out".into());
        config.inputs.push(InputConfig {
            device: "USB Mic".into(),
            channel: 0,
        });
        config.channels[0]
            .plugins
            .push(PluginConfig::new("gate").with_instance_id(1));

        let toml_str = config.to_toml().unwrap();
        let parsed = EngineConfig::from_toml(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn serialization_is_stable() {
        // Two serialize passes of the same value are byte-identical.
        let config = EngineConfig::default();
        assert_eq!(config.to_toml().unwrap(), config.to_toml().unwrap());
    }

    #[test]
    fn file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("engine.toml");

        let config = EngineConfig::default();
        config.save(&path).unwrap();
        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn minimal_toml_parses() {
        let parsed = EngineConfig::from_toml("").unwrap();
        assert_eq!(parsed.sample_rate, 48000);
        assert!(parsed.channels.is_empty());
    }
}
