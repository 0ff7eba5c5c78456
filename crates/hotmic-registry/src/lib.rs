//! Plugin registry and factory for HotMic.
//!
//! The registry is the one place that knows every built-in plugin type. It
//! provides descriptors for UI listings and a factory used by the plugin
//! graph when rebuilding a chain from persisted configuration.
//!
//! # Example
//!
//! ```rust
//! use hotmic_registry::PluginRegistry;
//!
//! let registry = PluginRegistry::new();
//! for descriptor in registry.all_plugins() {
//!     println!("{}: {}", descriptor.id, descriptor.description);
//! }
//!
//! let mut gate = registry.create("gate", 48000.0, 256).unwrap();
//! assert_eq!(gate.id(), "gate");
//! ```

use hotmic_core::plugin::Plugin;
use hotmic_plugins::{
    BusInputPlugin, GainPlugin, GatePlugin, OutputSendPlugin, TapPlugin, VoiceAnalyzerPlugin,
};

/// Category of plugin for organization and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginCategory {
    /// Level and dynamics processing.
    Dynamics,
    /// Routing endpoints (bus input, output send).
    Routing,
    /// Analysis producers and taps.
    Analysis,
    /// Gain stages and other utilities.
    Utility,
}

impl PluginCategory {
    /// Human-readable category name.
    pub const fn name(&self) -> &'static str {
        match self {
            PluginCategory::Dynamics => "Dynamics",
            PluginCategory::Routing => "Routing",
            PluginCategory::Analysis => "Analysis",
            PluginCategory::Utility => "Utility",
        }
    }
}

/// Describes a plugin type in the registry.
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    /// Unique type identifier (lowercase, persisted in configs).
    pub id: &'static str,
    /// Human-readable name.
    pub name: &'static str,
    /// Brief description.
    pub description: &'static str,
    /// Category for organization.
    pub category: PluginCategory,
}

/// Factory function type for creating plugin instances.
type PluginFactory = fn() -> Box<dyn Plugin + Send>;

struct RegistryEntry {
    descriptor: PluginDescriptor,
    factory: PluginFactory,
}

/// Registry of all available plugin types.
pub struct PluginRegistry {
    entries: Vec<RegistryEntry>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRegistry {
    /// Create a registry with every built-in plugin registered.
    pub fn new() -> Self {
        let entries = vec![
            RegistryEntry {
                descriptor: PluginDescriptor {
                    id: "gain",
                    name: "Trim Gain",
                    description: "Smoothed dB trim stage",
                    category: PluginCategory::Utility,
                },
                factory: || Box::new(GainPlugin::new()),
            },
            RegistryEntry {
                descriptor: PluginDescriptor {
                    id: "gate",
                    name: "Noise Gate",
                    description: "Threshold gate with attack, hold and release",
                    category: PluginCategory::Dynamics,
                },
                factory: || Box::new(GatePlugin::new()),
            },
            RegistryEntry {
                descriptor: PluginDescriptor {
                    id: "bus_input",
                    name: "Bus Input",
                    description: "Reads another channel's output into this chain",
                    category: PluginCategory::Routing,
                },
                factory: || Box::new(BusInputPlugin::new()),
            },
            RegistryEntry {
                descriptor: PluginDescriptor {
                    id: "output_send",
                    name: "Output Send",
                    description: "Terminal send with Left/Right/Both placement",
                    category: PluginCategory::Routing,
                },
                factory: || Box::new(OutputSendPlugin::new()),
            },
            RegistryEntry {
                descriptor: PluginDescriptor {
                    id: "voice_analyzer",
                    name: "Voice Analyzer",
                    description: "Produces voice analysis signals onto the bus",
                    category: PluginCategory::Analysis,
                },
                factory: || Box::new(VoiceAnalyzerPlugin::new()),
            },
            RegistryEntry {
                descriptor: PluginDescriptor {
                    id: "analysis_tap",
                    name: "Analysis Tap",
                    description: "Per-signal read/generate/block tap with capture",
                    category: PluginCategory::Analysis,
                },
                factory: || Box::new(TapPlugin::new()),
            },
        ];
        Self { entries }
    }

    /// All registered plugin descriptors.
    pub fn all_plugins(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.entries.iter().map(|e| &e.descriptor)
    }

    /// Descriptors in one category.
    pub fn plugins_in_category(
        &self,
        category: PluginCategory,
    ) -> impl Iterator<Item = &PluginDescriptor> {
        self.all_plugins().filter(move |d| d.category == category)
    }

    /// Look up a descriptor by type id.
    pub fn descriptor(&self, id: &str) -> Option<&PluginDescriptor> {
        self.entries
            .iter()
            .map(|e| &e.descriptor)
            .find(|d| d.id.eq_ignore_ascii_case(id))
    }

    /// Create and initialize a plugin instance by type id.
    ///
    /// Returns `None` for unknown ids.
    pub fn create(
        &self,
        id: &str,
        sample_rate: f32,
        block_size: usize,
    ) -> Option<Box<dyn Plugin + Send>> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.descriptor.id.eq_ignore_ascii_case(id))?;
        let mut plugin = (entry.factory)();
        plugin.initialize(sample_rate, block_size);
        Some(plugin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_builtins_are_registered() {
        let registry = PluginRegistry::new();
        let ids: Vec<_> = registry.all_plugins().map(|d| d.id).collect();
        for id in [
            "gain",
            "gate",
            "bus_input",
            "output_send",
            "voice_analyzer",
            "analysis_tap",
        ] {
            assert!(ids.contains(&id), "missing {id}");
        }
    }

    #[test]
    fn create_returns_initialized_instances() {
        let registry = PluginRegistry::new();
        let plugin = registry.create("gain", 48000.0, 256).unwrap();
        assert_eq!(plugin.id(), "gain");
    }

    #[test]
    fn create_is_case_insensitive() {
        let registry = PluginRegistry::new();
        assert!(registry.create("GATE", 48000.0, 256).is_some());
        assert!(registry.descriptor("Gate").is_some());
    }

    #[test]
    fn unknown_id_is_none() {
        let registry = PluginRegistry::new();
        assert!(registry.create("reverb", 48000.0, 256).is_none());
        assert!(registry.descriptor("reverb").is_none());
    }

    #[test]
    fn descriptor_ids_match_plugin_ids() {
        let registry = PluginRegistry::new();
        for descriptor in registry.all_plugins() {
            let plugin = registry.create(descriptor.id, 48000.0, 256).unwrap();
            assert_eq!(plugin.id(), descriptor.id);
        }
    }

    #[test]
    fn category_filter() {
        let registry = PluginRegistry::new();
        let routing: Vec<_> = registry
            .plugins_in_category(PluginCategory::Routing)
            .map(|d| d.id)
            .collect();
        assert_eq!(routing, vec!["bus_input", "output_send"]);
    }
}
