//! CLI subcommands.

pub mod check;
pub mod devices;
pub mod run;

use std::path::PathBuf;

use hotmic_config::EngineConfig;

/// A boxed error for command results.
pub type CommandError = Box<dyn std::error::Error>;

/// Load the engine config from an explicit path, the default location, or
/// fall back to a fresh default.
pub fn load_config(path: Option<PathBuf>) -> Result<EngineConfig, CommandError> {
    if let Some(path) = path {
        return Ok(EngineConfig::load(path)?);
    }
    if let Some(default_path) = hotmic_config::paths::default_config_file()
        && default_path.exists()
    {
        return Ok(EngineConfig::load(default_path)?);
    }
    Ok(EngineConfig::default())
}

/// The plugin factory backed by the built-in registry.
pub fn registry_factory() -> std::sync::Arc<hotmic_engine::PluginFactory> {
    let registry = hotmic_registry::PluginRegistry::new();
    std::sync::Arc::new(move |type_id, sample_rate, block_size| {
        registry.create(type_id, sample_rate, block_size)
    })
}
