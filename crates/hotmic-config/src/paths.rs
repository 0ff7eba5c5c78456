//! Default locations for configs and presets.

use std::path::PathBuf;

/// Application directory name under the platform config root.
const APP_DIR: &str = "hotmic";

/// Platform config directory for HotMic
/// (e.g. `~/.config/hotmic` on Linux).
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR))
}

/// Default engine config file path.
pub fn default_config_file() -> Option<PathBuf> {
    config_dir().map(|d| d.join("engine.toml"))
}

/// Directory for saved presets.
pub fn presets_dir() -> Option<PathBuf> {
    config_dir().map(|d| d.join("presets"))
}

/// Path for a named preset file.
///
/// The name is sanitized to filesystem-safe characters.
pub fn preset_file(name: &str) -> Option<PathBuf> {
    let safe: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    presets_dir().map(|d| d.join(format!("{safe}.toml")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_nest_under_app_dir() {
        if let Some(dir) = config_dir() {
            assert!(dir.ends_with(APP_DIR));
            assert!(default_config_file().unwrap().starts_with(&dir));
            assert!(presets_dir().unwrap().starts_with(&dir));
        }
    }

    #[test]
    fn preset_names_are_sanitized() {
        if let Some(path) = preset_file("My Stream / Setup!") {
            let file = path.file_name().unwrap().to_string_lossy().into_owned();
            assert_eq!(file, "My_Stream___Setup_.toml");
        }
    }
}
