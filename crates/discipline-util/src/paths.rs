//! Default paths for discipline components
//!
//! Paths are user-writable by default (no root required):
//! - Config: `$XDG_CONFIG_HOME/discipline/config.toml` or `~/.config/discipline/config.toml`
//! - Data: `$XDG_DATA_HOME/discipline` or `~/.local/share/discipline`

use std::path::PathBuf;

/// Environment variable for overriding the config file path
pub const DISCIPLINE_CONFIG_ENV: &str = "DISCIPLINE_CONFIG";

/// Environment variable for overriding the data directory
pub const DISCIPLINE_DATA_DIR_ENV: &str = "DISCIPLINE_DATA_DIR";

/// Application subdirectory name
const APP_DIR: &str = "discipline";

/// Config filename within the config directory
const CONFIG_FILENAME: &str = "config.toml";

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$DISCIPLINE_CONFIG` environment variable (if set)
/// 2. `$XDG_CONFIG_HOME/discipline/config.toml` (if XDG_CONFIG_HOME is set)
/// 3. `~/.config/discipline/config.toml` (fallback)
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(DISCIPLINE_CONFIG_ENV) {
        return PathBuf::from(path);
    }

    config_path_without_env()
}

/// Get the config path without checking the DISCIPLINE_CONFIG env var.
pub fn config_path_without_env() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILENAME)
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$DISCIPLINE_DATA_DIR` environment variable (if set)
/// 2. `$XDG_DATA_HOME/discipline` (if XDG_DATA_HOME is set)
/// 3. `~/.local/share/discipline` (fallback)
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(DISCIPLINE_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking the DISCIPLINE_DATA_DIR env var.
/// Used for default values in configs where the env var is checked separately.
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR);
    }

    // Last resort
    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_points_at_toml() {
        let path = config_path_without_env();
        assert!(path.to_string_lossy().contains("discipline"));
        assert_eq!(path.file_name().unwrap(), "config.toml");
    }

    #[test]
    fn data_dir_contains_discipline() {
        let path = data_dir_without_env();
        assert!(path.to_string_lossy().contains("discipline"));
    }
}
