//! Default paths for stricture components
//!
//! - Config: `$XDG_CONFIG_HOME/stricture/config.toml` or `~/.config/stricture/config.toml`

use std::path::PathBuf;

/// Environment variable for overriding the config file path
pub const STRICTURE_CONFIG_ENV: &str = "STRICTURE_CONFIG";

const CONFIG_FILENAME: &str = "config.toml";

/// Application subdirectory name
const APP_DIR: &str = "stricture";

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$STRICTURE_CONFIG` environment variable (if set)
/// 2. `$XDG_CONFIG_HOME/stricture/config.toml` (if XDG_CONFIG_HOME is set)
/// 3. `~/.config/stricture/config.toml`
/// 4. `/etc/stricture/config.toml` (no home directory)
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(STRICTURE_CONFIG_ENV) {
        return PathBuf::from(path);
    }

    config_path_without_env()
}

/// Get the config path without checking the STRICTURE_CONFIG env var.
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_is_under_app_dir() {
        let path = config_path_without_env();
        assert!(path.to_string_lossy().contains("stricture"));
        assert!(path.ends_with("config.toml"));
    }
}
