use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "baix";
const CONFIG_FILE: &str = "config.json";

/// Application configuration stored in the app config directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Sort chunks (and bins) when rewriting, unless overridden on the command line
    #[serde(default)]
    pub sort_bins: bool,

    /// Default tracing filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Show a progress bar while rewriting references
    #[serde(default = "default_progress")]
    pub progress: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_progress() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sort_bins: false,
            log_level: default_log_level(),
            progress: default_progress(),
        }
    }
}

impl AppConfig {
    /// Load config from the app config directory, or return default if not found
    pub fn load() -> Result<Self> {
        match get_config_path() {
            Ok(path) => Self::load_from(&path),
            // No resolvable home: run with defaults
            Err(_) => Ok(Self::default()),
        }
    }

    /// Load config from an explicit path, or return default if it does not exist
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(config_path).context("Failed to read config file")?;
        let config: AppConfig =
            serde_json::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save config to the app config directory
    pub fn save(&self) -> Result<()> {
        let config_path = get_config_path()?;
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&config_path, content).context("Failed to write config file")?;
        Ok(())
    }
}

/// Get the path to the config file
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_app_config_dir()?.join(CONFIG_FILE))
}

/// Get the application config directory (not created)
pub fn get_app_config_dir() -> Result<PathBuf> {
    let base = if cfg!(target_os = "macos") {
        dirs::home_dir().map(|h| h.join("Library").join("Application Support"))
    } else {
        // Linux/Unix: XDG_CONFIG_HOME or ~/.config; Windows: roaming AppData
        dirs::config_dir()
    };

    let base = base.context("Could not determine config directory")?;
    Ok(base.join(APP_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert!(!config.sort_bins);
        assert_eq!(config.log_level, "info");
        assert!(config.progress);
    }

    #[test]
    fn test_app_config_serialization() {
        let config = AppConfig {
            sort_bins: true,
            log_level: "debug".to_string(),
            progress: false,
        };

        let json = serde_json::to_string(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();

        assert!(parsed.sort_bins);
        assert_eq!(parsed.log_level, "debug");
        assert!(!parsed.progress);
    }

    #[test]
    fn test_app_config_partial_json() {
        let json = r#"{"sort_bins": true}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();

        assert!(config.sort_bins);
        assert_eq!(config.log_level, "info");
        assert!(config.progress);
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("config.json")).unwrap();
        assert!(!config.sort_bins);
    }

    #[test]
    fn test_load_from_invalid_json_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }
}
