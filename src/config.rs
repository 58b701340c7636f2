// Configuration save/restore functionality

use crate::filter::SortMode;
use crate::refresh::REFRESH_INTERVAL;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_DIR: &str = ".config/netshow";
const CONFIG_FILE: &str = "config.json";

/// Configuration file structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Seconds between periodic refreshes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Sort mode at startup
    #[serde(default)]
    pub default_sort: SortMode,

    /// Interface for bandwidth: None = all interfaces
    #[serde(default)]
    pub interface: Option<String>,

    #[serde(default = "default_show_emojis")]
    pub show_emojis: bool,

    /// Filter text at startup
    #[serde(default)]
    pub filter: String,
}

fn default_refresh_interval() -> u64 {
    REFRESH_INTERVAL.as_secs()
}

fn default_show_emojis() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
            default_sort: SortMode::Default,
            interface: None, // All interfaces
            show_emojis: default_show_emojis(),
            filter: String::new(),
        }
    }
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, falling back to defaults if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        let contents =
            fs::read_to_string(path).context(format!("Failed to read config file: {:?}", path))?;

        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(config_dir) = path.parent() {
            // Create config directory if it doesn't exist
            fs::create_dir_all(config_dir).context(format!(
                "Failed to create config directory: {:?}",
                config_dir
            ))?;
        }

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents).context(format!("Failed to write config file: {:?}", path))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }
}
