// Configuration management for the Streetpass CLI
//
// Cross-platform config stored in:
// - macOS: ~/Library/Application Support/streetpass/config.json
// - Linux: ~/.config/streetpass/config.json
// - Windows: %APPDATA%\streetpass\config.json

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use streetpass_core::config::default_app_tag;
use streetpass_core::{PayloadFormat, StreetpassConfig};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identity and discovery settings for this device
    pub device: StreetpassConfig,

    /// Settings for the two-device simulator
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// User id advertised by the simulated peer
    pub peer_user_id: String,

    /// How many times each advertisement is relayed
    pub rounds: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            peer_user_id: "peer42".to_string(),
            rounds: 5,
        }
    }
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("streetpass");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the config file path
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from file, or create default if not exists
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            let config: Config =
                serde_json::from_str(&contents).context("Failed to parse config file")?;
            config
                .device
                .validate()
                .context("Config file holds an invalid device configuration")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Set a config value. The result is validated before it is accepted.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut next = self.clone();
        match key {
            "app_tag" => next.device.app_tag = value.to_string(),
            "user_id" => next.device.user_id = value.to_string(),
            "payload_format" => {
                let format: PayloadFormat = value.parse().map_err(anyhow::Error::msg)?;
                // A stock tag follows the format; a custom one is kept as is
                if next.device.app_tag == default_app_tag(next.device.payload_format) {
                    next.device.app_tag = default_app_tag(format).to_string();
                }
                next.device.payload_format = format;
            }
            "display_name" => next.device.display_name = value.to_string(),
            "placeholder" => next.device.placeholder = value.to_string(),
            "local_name_budget" => {
                next.device.limits.local_name_budget =
                    value.parse().context("Invalid number")?;
            }
            "manufacturer_data_budget" => {
                next.device.limits.manufacturer_data_budget =
                    value.parse().context("Invalid number")?;
            }
            "dedup_capacity" => {
                next.device.dedup_capacity = if value.is_empty() || value == "unbounded" {
                    None
                } else {
                    Some(value.parse().context("Invalid number")?)
                };
            }
            "peer_user_id" => next.simulation.peer_user_id = value.to_string(),
            "rounds" => next.simulation.rounds = value.parse().context("Invalid number")?,
            _ => anyhow::bail!("Unknown config key: {}", key),
        }

        next.device.validate().context("Rejected config value")?;
        next.device
            .clone()
            .with_user_id(next.simulation.peer_user_id.clone())
            .validate()
            .context("Rejected simulated peer user id")?;

        *self = next;
        Ok(())
    }

    /// Get a config value
    pub fn get(&self, key: &str) -> Option<String> {
        self.list()
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// List all config values
    pub fn list(&self) -> Vec<(String, String)> {
        let device = &self.device;
        vec![
            ("app_tag".to_string(), device.app_tag.clone()),
            ("user_id".to_string(), device.user_id.clone()),
            ("payload_format".to_string(), device.payload_format.to_string()),
            ("display_name".to_string(), device.display_name.clone()),
            ("placeholder".to_string(), device.placeholder.clone()),
            ("local_name_budget".to_string(), device.limits.local_name_budget.to_string()),
            (
                "manufacturer_data_budget".to_string(),
                device.limits.manufacturer_data_budget.to_string(),
            ),
            (
                "dedup_capacity".to_string(),
                device
                    .dedup_capacity
                    .map_or_else(|| "unbounded".to_string(), |c| c.to_string()),
            ),
            ("peer_user_id".to_string(), self.simulation.peer_user_id.clone()),
            ("rounds".to_string(), self.simulation.rounds.to_string()),
        ]
    }
}
