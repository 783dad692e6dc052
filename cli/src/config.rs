// Configuration management for the btbridge CLI
//
// Stored as JSON in:
// - Linux: ~/.config/btbridge/config.json
// - macOS: ~/Library/Application Support/btbridge/config.json

use anyhow::{Context, Result};
use btbridge_core::BridgeConfig;
use std::path::{Path, PathBuf};

/// Keys accepted by `config get` / `config set`
pub const KEYS: &[&str] = &[
    "socket_path",
    "gatt_max_clients",
    "log_filter",
    "advertising.min_interval",
    "advertising.max_interval",
    "advertising.channel_map",
    "advertising.tx_power",
    "advertising.primary_phy",
    "advertising.secondary_phy",
    "advertising.timeout",
];

pub struct Config {
    pub bridge: BridgeConfig,
    path: PathBuf,
}

impl Config {
    /// Default config file location (cross-platform)
    pub fn default_file() -> Result<PathBuf> {
        Ok(dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("btbridge")
            .join("config.json"))
    }

    /// Load config from `path`, or from the default location, creating it
    /// with defaults if it does not exist
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_file()?,
        };
        let bridge = BridgeConfig::load_or_create(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?;
        Ok(Self { bridge, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self) -> Result<()> {
        self.bridge
            .save(&self.path)
            .with_context(|| format!("Failed to write config to {}", self.path.display()))
    }

    /// Set a config value and persist it
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let bridge = &mut self.bridge;
        let adv = &mut bridge.advertising;
        match key {
            "socket_path" => bridge.socket_path = PathBuf::from(value),
            "gatt_max_clients" => {
                bridge.gatt_max_clients = value.parse().context("Invalid number")?;
            }
            "log_filter" => bridge.log_filter = value.to_string(),
            "advertising.min_interval" => {
                adv.min_interval = value.parse().context("Invalid interval")?;
            }
            "advertising.max_interval" => {
                adv.max_interval = value.parse().context("Invalid interval")?;
            }
            "advertising.channel_map" => {
                adv.channel_map = value.parse().context("Invalid channel map")?;
            }
            "advertising.tx_power" => {
                adv.tx_power = value.parse().context("Invalid tx power")?;
            }
            "advertising.primary_phy" => {
                adv.primary_phy = value.parse().context("Invalid PHY")?;
            }
            "advertising.secondary_phy" => {
                adv.secondary_phy = value.parse().context("Invalid PHY")?;
            }
            "advertising.timeout" => {
                adv.timeout = value.parse().context("Invalid timeout")?;
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        self.save()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let bridge = &self.bridge;
        let adv = &bridge.advertising;
        let value = match key {
            "socket_path" => bridge.socket_path.display().to_string(),
            "gatt_max_clients" => bridge.gatt_max_clients.to_string(),
            "log_filter" => bridge.log_filter.clone(),
            "advertising.min_interval" => adv.min_interval.to_string(),
            "advertising.max_interval" => adv.max_interval.to_string(),
            "advertising.channel_map" => adv.channel_map.to_string(),
            "advertising.tx_power" => adv.tx_power.to_string(),
            "advertising.primary_phy" => adv.primary_phy.to_string(),
            "advertising.secondary_phy" => adv.secondary_phy.to_string(),
            "advertising.timeout" => adv.timeout.to_string(),
            _ => return None,
        };
        Some(value)
    }

    pub fn list(&self) -> Vec<(&'static str, String)> {
        KEYS.iter()
            .filter_map(|key| self.get(key).map(|value| (*key, value)))
            .collect()
    }
}
