// Bridge configuration

use crate::error::BridgeError;
use crate::gatt::AdvertisingParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_SOCKET_PATH: &str = "/run/bluetooth/bluetoothd.sock";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Unix socket the Bluetooth daemon listens on
    pub socket_path: PathBuf,

    /// Client limit sent when registering the GATT module
    pub gatt_max_clients: u32,

    /// Default log filter, overridden by RUST_LOG
    pub log_filter: String,

    /// Parameters sent with every start-advertising command
    pub advertising: AdvertisingParams,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            gatt_max_clients: 1,
            log_filter: "info".to_string(),
            advertising: AdvertisingParams::default(),
        }
    }
}

impl BridgeConfig {
    /// Read a JSON config file
    pub fn load(path: &Path) -> Result<Self, BridgeError> {
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| BridgeError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load `path`, writing the defaults there first if it does not exist
    pub fn load_or_create(path: &Path) -> Result<Self, BridgeError> {
        if path.exists() {
            return Self::load(path);
        }
        let config = Self::default();
        config.save(path)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), BridgeError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| BridgeError::Config(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}
