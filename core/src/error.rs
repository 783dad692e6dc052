// Crate-level error type

use crate::codec::CodecError;
use crate::daemon::TransportError;
use crate::types::BluetoothStatus;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum BridgeError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Daemon rejected module registration for service {service:#04x}: {status}")]
    ModuleRegistration {
        service: u8,
        status: BluetoothStatus,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl BridgeError {
    /// Status a local failure is reported as through a result handler
    pub fn status(&self) -> BluetoothStatus {
        match self {
            BridgeError::Codec(_) => BluetoothStatus::ParmInvalid,
            BridgeError::Transport(e) => e.status(),
            BridgeError::ModuleRegistration { status, .. } => *status,
            BridgeError::Config(_) => BluetoothStatus::ParmInvalid,
            BridgeError::Io(_) => BluetoothStatus::Fail,
        }
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(e: std::io::Error) -> Self {
        BridgeError::Io(e.to_string())
    }
}
