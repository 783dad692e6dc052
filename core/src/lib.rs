//! btbridge core: a client bridge to a Bluetooth daemon over a framed
//! socket protocol.
//!
//! Two execution contexts:
//! - the I/O context ([`daemon::connection`]) owns the socket, correlates
//!   responses with result handlers and decodes notifications
//! - the control context ([`gatt::GattManager`]) owns every GATT resource
//!   registry and sequences operations against the daemon
//!
//! They only talk over channels. [`Bridge`] wires both together.

pub mod avrcp;
pub mod bridge;
pub mod codec;
pub mod config;
pub mod daemon;
pub mod dispatch;
pub mod error;
pub mod gatt;
pub mod logging;
pub mod pdu;
pub mod setup;
pub mod types;

pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use error::BridgeError;
pub use gatt::{GattEvent, GattManagerError, GattManagerHandle};
pub use pdu::Pdu;
pub use types::{BdAddr, BluetoothStatus, DeviceType, LinkTransport};
