//! GATT: client, server, scanner and advertiser support
//!
//! Layers, bottom up:
//! - `types` / `opcode`: wire values
//! - `command` / `notification`: per-opcode packers and decoders
//! - `module`: response and notification dispatch, notification-handler slot
//! - `interface`: caller façade submitting commands to the transport
//! - `manager`: resource registries and the registration/retry state machine

pub mod command;
pub mod interface;
pub mod manager;
pub mod module;
pub mod notification;
pub mod opcode;
pub mod types;

pub use command::GattCommand;
pub use interface::GattInterface;
pub use manager::{GattEvent, GattManager, GattManagerError, GattManagerHandle};
pub use module::GattModule;
pub use notification::{GattNotification, GattNotificationHandler};
pub use opcode::GattOpcode;
pub use types::{
    AdvertiseData, AdvertisingParams, AttHandle, GattAttrType, GattAuthReq, GattDbElement,
    GattResponse, GattStatus, GattWriteType,
};

use crate::types::DeviceType;

/// GATT service id on the daemon socket
pub const SERVICE_ID: u8 = 0x09;

/// Successful outcome of a GATT command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GattReply {
    Done,
    DeviceType(DeviceType),
}
