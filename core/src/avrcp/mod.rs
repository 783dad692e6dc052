//! AVRCP target role: answers to a remote controller's media queries

pub mod command;
pub mod interface;
pub mod module;
pub mod notification;
pub mod types;

pub use command::{AvrcpCommand, AvrcpOpcode};
pub use interface::AvrcpInterface;
pub use module::AvrcpModule;
pub use notification::{AvrcpNotification, AvrcpNotificationHandler};
pub use types::{
    AvrcpEvent, AvrcpStatus, KeyState, NotificationParam, NotificationType, PlayStatus,
    PlayerItem, TextEntry,
};

/// AVRCP service id on the daemon socket
pub const SERVICE_ID: u8 = 0x08;
