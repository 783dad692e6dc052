// GATT module: command building and response/notification dispatch

use super::command::GattCommand;
use super::notification::{GattNotification, GattNotificationHandler};
use super::opcode::GattOpcode;
use super::GattReply;
use crate::codec::CodecError;
use crate::daemon::ResultHandler;
use crate::pdu::Pdu;
use crate::types::{BluetoothStatus, DeviceType};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};

/// Owns the notification-handler slot for one GATT interface.
///
/// The slot is set and cleared by whoever owns the interface (normally the
/// resource manager); there is no process-wide registration.
#[derive(Default)]
pub struct GattModule {
    handler: RwLock<Option<Arc<dyn GattNotificationHandler>>>,
}

impl GattModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_notification_handler(&self, handler: Arc<dyn GattNotificationHandler>) {
        *self.handler.write() = Some(handler);
    }

    pub fn clear_notification_handler(&self) {
        *self.handler.write() = None;
    }

    pub fn has_notification_handler(&self) -> bool {
        self.handler.read().is_some()
    }

    pub fn build(&self, command: &GattCommand) -> Result<Pdu, CodecError> {
        command.to_pdu()
    }

    /// Complete `handler` from a response PDU
    pub fn handle_response(&self, mut pdu: Pdu, handler: ResultHandler<GattReply>) {
        let Some(opcode) = GattOpcode::from_u8(pdu.opcode()) else {
            warn!(opcode = pdu.opcode(), "unknown GATT response opcode");
            handler.fail(BluetoothStatus::Fail);
            return;
        };

        let result = match opcode {
            GattOpcode::Error => match pdu.get::<BluetoothStatus>() {
                Ok(status) => {
                    debug!(%status, "GATT command failed");
                    Err(status)
                }
                Err(e) => {
                    warn!("malformed GATT error response: {}", e);
                    Err(BluetoothStatus::Fail)
                }
            },
            GattOpcode::ClientGetDeviceType => match pdu.get::<DeviceType>() {
                Ok(device_type) => Ok(GattReply::DeviceType(device_type)),
                Err(e) => {
                    warn!("malformed device type response: {}", e);
                    Err(BluetoothStatus::Fail)
                }
            },
            _ => Ok(GattReply::Done),
        };

        pdu.warn_trailing();
        handler.complete(result);
    }

    /// Decode a notification and hand it to the registered handler
    pub fn handle_notification(&self, mut pdu: Pdu) {
        // Clone out of the lock so the handler never runs under it
        let handler = self.handler.read().clone();
        let Some(handler) = handler else {
            debug!(opcode = pdu.opcode(), "no GATT notification handler, dropping");
            return;
        };

        match GattNotification::decode(&mut pdu) {
            Ok(Some(notification)) => {
                pdu.warn_trailing();
                notification.deliver(handler.as_ref());
            }
            Ok(None) => debug!(opcode = pdu.opcode(), "ignoring unassigned GATT notification"),
            Err(e) => warn!(opcode = pdu.opcode(), "dropping malformed GATT notification: {}", e),
        }
    }
}
