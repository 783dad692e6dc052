// AVRCP module: response and notification dispatch

use super::command::{AvrcpCommand, AvrcpOpcode};
use super::notification::{AvrcpNotification, AvrcpNotificationHandler};
use crate::codec::CodecError;
use crate::daemon::ResultHandler;
use crate::pdu::Pdu;
use crate::types::BluetoothStatus;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Default)]
pub struct AvrcpModule {
    handler: RwLock<Option<Arc<dyn AvrcpNotificationHandler>>>,
}

impl AvrcpModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_notification_handler(&self, handler: Arc<dyn AvrcpNotificationHandler>) {
        *self.handler.write() = Some(handler);
    }

    pub fn clear_notification_handler(&self) {
        *self.handler.write() = None;
    }

    pub fn build(&self, command: &AvrcpCommand) -> Result<Pdu, CodecError> {
        command.to_pdu()
    }

    pub fn handle_response(&self, mut pdu: Pdu, handler: ResultHandler<()>) {
        let result = match AvrcpOpcode::from_u8(pdu.opcode()) {
            Some(AvrcpOpcode::Error) => match pdu.get::<BluetoothStatus>() {
                Ok(status) => {
                    debug!(%status, "AVRCP command failed");
                    Err(status)
                }
                Err(e) => {
                    warn!("malformed AVRCP error response: {}", e);
                    Err(BluetoothStatus::Fail)
                }
            },
            Some(_) => Ok(()),
            None => {
                warn!(opcode = pdu.opcode(), "unknown AVRCP response opcode");
                Err(BluetoothStatus::Fail)
            }
        };
        pdu.warn_trailing();
        handler.complete(result);
    }

    pub fn handle_notification(&self, mut pdu: Pdu) {
        let handler = self.handler.read().clone();
        let Some(handler) = handler else {
            debug!(opcode = pdu.opcode(), "no AVRCP notification handler, dropping");
            return;
        };

        match AvrcpNotification::decode(&mut pdu) {
            Ok(Some(notification)) => {
                pdu.warn_trailing();
                notification.deliver(handler.as_ref());
            }
            Ok(None) => debug!(opcode = pdu.opcode(), "ignoring unassigned AVRCP notification"),
            Err(e) => warn!(opcode = pdu.opcode(), "dropping malformed AVRCP notification: {}", e),
        }
    }
}
