// Service dispatcher: top-level demultiplexing of inbound PDUs
//
// Runs on the I/O context. Notifications (bit 7 of the opcode set) go to the
// module owning the service. Responses are correlated with the oldest
// outstanding result handler; the handler's variant has to match the
// responding service.

use crate::avrcp::{self, AvrcpModule};
use crate::daemon::ReplyHandler;
use crate::gatt::{self, GattModule};
use crate::pdu::Pdu;
use crate::setup::{self, SetupModule};
use crate::types::BluetoothStatus;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::warn;

pub struct ServiceDispatcher {
    setup: Arc<SetupModule>,
    gatt: Arc<GattModule>,
    avrcp: Arc<AvrcpModule>,
}

impl ServiceDispatcher {
    pub fn new(setup: Arc<SetupModule>, gatt: Arc<GattModule>, avrcp: Arc<AvrcpModule>) -> Self {
        Self { setup, gatt, avrcp }
    }

    pub fn dispatch(&self, pdu: Pdu, pending: &mut VecDeque<ReplyHandler>) {
        if pdu.is_notification() {
            self.dispatch_notification(pdu);
        } else {
            self.dispatch_response(pdu, pending);
        }
    }

    fn dispatch_notification(&self, pdu: Pdu) {
        match pdu.service() {
            setup::SERVICE_ID => self.setup.handle_notification(pdu),
            gatt::SERVICE_ID => self.gatt.handle_notification(pdu),
            avrcp::SERVICE_ID => self.avrcp.handle_notification(pdu),
            service => warn!(service, opcode = pdu.opcode(), "notification for unknown service"),
        }
    }

    fn dispatch_response(&self, pdu: Pdu, pending: &mut VecDeque<ReplyHandler>) {
        let Some(handler) = pending.pop_front() else {
            warn!(
                service = pdu.service(),
                opcode = pdu.opcode(),
                "response without an outstanding command, dropping"
            );
            return;
        };

        match (pdu.service(), handler) {
            (setup::SERVICE_ID, ReplyHandler::Setup(h)) => self.setup.handle_response(pdu, h),
            (gatt::SERVICE_ID, ReplyHandler::Gatt(h)) => self.gatt.handle_response(pdu, h),
            (avrcp::SERVICE_ID, ReplyHandler::Avrcp(h)) => self.avrcp.handle_response(pdu, h),
            (service, handler) => {
                warn!(
                    service,
                    expected = handler.service(),
                    opcode = pdu.opcode(),
                    "response does not match the outstanding command"
                );
                handler.fail(BluetoothStatus::Fail);
            }
        }
    }
}
