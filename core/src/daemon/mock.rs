// Recording transport for tests

use super::{Rejected, ReplyHandler, Transport, TransportError};
use crate::gatt::GattReply;
use crate::pdu::{Pdu, PduHeader};
use crate::types::BluetoothStatus;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Captures every sent PDU together with its handler so a test can inspect
/// the command and complete it by hand.
#[derive(Clone, Default)]
pub struct MockTransport {
    sent: Arc<Mutex<VecDeque<(Pdu, ReplyHandler)>>>,
    closed: Arc<Mutex<bool>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail as if the daemon socket had closed
    pub fn close(&self) {
        *self.closed.lock() = true;
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Opcodes of every command still waiting for completion, oldest first
    pub fn opcodes(&self) -> Vec<u8> {
        self.sent.lock().iter().map(|(pdu, _)| pdu.opcode()).collect()
    }

    /// Remove the oldest sent command
    pub fn pop(&self) -> Option<(Pdu, ReplyHandler)> {
        self.sent.lock().pop_front()
    }

    /// Pop the oldest command, returning it as an inbound-style PDU whose
    /// read cursor starts at the payload, and complete its handler.
    pub fn complete_next(&self, result: Result<GattReply, BluetoothStatus>) -> Option<Pdu> {
        let (pdu, handler) = self.pop()?;
        match (handler, result) {
            (ReplyHandler::Gatt(h), result) => h.complete(result),
            (other, Err(status)) => other.fail(status),
            (ReplyHandler::Setup(h) | ReplyHandler::Avrcp(h), Ok(_)) => h.complete(Ok(())),
        }
        Some(rewind(&pdu))
    }

    /// Complete the oldest command successfully
    pub fn ack(&self) -> Option<Pdu> {
        self.complete_next(Ok(GattReply::Done))
    }
}

fn rewind(pdu: &Pdu) -> Pdu {
    let header = PduHeader::new(pdu.service(), pdu.opcode(), pdu.len() as u16);
    Pdu::from_parts(header, pdu.payload().to_vec()).unwrap_or_else(|_| pdu.clone())
}

impl Transport for MockTransport {
    fn send(&self, pdu: Pdu, handler: ReplyHandler) -> Result<(), Rejected> {
        if *self.closed.lock() {
            return Err(Rejected::new(TransportError::Closed, handler));
        }
        self.sent.lock().push_back((pdu, handler));
        Ok(())
    }
}
