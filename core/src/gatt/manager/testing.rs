// Manager test harness: a manager over the recording transport, driven
// message by message without a runtime

use super::{GattEvent, GattManager, GattManagerHandle, ManagerMessage};
use crate::daemon::mock::MockTransport;
use crate::gatt::module::GattModule;
use crate::gatt::notification::GattNotification;
use crate::gatt::types::AdvertisingParams;
use crate::gatt::{GattInterface, GattReply};
use crate::pdu::Pdu;
use crate::types::BluetoothStatus;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

pub(super) struct Harness {
    pub manager: GattManager,
    pub handle: GattManagerHandle,
    pub transport: MockTransport,
    pub module: Arc<GattModule>,
    events: UnboundedReceiver<GattEvent>,
}

impl Harness {
    pub fn new() -> Self {
        let transport = MockTransport::new();
        let module = Arc::new(GattModule::new());
        let interface = GattInterface::new(module.clone(), Arc::new(transport.clone()));
        let (manager, handle, events) = GattManager::new(interface, AdvertisingParams::default());
        Self {
            manager,
            handle,
            transport,
            module,
            events,
        }
    }

    pub fn pump(&mut self) {
        self.manager.pump();
    }

    pub fn notify(&mut self, notification: GattNotification) {
        self.manager
            .process(ManagerMessage::Notification(notification));
        self.pump();
    }

    /// Opcodes of commands sent and not yet completed
    pub fn sent(&self) -> Vec<u8> {
        self.transport.opcodes()
    }

    /// Complete the oldest command successfully and return it
    pub fn ack(&mut self) -> Pdu {
        let pdu = self.transport.ack().expect("a command was sent");
        self.pump();
        pdu
    }

    pub fn complete(&mut self, result: Result<GattReply, BluetoothStatus>) -> Pdu {
        let pdu = self
            .transport
            .complete_next(result)
            .expect("a command was sent");
        self.pump();
        pdu
    }

    pub fn fail(&mut self, status: BluetoothStatus) -> Pdu {
        self.complete(Err(status))
    }

    pub fn events(&mut self) -> Vec<GattEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}
