// Resource records and their pending-operation slots
//
// Every slot is an Option: set when the operation starts, taken when it
// resolves. A non-empty slot is what makes a second request Busy.

use super::{GattManagerError, RecordKey};
use crate::gatt::types::{AdvertiseData, AttHandle, GattDbElement, GattWriteType};
use crate::types::BdAddr;
use std::collections::HashMap;
use tokio::sync::oneshot;
use uuid::Uuid;

pub(crate) type Reply<T> = oneshot::Sender<Result<T, GattManagerError>>;

pub(crate) fn respond<T>(reply: Reply<T>, result: Result<T, GattManagerError>) {
    let _ = reply.send(result);
}

pub(crate) fn respond_opt<T>(reply: Option<Reply<T>>, result: Result<T, GattManagerError>) {
    if let Some(reply) = reply {
        respond(reply, result);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttrKind {
    Characteristic,
    Descriptor,
}

#[derive(Debug)]
pub(crate) struct ReadState {
    pub reply: Reply<Vec<u8>>,
    pub handle: AttHandle,
    pub auth_retried: bool,
}

#[derive(Debug)]
pub(crate) struct WriteState {
    pub reply: Reply<()>,
    pub handle: AttHandle,
    pub write_type: GattWriteType,
    pub value: Vec<u8>,
    pub auth_retried: bool,
}

#[derive(Debug)]
pub(crate) struct ClientRecord {
    pub key: RecordKey,
    pub app_uuid: Uuid,
    pub client_if: i32,
    pub conn_id: i32,
    /// Peer of the current or requested connection
    pub addr: BdAddr,
    pub registering: bool,
    pub connect: Option<Reply<()>>,
    pub disconnect: Option<Reply<()>>,
    pub discover: Option<Reply<Vec<GattDbElement>>>,
    pub read_rssi: Option<Reply<i32>>,
    pub register_notification: Option<Reply<()>>,
    pub deregister_notification: Option<Reply<()>>,
    pub read_characteristic: Option<ReadState>,
    pub write_characteristic: Option<WriteState>,
    pub read_descriptor: Option<ReadState>,
    pub write_descriptor: Option<WriteState>,
    pub unregister: Option<Reply<()>>,
}

impl ClientRecord {
    pub fn new(key: RecordKey, app_uuid: Uuid) -> Self {
        Self {
            key,
            app_uuid,
            client_if: 0,
            conn_id: 0,
            addr: BdAddr::ANY,
            registering: false,
            connect: None,
            disconnect: None,
            discover: None,
            read_rssi: None,
            register_notification: None,
            deregister_notification: None,
            read_characteristic: None,
            write_characteristic: None,
            read_descriptor: None,
            write_descriptor: None,
            unregister: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.conn_id != 0
    }

    pub fn read_slot(&mut self, kind: AttrKind) -> &mut Option<ReadState> {
        match kind {
            AttrKind::Characteristic => &mut self.read_characteristic,
            AttrKind::Descriptor => &mut self.read_descriptor,
        }
    }

    pub fn write_slot(&mut self, kind: AttrKind) -> &mut Option<WriteState> {
        match kind {
            AttrKind::Characteristic => &mut self.write_characteristic,
            AttrKind::Descriptor => &mut self.write_descriptor,
        }
    }

    /// Reject every operation still waiting on this record
    pub fn fail_pending(&mut self, error: GattManagerError) {
        respond_opt(self.connect.take(), Err(error.clone()));
        respond_opt(self.disconnect.take(), Err(error.clone()));
        self.fail_link_ops(error);
    }

    /// Reject the operations that need a live link; connect, disconnect and
    /// unregister are left alone
    pub fn fail_link_ops(&mut self, error: GattManagerError) {
        respond_opt(self.discover.take(), Err(error.clone()));
        respond_opt(self.read_rssi.take(), Err(error.clone()));
        respond_opt(self.register_notification.take(), Err(error.clone()));
        respond_opt(self.deregister_notification.take(), Err(error.clone()));
        for kind in [AttrKind::Characteristic, AttrKind::Descriptor] {
            if let Some(state) = self.read_slot(kind).take() {
                respond(state.reply, Err(error.clone()));
            }
            if let Some(state) = self.write_slot(kind).take() {
                respond(state.reply, Err(error.clone()));
            }
        }
    }
}

/// Add-service request; `db` is held until the command is actually sent
#[derive(Debug)]
pub(crate) struct AddServiceState {
    pub reply: Reply<()>,
    pub db: Option<Vec<GattDbElement>>,
}

#[derive(Debug)]
pub(crate) struct ServerRecord {
    pub key: RecordKey,
    pub app_uuid: Uuid,
    pub server_if: i32,
    pub registering: bool,
    /// Peer address to connection id; 0 while a connect is in flight
    pub connections: HashMap<BdAddr, i32>,
    pub register: Option<Reply<()>>,
    pub connect: Option<(BdAddr, Reply<()>)>,
    pub disconnect: Option<(BdAddr, Reply<()>)>,
    pub add_service: Option<AddServiceState>,
    pub stop_service: Option<Reply<()>>,
    pub delete_service: Option<Reply<()>>,
    pub send_response: Option<Reply<()>>,
    pub send_indication: Option<Reply<()>>,
    pub unregister: Option<Reply<()>>,
}

impl ServerRecord {
    pub fn new(key: RecordKey, app_uuid: Uuid) -> Self {
        Self {
            key,
            app_uuid,
            server_if: 0,
            registering: false,
            connections: HashMap::new(),
            register: None,
            connect: None,
            disconnect: None,
            add_service: None,
            stop_service: None,
            delete_service: None,
            send_response: None,
            send_indication: None,
            unregister: None,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.server_if != 0
    }

    pub fn conn_id(&self, addr: &BdAddr) -> Option<i32> {
        self.connections.get(addr).copied()
    }

    pub fn fail_pending(&mut self, error: GattManagerError) {
        respond_opt(self.register.take(), Err(error.clone()));
        if let Some((_, reply)) = self.connect.take() {
            respond(reply, Err(error.clone()));
        }
        if let Some((_, reply)) = self.disconnect.take() {
            respond(reply, Err(error.clone()));
        }
        if let Some(state) = self.add_service.take() {
            respond(state.reply, Err(error.clone()));
        }
        respond_opt(self.stop_service.take(), Err(error.clone()));
        respond_opt(self.delete_service.take(), Err(error.clone()));
        respond_opt(self.send_response.take(), Err(error.clone()));
        respond_opt(self.send_indication.take(), Err(error));
    }
}

#[derive(Debug)]
pub(crate) struct ScannerRecord {
    pub key: RecordKey,
    pub scan_uuid: Uuid,
    pub scanner_id: u8,
    pub start: Option<Reply<Uuid>>,
    pub stop: Option<Reply<()>>,
    pub unregistering: bool,
}

impl ScannerRecord {
    pub fn new(key: RecordKey, scan_uuid: Uuid) -> Self {
        Self {
            key,
            scan_uuid,
            scanner_id: 0,
            start: None,
            stop: None,
            unregistering: false,
        }
    }
}

#[derive(Debug)]
pub(crate) struct AdvertiserRecord {
    pub key: RecordKey,
    pub app_uuid: Uuid,
    pub advertiser_id: u8,
    pub data: AdvertiseData,
    pub scan_response: AdvertiseData,
    pub start: Option<Reply<()>>,
    pub stop: Option<Reply<()>>,
}

impl AdvertiserRecord {
    pub fn new(
        key: RecordKey,
        app_uuid: Uuid,
        data: AdvertiseData,
        scan_response: AdvertiseData,
    ) -> Self {
        Self {
            key,
            app_uuid,
            advertiser_id: 0,
            data,
            scan_response,
            start: None,
            stop: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_pending_clears_every_slot() {
        let mut client = ClientRecord::new(1, Uuid::nil());
        let (tx, mut rx) = oneshot::channel();
        client.connect = Some(tx);
        let (tx, mut read_rx) = oneshot::channel();
        client.read_descriptor = Some(ReadState {
            reply: tx,
            handle: AttHandle(1),
            auth_retried: false,
        });

        client.fail_pending(GattManagerError::Failed("gone".into()));

        assert!(client.connect.is_none());
        assert!(client.read_descriptor.is_none());
        assert_eq!(
            rx.try_recv().unwrap(),
            Err(GattManagerError::Failed("gone".into()))
        );
        assert!(read_rx.try_recv().unwrap().is_err());
    }

    #[test]
    fn test_server_connection_lookup() {
        let mut server = ServerRecord::new(1, Uuid::nil());
        let addr = BdAddr([1; 6]);
        assert_eq!(server.conn_id(&addr), None);
        server.connections.insert(addr, 5);
        assert_eq!(server.conn_id(&addr), Some(5));
        assert!(!server.is_registered());
    }
}
