//! GATT resource manager
//!
//! Tracks the clients, servers, scanners and advertisers an application has
//! opened and sequences their operations against the daemon. The manager is
//! a single task (the control context) that owns every registry. It is fed
//! by one channel carrying:
//!
//! - caller requests from [`GattManagerHandle`], each with a oneshot reply
//! - notifications forwarded from the I/O context by the handler the manager
//!   installs on the GATT module
//! - command completions, tagged with the record they belong to
//!
//! Records are addressed by a monotonically increasing key, so a completion
//! or notification for a record that has since been removed is a no-op.

mod advertiser;
mod client;
mod scanner;
mod server;
mod state;
#[cfg(test)]
mod testing;

use super::interface::GattInterface;
use super::notification::*;
use super::types::{
    AdvertiseData, AdvertisingParams, AttHandle, GattDbElement, GattResponse, GattStatus,
    GattWriteType,
};
use super::GattReply;
use crate::daemon::ResultHandler;
use crate::types::{BdAddr, BluetoothStatus, DeviceType};
use state::{AdvertiserRecord, AttrKind, ClientRecord, Reply, ScannerRecord, ServerRecord};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::sync::oneshot;
use tracing::{debug, info};
use uuid::Uuid;

/// Caller-visible outcome of a failed manager operation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GattManagerError {
    #[error("Operation already in progress")]
    Busy,

    #[error("Invalid parameter")]
    InvalidParameter,

    #[error("Not ready")]
    NotReady,

    #[error("Registration failed")]
    RegistrationFailed,

    #[error("{0}")]
    Failed(String),

    #[error("Daemon error: {0}")]
    Daemon(BluetoothStatus),

    #[error("GATT error: {0}")]
    Gatt(GattStatus),

    #[error("GATT manager stopped")]
    ManagerStopped,
}

/// Events emitted by the manager to the embedding application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattEvent {
    ClientRegistered {
        app_uuid: Uuid,
        client_if: i32,
    },
    ClientUnregistered {
        app_uuid: Uuid,
    },
    ClientConnectionChanged {
        app_uuid: Uuid,
        addr: BdAddr,
        connected: bool,
    },
    DiscoverCompleted {
        app_uuid: Uuid,
        success: bool,
    },
    ServicesDiscovered {
        app_uuid: Uuid,
        db: Vec<GattDbElement>,
    },
    /// A characteristic value arrived by read, notification or indication
    CharacteristicChanged {
        app_uuid: Uuid,
        handle: AttHandle,
        value: Vec<u8>,
    },
    ScannerRegistered {
        scan_uuid: Uuid,
        scanner_id: u8,
    },
    LeDeviceFound {
        addr: BdAddr,
        rssi: i32,
        adv_data: Vec<u8>,
        device_type: DeviceType,
    },
    AdvertiserRegistered {
        app_uuid: Uuid,
        advertiser_id: u8,
    },
    ServerRegistered {
        app_uuid: Uuid,
        server_if: i32,
    },
    ServerUnregistered {
        app_uuid: Uuid,
    },
    ServerConnectionChanged {
        app_uuid: Uuid,
        addr: BdAddr,
        connected: bool,
    },
    ServerServiceUpdated {
        app_uuid: Uuid,
        db: Vec<GattDbElement>,
    },
    ReadRequested {
        app_uuid: Uuid,
        addr: BdAddr,
        request_id: i32,
        handle: AttHandle,
    },
    WriteRequested {
        app_uuid: Uuid,
        addr: BdAddr,
        request_id: i32,
        handle: AttHandle,
        value: Vec<u8>,
        need_response: bool,
    },
}

/// Requests accepted from [`GattManagerHandle`]
#[derive(Debug)]
pub(crate) enum GattRequest {
    Connect {
        app_uuid: Uuid,
        addr: BdAddr,
        reply: Reply<()>,
    },
    Disconnect {
        app_uuid: Uuid,
        addr: BdAddr,
        reply: Reply<()>,
    },
    Discover {
        app_uuid: Uuid,
        reply: Reply<Vec<GattDbElement>>,
    },
    ReadRemoteRssi {
        client_if: i32,
        addr: BdAddr,
        reply: Reply<i32>,
    },
    RegisterNotifications {
        app_uuid: Uuid,
        handle: AttHandle,
        reply: Reply<()>,
    },
    DeregisterNotifications {
        app_uuid: Uuid,
        handle: AttHandle,
        reply: Reply<()>,
    },
    Read {
        kind: AttrKind,
        app_uuid: Uuid,
        handle: AttHandle,
        reply: Reply<Vec<u8>>,
    },
    Write {
        kind: AttrKind,
        app_uuid: Uuid,
        handle: AttHandle,
        write_type: GattWriteType,
        value: Vec<u8>,
        reply: Reply<()>,
    },
    UnregisterClient {
        client_if: i32,
        reply: Reply<()>,
    },
    StartLeScan {
        service_uuids: Vec<Uuid>,
        reply: Reply<Uuid>,
    },
    StopLeScan {
        scan_uuid: Uuid,
        reply: Reply<()>,
    },
    StartAdvertising {
        app_uuid: Uuid,
        data: AdvertiseData,
        scan_response: AdvertiseData,
        reply: Reply<()>,
    },
    StopAdvertising {
        app_uuid: Uuid,
        reply: Reply<()>,
    },
    RegisterServer {
        app_uuid: Uuid,
        reply: Reply<()>,
    },
    ConnectPeripheral {
        app_uuid: Uuid,
        addr: BdAddr,
        reply: Reply<()>,
    },
    DisconnectPeripheral {
        app_uuid: Uuid,
        addr: BdAddr,
        reply: Reply<()>,
    },
    UnregisterServer {
        server_if: i32,
        reply: Reply<()>,
    },
    AddService {
        app_uuid: Uuid,
        db: Vec<GattDbElement>,
        reply: Reply<()>,
    },
    StopService {
        app_uuid: Uuid,
        service_handle: AttHandle,
        reply: Reply<()>,
    },
    RemoveService {
        app_uuid: Uuid,
        service_handle: AttHandle,
        reply: Reply<()>,
    },
    SendResponse {
        app_uuid: Uuid,
        addr: BdAddr,
        status: GattStatus,
        request_id: i32,
        response: GattResponse,
        reply: Reply<()>,
    },
    SendIndication {
        app_uuid: Uuid,
        addr: BdAddr,
        handle: AttHandle,
        confirm: bool,
        value: Vec<u8>,
        reply: Reply<()>,
    },
}

/// Key of one resource record; never reused within a manager
pub(crate) type RecordKey = u64;

fn take_key(next: &mut RecordKey) -> RecordKey {
    let key = *next;
    *next += 1;
    key
}

/// Which command a completion belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Op {
    RegisterClient,
    UnregisterClient,
    Connect,
    Disconnect,
    SearchService,
    GetGattDb,
    ReadRemoteRssi,
    RegisterNotification,
    DeregisterNotification,
    Read(AttrKind),
    Write(AttrKind),
    RegisterScanner,
    Scan { start: bool },
    UnregisterScanner,
    RegisterAdvertiser,
    StartAdvertising,
    UnregisterAdvertiser,
    RegisterServer,
    UnregisterServer,
    ServerConnect,
    ServerDisconnect,
    AddService,
    StopService,
    DeleteService,
    SendResponse,
    SendIndication,
    AutoResponse,
    DeviceType {
        addr: BdAddr,
        rssi: i32,
        adv_data: Vec<u8>,
    },
}

#[derive(Debug)]
pub(crate) enum ManagerMessage {
    Request(GattRequest),
    Notification(GattNotification),
    Completed {
        key: RecordKey,
        op: Op,
        result: Result<GattReply, BluetoothStatus>,
    },
    Shutdown,
}

/// Cloneable handle to a running manager
#[derive(Clone)]
pub struct GattManagerHandle {
    tx: UnboundedSender<ManagerMessage>,
}

impl GattManagerHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> GattRequest,
    ) -> Result<T, GattManagerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ManagerMessage::Request(build(reply)))
            .map_err(|_| GattManagerError::ManagerStopped)?;
        rx.await.map_err(|_| GattManagerError::ManagerStopped)?
    }

    /// Connect the client identified by `app_uuid`, registering it first
    /// when needed
    pub async fn connect(&self, app_uuid: Uuid, addr: BdAddr) -> Result<(), GattManagerError> {
        self.request(|reply| GattRequest::Connect {
            app_uuid,
            addr,
            reply,
        })
        .await
    }

    pub async fn disconnect(&self, app_uuid: Uuid, addr: BdAddr) -> Result<(), GattManagerError> {
        self.request(|reply| GattRequest::Disconnect {
            app_uuid,
            addr,
            reply,
        })
        .await
    }

    /// Discover every service of the connected device
    pub async fn discover(&self, app_uuid: Uuid) -> Result<Vec<GattDbElement>, GattManagerError> {
        self.request(|reply| GattRequest::Discover { app_uuid, reply })
            .await
    }

    pub async fn read_remote_rssi(
        &self,
        client_if: i32,
        addr: BdAddr,
    ) -> Result<i32, GattManagerError> {
        self.request(|reply| GattRequest::ReadRemoteRssi {
            client_if,
            addr,
            reply,
        })
        .await
    }

    pub async fn register_notifications(
        &self,
        app_uuid: Uuid,
        handle: AttHandle,
    ) -> Result<(), GattManagerError> {
        self.request(|reply| GattRequest::RegisterNotifications {
            app_uuid,
            handle,
            reply,
        })
        .await
    }

    pub async fn deregister_notifications(
        &self,
        app_uuid: Uuid,
        handle: AttHandle,
    ) -> Result<(), GattManagerError> {
        self.request(|reply| GattRequest::DeregisterNotifications {
            app_uuid,
            handle,
            reply,
        })
        .await
    }

    pub async fn read_characteristic(
        &self,
        app_uuid: Uuid,
        handle: AttHandle,
    ) -> Result<Vec<u8>, GattManagerError> {
        self.request(|reply| GattRequest::Read {
            kind: AttrKind::Characteristic,
            app_uuid,
            handle,
            reply,
        })
        .await
    }

    pub async fn write_characteristic(
        &self,
        app_uuid: Uuid,
        handle: AttHandle,
        write_type: GattWriteType,
        value: Vec<u8>,
    ) -> Result<(), GattManagerError> {
        self.request(|reply| GattRequest::Write {
            kind: AttrKind::Characteristic,
            app_uuid,
            handle,
            write_type,
            value,
            reply,
        })
        .await
    }

    pub async fn read_descriptor(
        &self,
        app_uuid: Uuid,
        handle: AttHandle,
    ) -> Result<Vec<u8>, GattManagerError> {
        self.request(|reply| GattRequest::Read {
            kind: AttrKind::Descriptor,
            app_uuid,
            handle,
            reply,
        })
        .await
    }

    pub async fn write_descriptor(
        &self,
        app_uuid: Uuid,
        handle: AttHandle,
        value: Vec<u8>,
    ) -> Result<(), GattManagerError> {
        self.request(|reply| GattRequest::Write {
            kind: AttrKind::Descriptor,
            app_uuid,
            handle,
            write_type: GattWriteType::Normal,
            value,
            reply,
        })
        .await
    }

    pub async fn unregister_client(&self, client_if: i32) -> Result<(), GattManagerError> {
        self.request(|reply| GattRequest::UnregisterClient { client_if, reply })
            .await
    }

    /// Start an LE scan. Resolves with the UUID identifying the scan.
    pub async fn start_le_scan(&self, service_uuids: Vec<Uuid>) -> Result<Uuid, GattManagerError> {
        self.request(|reply| GattRequest::StartLeScan {
            service_uuids,
            reply,
        })
        .await
    }

    pub async fn stop_le_scan(&self, scan_uuid: Uuid) -> Result<(), GattManagerError> {
        self.request(|reply| GattRequest::StopLeScan { scan_uuid, reply })
            .await
    }

    pub async fn start_advertising(
        &self,
        app_uuid: Uuid,
        data: AdvertiseData,
        scan_response: AdvertiseData,
    ) -> Result<(), GattManagerError> {
        self.request(|reply| GattRequest::StartAdvertising {
            app_uuid,
            data,
            scan_response,
            reply,
        })
        .await
    }

    pub async fn stop_advertising(&self, app_uuid: Uuid) -> Result<(), GattManagerError> {
        self.request(|reply| GattRequest::StopAdvertising { app_uuid, reply })
            .await
    }

    pub async fn register_server(&self, app_uuid: Uuid) -> Result<(), GattManagerError> {
        self.request(|reply| GattRequest::RegisterServer { app_uuid, reply })
            .await
    }

    pub async fn connect_peripheral(
        &self,
        app_uuid: Uuid,
        addr: BdAddr,
    ) -> Result<(), GattManagerError> {
        self.request(|reply| GattRequest::ConnectPeripheral {
            app_uuid,
            addr,
            reply,
        })
        .await
    }

    pub async fn disconnect_peripheral(
        &self,
        app_uuid: Uuid,
        addr: BdAddr,
    ) -> Result<(), GattManagerError> {
        self.request(|reply| GattRequest::DisconnectPeripheral {
            app_uuid,
            addr,
            reply,
        })
        .await
    }

    pub async fn unregister_server(&self, server_if: i32) -> Result<(), GattManagerError> {
        self.request(|reply| GattRequest::UnregisterServer { server_if, reply })
            .await
    }

    pub async fn add_service(
        &self,
        app_uuid: Uuid,
        db: Vec<GattDbElement>,
    ) -> Result<(), GattManagerError> {
        self.request(|reply| GattRequest::AddService {
            app_uuid,
            db,
            reply,
        })
        .await
    }

    pub async fn stop_service(
        &self,
        app_uuid: Uuid,
        service_handle: AttHandle,
    ) -> Result<(), GattManagerError> {
        self.request(|reply| GattRequest::StopService {
            app_uuid,
            service_handle,
            reply,
        })
        .await
    }

    pub async fn remove_service(
        &self,
        app_uuid: Uuid,
        service_handle: AttHandle,
    ) -> Result<(), GattManagerError> {
        self.request(|reply| GattRequest::RemoveService {
            app_uuid,
            service_handle,
            reply,
        })
        .await
    }

    /// Answer a ReadRequested or WriteRequested event
    pub async fn send_response(
        &self,
        app_uuid: Uuid,
        addr: BdAddr,
        status: GattStatus,
        request_id: i32,
        response: GattResponse,
    ) -> Result<(), GattManagerError> {
        self.request(|reply| GattRequest::SendResponse {
            app_uuid,
            addr,
            status,
            request_id,
            response,
            reply,
        })
        .await
    }

    pub async fn send_indication(
        &self,
        app_uuid: Uuid,
        addr: BdAddr,
        handle: AttHandle,
        confirm: bool,
        value: Vec<u8>,
    ) -> Result<(), GattManagerError> {
        self.request(|reply| GattRequest::SendIndication {
            app_uuid,
            addr,
            handle,
            confirm,
            value,
            reply,
        })
        .await
    }

    /// Stop the manager; pending operations fail with `ManagerStopped`
    pub fn shutdown(&self) {
        let _ = self.tx.send(ManagerMessage::Shutdown);
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Notification handler installed on the GATT module. Runs on the I/O
/// context and only forwards into the manager channel.
struct ManagerNotificationHandler {
    tx: WeakUnboundedSender<ManagerMessage>,
}

impl ManagerNotificationHandler {
    fn forward(&self, notification: GattNotification) {
        if let Some(tx) = self.tx.upgrade() {
            let _ = tx.send(ManagerMessage::Notification(notification));
        }
    }
}

macro_rules! forward {
    ($($method:ident($event:ty) => $variant:ident),* $(,)?) => {
        impl GattNotificationHandler for ManagerNotificationHandler {
            $(fn $method(&self, event: $event) {
                self.forward(GattNotification::$variant(event))
            })*
        }
    };
}

forward! {
    register_client(RegisterClientEvent) => RegisterClient,
    connect(ConnectEvent) => Connect,
    disconnect(ConnectEvent) => Disconnect,
    search_complete(SearchCompleteEvent) => SearchComplete,
    register_for_notification(RegisterForNotificationEvent) => RegisterForNotification,
    notify(NotifyEvent) => Notify,
    read_characteristic(ReadEvent) => ReadCharacteristic,
    write_characteristic(WriteEvent) => WriteCharacteristic,
    read_descriptor(ReadEvent) => ReadDescriptor,
    write_descriptor(WriteEvent) => WriteDescriptor,
    execute_write(ExecuteWriteEvent) => ExecuteWrite,
    read_remote_rssi(ReadRemoteRssiEvent) => ReadRemoteRssi,
    get_gatt_db(GattDbEvent) => GetGattDb,
    register_server(RegisterServerEvent) => RegisterServer,
    connection(ConnectionEvent) => Connection,
    service_added(ServiceAddedEvent) => ServiceAdded,
    service_stopped(ServiceHandleEvent) => ServiceStopped,
    service_deleted(ServiceHandleEvent) => ServiceDeleted,
    request_read(RequestReadEvent) => RequestRead,
    request_write(RequestWriteEvent) => RequestWrite,
    register_scanner(RegisterScannerEvent) => RegisterScanner,
    scan_result(ScanResultEvent) => ScanResult,
    register_advertiser(RegisterAdvertiserEvent) => RegisterAdvertiser,
    start_advertising(StartAdvertisingEvent) => StartAdvertising,
}

/// What every operation needs besides the registries: the way out to the
/// daemon and the way back into this task
struct Context {
    interface: GattInterface,
    params: AdvertisingParams,
    completions: WeakUnboundedSender<ManagerMessage>,
    events: UnboundedSender<GattEvent>,
}

impl Context {
    fn emit(&self, event: GattEvent) {
        debug!(?event, "GATT event");
        let _ = self.events.send(event);
    }

    /// Result handler that routes a command's outcome back into the manager
    fn completion(&self, key: RecordKey, op: Op) -> ResultHandler<GattReply> {
        let tx = self.completions.clone();
        ResultHandler::new(move |result| {
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(ManagerMessage::Completed { key, op, result });
            }
        })
    }
}

/// The control-context state machine. Owns every resource registry.
pub struct GattManager {
    ctx: Context,
    rx: UnboundedReceiver<ManagerMessage>,
    next_key: RecordKey,
    clients: HashMap<Uuid, ClientRecord>,
    servers: HashMap<Uuid, ServerRecord>,
    scanners: HashMap<Uuid, ScannerRecord>,
    advertisers: HashMap<Uuid, AdvertiserRecord>,
}

impl GattManager {
    /// Build a manager and install its notification handler on the
    /// interface's module. The manager does nothing until [`run`] is polled.
    ///
    /// [`run`]: GattManager::run
    pub fn new(
        interface: GattInterface,
        params: AdvertisingParams,
    ) -> (Self, GattManagerHandle, UnboundedReceiver<GattEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();

        interface.init(Arc::new(ManagerNotificationHandler {
            tx: tx.downgrade(),
        }));

        let manager = Self {
            ctx: Context {
                interface,
                params,
                completions: tx.downgrade(),
                events,
            },
            rx,
            next_key: 1,
            clients: HashMap::new(),
            servers: HashMap::new(),
            scanners: HashMap::new(),
            advertisers: HashMap::new(),
        };
        (manager, GattManagerHandle { tx }, events_rx)
    }

    /// Build a manager and run it on its own task
    pub fn spawn(
        interface: GattInterface,
        params: AdvertisingParams,
    ) -> (GattManagerHandle, UnboundedReceiver<GattEvent>) {
        let (manager, handle, events) = Self::new(interface, params);
        tokio::spawn(manager.run());
        (handle, events)
    }

    /// Process messages until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        info!("GATT manager started");
        while let Some(msg) = self.rx.recv().await {
            if !self.process(msg) {
                break;
            }
        }
        self.stop();
        info!("GATT manager stopped");
    }

    fn process(&mut self, msg: ManagerMessage) -> bool {
        match msg {
            ManagerMessage::Request(request) => self.handle_request(request),
            ManagerMessage::Notification(notification) => self.handle_notification(notification),
            ManagerMessage::Completed { key, op, result } => {
                self.handle_completion(key, op, result)
            }
            ManagerMessage::Shutdown => return false,
        }
        true
    }

    /// Drain every queued message without awaiting
    #[cfg(test)]
    fn pump(&mut self) {
        while let Ok(msg) = self.rx.try_recv() {
            self.process(msg);
        }
    }

    fn stop(&mut self) {
        self.ctx.interface.cleanup();
        self.rx.close();
        // Dropping the records drops their reply senders; waiting callers
        // observe ManagerStopped
        self.clients.clear();
        self.servers.clear();
        self.scanners.clear();
        self.advertisers.clear();
    }

    fn handle_request(&mut self, request: GattRequest) {
        use GattRequest::*;
        match request {
            Connect {
                app_uuid,
                addr,
                reply,
            } => self.connect(app_uuid, addr, reply),
            Disconnect {
                app_uuid,
                addr,
                reply,
            } => self.disconnect(app_uuid, addr, reply),
            Discover { app_uuid, reply } => self.discover(app_uuid, reply),
            ReadRemoteRssi {
                client_if,
                addr,
                reply,
            } => self.read_remote_rssi(client_if, addr, reply),
            RegisterNotifications {
                app_uuid,
                handle,
                reply,
            } => self.register_notifications(app_uuid, handle, reply),
            DeregisterNotifications {
                app_uuid,
                handle,
                reply,
            } => self.deregister_notifications(app_uuid, handle, reply),
            Read {
                kind,
                app_uuid,
                handle,
                reply,
            } => self.read_attribute(kind, app_uuid, handle, reply),
            Write {
                kind,
                app_uuid,
                handle,
                write_type,
                value,
                reply,
            } => self.write_attribute(kind, app_uuid, handle, write_type, value, reply),
            UnregisterClient { client_if, reply } => self.unregister_client(client_if, reply),
            StartLeScan {
                service_uuids,
                reply,
            } => self.start_le_scan(service_uuids, reply),
            StopLeScan { scan_uuid, reply } => self.stop_le_scan(scan_uuid, reply),
            StartAdvertising {
                app_uuid,
                data,
                scan_response,
                reply,
            } => self.start_advertising(app_uuid, data, scan_response, reply),
            StopAdvertising { app_uuid, reply } => self.stop_advertising(app_uuid, reply),
            RegisterServer { app_uuid, reply } => self.register_server(app_uuid, reply),
            ConnectPeripheral {
                app_uuid,
                addr,
                reply,
            } => self.connect_peripheral(app_uuid, addr, reply),
            DisconnectPeripheral {
                app_uuid,
                addr,
                reply,
            } => self.disconnect_peripheral(app_uuid, addr, reply),
            UnregisterServer { server_if, reply } => self.unregister_server(server_if, reply),
            AddService {
                app_uuid,
                db,
                reply,
            } => self.add_service(app_uuid, db, reply),
            StopService {
                app_uuid,
                service_handle,
                reply,
            } => self.stop_service(app_uuid, service_handle, reply),
            RemoveService {
                app_uuid,
                service_handle,
                reply,
            } => self.remove_service(app_uuid, service_handle, reply),
            SendResponse {
                app_uuid,
                addr,
                status,
                request_id,
                response,
                reply,
            } => self.send_response(app_uuid, addr, status, request_id, response, reply),
            SendIndication {
                app_uuid,
                addr,
                handle,
                confirm,
                value,
                reply,
            } => self.send_indication(app_uuid, addr, handle, confirm, value, reply),
        }
    }

    fn handle_notification(&mut self, notification: GattNotification) {
        use GattNotification::*;
        match notification {
            RegisterClient(e) => self.on_register_client(e),
            Connect(e) => self.on_connect(e),
            Disconnect(e) => self.on_disconnect(e),
            SearchComplete(e) => self.on_search_complete(e),
            Notify(e) => self.on_notify(e),
            ReadCharacteristic(e) => self.on_read(AttrKind::Characteristic, e),
            WriteCharacteristic(e) => self.on_write(AttrKind::Characteristic, e),
            ReadDescriptor(e) => self.on_read(AttrKind::Descriptor, e),
            WriteDescriptor(e) => self.on_write(AttrKind::Descriptor, e),
            ReadRemoteRssi(e) => self.on_read_remote_rssi(e),
            GetGattDb(e) => self.on_gatt_db(e),
            RegisterServer(e) => self.on_register_server(e),
            Connection(e) => self.on_connection(e),
            ServiceAdded(e) => self.on_service_added(e),
            ServiceStopped(e) => self.on_service_stopped(e),
            ServiceDeleted(e) => self.on_service_deleted(e),
            RequestRead(e) => self.on_request_read(e),
            RequestWrite(e) => self.on_request_write(e),
            RegisterScanner(e) => self.on_register_scanner(e),
            ScanResult(e) => self.on_scan_result(e),
            RegisterAdvertiser(e) => self.on_register_advertiser(e),
            // Resolved on command success; these carry nothing the
            // manager still needs
            RegisterForNotification(_) | ExecuteWrite(_) | StartAdvertising(_) => {
                debug!("ignoring informational GATT notification")
            }
        }
    }

    fn handle_completion(
        &mut self,
        key: RecordKey,
        op: Op,
        result: Result<GattReply, BluetoothStatus>,
    ) {
        match op {
            Op::RegisterClient
            | Op::UnregisterClient
            | Op::Connect
            | Op::Disconnect
            | Op::SearchService
            | Op::GetGattDb
            | Op::ReadRemoteRssi
            | Op::RegisterNotification
            | Op::DeregisterNotification
            | Op::Read(_)
            | Op::Write(_) => self.client_completed(key, op, result),
            Op::RegisterScanner | Op::Scan { .. } | Op::UnregisterScanner => {
                self.scanner_completed(key, op, result)
            }
            Op::RegisterAdvertiser | Op::StartAdvertising | Op::UnregisterAdvertiser => {
                self.advertiser_completed(key, op, result)
            }
            Op::DeviceType {
                addr,
                rssi,
                adv_data,
            } => self.device_type_completed(addr, rssi, adv_data, result),
            Op::RegisterServer
            | Op::UnregisterServer
            | Op::ServerConnect
            | Op::ServerDisconnect
            | Op::AddService
            | Op::StopService
            | Op::DeleteService
            | Op::SendResponse
            | Op::SendIndication
            | Op::AutoResponse => self.server_completed(key, op, result),
        }
    }
}
