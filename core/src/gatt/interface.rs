// GATT interface: caller façade over the module and transport
//
// A command that cannot be packed or handed to the transport is failed
// through the same result handler a daemon error would use, so callers see
// a single completion path.

use super::command::GattCommand;
use super::module::GattModule;
use super::notification::GattNotificationHandler;
use super::types::{
    AdvertiseData, AdvertisingParams, AttHandle, GattAuthReq, GattDbElement, GattResponse,
    GattStatus, GattWriteType,
};
use super::GattReply;
use crate::daemon::{ReplyHandler, ResultHandler, Transport};
use crate::error::BridgeError;
use crate::types::{BdAddr, LinkTransport};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

type Handler = ResultHandler<GattReply>;

#[derive(Clone)]
pub struct GattInterface {
    module: Arc<GattModule>,
    transport: Arc<dyn Transport>,
}

impl GattInterface {
    pub fn new(module: Arc<GattModule>, transport: Arc<dyn Transport>) -> Self {
        Self { module, transport }
    }

    pub fn module(&self) -> &Arc<GattModule> {
        &self.module
    }

    /// Install the receiver of asynchronous GATT events
    pub fn init(&self, handler: Arc<dyn GattNotificationHandler>) {
        self.module.set_notification_handler(handler);
    }

    pub fn cleanup(&self) {
        self.module.clear_notification_handler();
    }

    /// Pack `command` and submit it; local failures complete `handler`
    pub fn send(&self, command: GattCommand, handler: Handler) {
        let pdu = match self.module.build(&command) {
            Ok(pdu) => pdu,
            Err(e) => {
                warn!(opcode = ?command.opcode(), "failed to pack GATT command: {}", e);
                handler.fail(BridgeError::from(e).status());
                return;
            }
        };
        if let Err(rejected) = self.transport.send(pdu, ReplyHandler::Gatt(handler)) {
            warn!(opcode = ?command.opcode(), "failed to send GATT command: {}", rejected.error);
            rejected.fail_handler();
        }
    }

    // Client

    pub fn register_client(&self, app_uuid: Uuid, handler: Handler) {
        self.send(GattCommand::ClientRegisterClient { app_uuid }, handler)
    }

    pub fn unregister_client(&self, client_if: i32, handler: Handler) {
        self.send(GattCommand::ClientUnregisterClient { client_if }, handler)
    }

    pub fn connect(
        &self,
        client_if: i32,
        addr: BdAddr,
        is_direct: bool,
        transport: LinkTransport,
        handler: Handler,
    ) {
        self.send(
            GattCommand::ClientConnect {
                client_if,
                addr,
                is_direct,
                transport,
            },
            handler,
        )
    }

    pub fn disconnect(&self, client_if: i32, addr: BdAddr, conn_id: i32, handler: Handler) {
        self.send(
            GattCommand::ClientDisconnect {
                client_if,
                addr,
                conn_id,
            },
            handler,
        )
    }

    /// Clear the daemon's attribute cache for a device
    pub fn refresh(&self, client_if: i32, addr: BdAddr, handler: Handler) {
        self.send(GattCommand::ClientRefresh { client_if, addr }, handler)
    }

    pub fn search_service(&self, conn_id: i32, filter: Option<Uuid>, handler: Handler) {
        self.send(GattCommand::ClientSearchService { conn_id, filter }, handler)
    }

    pub fn read_characteristic(
        &self,
        conn_id: i32,
        handle: AttHandle,
        auth_req: GattAuthReq,
        handler: Handler,
    ) {
        self.send(
            GattCommand::ClientReadCharacteristic {
                conn_id,
                handle,
                auth_req,
            },
            handler,
        )
    }

    pub fn write_characteristic(
        &self,
        conn_id: i32,
        handle: AttHandle,
        write_type: GattWriteType,
        auth_req: GattAuthReq,
        value: Vec<u8>,
        handler: Handler,
    ) {
        self.send(
            GattCommand::ClientWriteCharacteristic {
                conn_id,
                handle,
                write_type,
                auth_req,
                value,
            },
            handler,
        )
    }

    pub fn read_descriptor(
        &self,
        conn_id: i32,
        handle: AttHandle,
        auth_req: GattAuthReq,
        handler: Handler,
    ) {
        self.send(
            GattCommand::ClientReadDescriptor {
                conn_id,
                handle,
                auth_req,
            },
            handler,
        )
    }

    pub fn write_descriptor(
        &self,
        conn_id: i32,
        handle: AttHandle,
        write_type: GattWriteType,
        auth_req: GattAuthReq,
        value: Vec<u8>,
        handler: Handler,
    ) {
        self.send(
            GattCommand::ClientWriteDescriptor {
                conn_id,
                handle,
                write_type,
                auth_req,
                value,
            },
            handler,
        )
    }

    pub fn execute_write(&self, conn_id: i32, execute: bool, handler: Handler) {
        self.send(GattCommand::ClientExecuteWrite { conn_id, execute }, handler)
    }

    pub fn register_notification(
        &self,
        client_if: i32,
        addr: BdAddr,
        handle: AttHandle,
        handler: Handler,
    ) {
        self.send(
            GattCommand::ClientRegisterForNotification {
                client_if,
                addr,
                handle,
            },
            handler,
        )
    }

    pub fn deregister_notification(
        &self,
        client_if: i32,
        addr: BdAddr,
        handle: AttHandle,
        handler: Handler,
    ) {
        self.send(
            GattCommand::ClientDeregisterForNotification {
                client_if,
                addr,
                handle,
            },
            handler,
        )
    }

    pub fn read_remote_rssi(&self, client_if: i32, addr: BdAddr, handler: Handler) {
        self.send(GattCommand::ClientReadRemoteRssi { client_if, addr }, handler)
    }

    pub fn get_device_type(&self, addr: BdAddr, handler: Handler) {
        self.send(GattCommand::ClientGetDeviceType { addr }, handler)
    }

    pub fn test_command(&self, command: i32, addr: BdAddr, params: [u16; 5], handler: Handler) {
        self.send(
            GattCommand::ClientTestCommand {
                command,
                addr,
                params,
            },
            handler,
        )
    }

    pub fn get_gatt_db(&self, conn_id: i32, handler: Handler) {
        self.send(GattCommand::ClientGetGattDb { conn_id }, handler)
    }

    // Scanner

    pub fn register_scanner(&self, app_uuid: Uuid, handler: Handler) {
        self.send(GattCommand::ScannerRegisterScanner { app_uuid }, handler)
    }

    pub fn unregister_scanner(&self, scanner_id: u8, handler: Handler) {
        self.send(GattCommand::ScannerUnregister { scanner_id }, handler)
    }

    pub fn scan(&self, start: bool, handler: Handler) {
        self.send(GattCommand::ScannerScan { start }, handler)
    }

    // Advertiser

    pub fn register_advertiser(&self, app_uuid: Uuid, handler: Handler) {
        self.send(GattCommand::AdvertiserRegisterAdvertiser { app_uuid }, handler)
    }

    pub fn unregister_advertiser(&self, advertiser_id: u8, handler: Handler) {
        self.send(GattCommand::AdvertiserUnregister { advertiser_id }, handler)
    }

    pub fn start_advertising(
        &self,
        advertiser_id: u8,
        params: AdvertisingParams,
        data: AdvertiseData,
        scan_response: AdvertiseData,
        handler: Handler,
    ) {
        self.send(
            GattCommand::AdvertiserStartAdvertising {
                advertiser_id,
                params,
                data,
                scan_response,
            },
            handler,
        )
    }

    // Server

    pub fn register_server(&self, app_uuid: Uuid, handler: Handler) {
        self.send(GattCommand::ServerRegisterServer { app_uuid }, handler)
    }

    pub fn unregister_server(&self, server_if: i32, handler: Handler) {
        self.send(GattCommand::ServerUnregisterServer { server_if }, handler)
    }

    pub fn connect_peripheral(
        &self,
        server_if: i32,
        addr: BdAddr,
        is_direct: bool,
        transport: LinkTransport,
        handler: Handler,
    ) {
        self.send(
            GattCommand::ServerConnect {
                server_if,
                addr,
                is_direct,
                transport,
            },
            handler,
        )
    }

    pub fn disconnect_peripheral(
        &self,
        server_if: i32,
        addr: BdAddr,
        conn_id: i32,
        handler: Handler,
    ) {
        self.send(
            GattCommand::ServerDisconnect {
                server_if,
                addr,
                conn_id,
            },
            handler,
        )
    }

    pub fn add_service(&self, server_if: i32, db: Vec<GattDbElement>, handler: Handler) {
        self.send(GattCommand::ServerAddService { server_if, db }, handler)
    }

    pub fn stop_service(&self, server_if: i32, service_handle: AttHandle, handler: Handler) {
        self.send(
            GattCommand::ServerStopService {
                server_if,
                service_handle,
            },
            handler,
        )
    }

    pub fn delete_service(&self, server_if: i32, service_handle: AttHandle, handler: Handler) {
        self.send(
            GattCommand::ServerDeleteService {
                server_if,
                service_handle,
            },
            handler,
        )
    }

    pub fn send_indication(
        &self,
        server_if: i32,
        handle: AttHandle,
        conn_id: i32,
        confirm: bool,
        value: Vec<u8>,
        handler: Handler,
    ) {
        self.send(
            GattCommand::ServerSendIndication {
                server_if,
                handle,
                conn_id,
                confirm,
                value,
            },
            handler,
        )
    }

    pub fn send_response(
        &self,
        conn_id: i32,
        trans_id: i32,
        status: GattStatus,
        response: GattResponse,
        handler: Handler,
    ) {
        self.send(
            GattCommand::ServerSendResponse {
                conn_id,
                trans_id,
                status,
                response,
            },
            handler,
        )
    }
}
