// GATT server operations
//
// A server may have several peers at once, so it keeps an address to
// connection-id map. The id for an address is only known once the daemon's
// Connection notification arrives; until then the entry holds 0.

use super::state::{respond, respond_opt, AddServiceState, Reply, ServerRecord};
use super::{take_key, Context, GattEvent, GattManager, GattManagerError, Op, RecordKey};
use crate::gatt::notification::{
    ConnectionEvent, RegisterServerEvent, RequestReadEvent, RequestWriteEvent, ServiceAddedEvent,
    ServiceHandleEvent,
};
use crate::gatt::types::{AttHandle, GattDbElement, GattResponse, GattStatus};
use crate::gatt::GattReply;
use crate::types::{BdAddr, BluetoothStatus, LinkTransport};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

type Servers = HashMap<Uuid, ServerRecord>;

fn by_if(servers: &mut Servers, server_if: i32) -> Option<&mut ServerRecord> {
    if server_if == 0 {
        return None;
    }
    servers.values_mut().find(|s| s.server_if == server_if)
}

fn by_conn(servers: &mut Servers, conn_id: i32) -> Option<&mut ServerRecord> {
    if conn_id == 0 {
        return None;
    }
    servers
        .values_mut()
        .find(|s| s.connections.values().any(|&id| id == conn_id))
}

fn by_key(servers: &mut Servers, key: RecordKey) -> Option<&mut ServerRecord> {
    servers.values_mut().find(|s| s.key == key)
}

/// Take a pending peer request if it is waiting on `addr`
fn take_for(slot: &mut Option<(BdAddr, Reply<()>)>, addr: &BdAddr) -> Option<Reply<()>> {
    match slot {
        Some((pending, _)) if pending == addr => slot.take().map(|(_, reply)| reply),
        _ => None,
    }
}

fn start_registration(ctx: &Context, server: &mut ServerRecord) {
    debug!(app_uuid = %server.app_uuid, "registering server");
    server.registering = true;
    ctx.interface.register_server(
        server.app_uuid,
        ctx.completion(server.key, Op::RegisterServer),
    );
}

fn send_connect(ctx: &Context, server: &ServerRecord, addr: BdAddr) {
    ctx.interface.connect_peripheral(
        server.server_if,
        addr,
        true,
        LinkTransport::Auto,
        ctx.completion(server.key, Op::ServerConnect),
    );
}

fn send_add_service(ctx: &Context, server: &ServerRecord, db: Vec<GattDbElement>) {
    ctx.interface.add_service(
        server.server_if,
        db,
        ctx.completion(server.key, Op::AddService),
    );
}

/// Reject a request the daemon cannot serve without bothering the caller
fn reject_request(ctx: &Context, server: &ServerRecord, conn_id: i32, trans_id: i32) {
    ctx.interface.send_response(
        conn_id,
        trans_id,
        GattStatus::REQUEST_NOT_SUPPORTED,
        GattResponse::default(),
        ctx.completion(server.key, Op::AutoResponse),
    );
}

fn status_result(status: GattStatus) -> Result<(), GattManagerError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(GattManagerError::Gatt(status))
    }
}

fn command_result(status: Option<BluetoothStatus>) -> Result<(), GattManagerError> {
    status.map_or(Ok(()), |s| Err(GattManagerError::Daemon(s)))
}

impl GattManager {
    /// Remove a server whose registration failed, rejecting everything that
    /// was waiting on it
    fn server_registration_failed(&mut self, app_uuid: Uuid) {
        if let Some(mut server) = self.servers.remove(&app_uuid) {
            warn!(%app_uuid, "server registration failed");
            server.fail_pending(GattManagerError::RegistrationFailed);
        }
    }

    pub(super) fn register_server(&mut self, app_uuid: Uuid, reply: Reply<()>) {
        let next_key = &mut self.next_key;
        let server = self
            .servers
            .entry(app_uuid)
            .or_insert_with(|| ServerRecord::new(take_key(next_key), app_uuid));

        if server.is_registered() {
            return respond(reply, Ok(()));
        }
        if server.register.is_some() {
            return respond(reply, Err(GattManagerError::Busy));
        }

        server.register = Some(reply);
        if !server.registering {
            start_registration(&self.ctx, server);
        }
    }

    pub(super) fn connect_peripheral(&mut self, app_uuid: Uuid, addr: BdAddr, reply: Reply<()>) {
        let next_key = &mut self.next_key;
        let server = self
            .servers
            .entry(app_uuid)
            .or_insert_with(|| ServerRecord::new(take_key(next_key), app_uuid));

        if server.connect.is_some() || server.disconnect.is_some() {
            return respond(reply, Err(GattManagerError::Busy));
        }
        if server.conn_id(&addr).is_some_and(|id| id > 0) {
            return respond(reply, Ok(()));
        }

        server.connections.insert(addr, 0);
        server.connect = Some((addr, reply));

        if server.is_registered() {
            send_connect(&self.ctx, server, addr);
        } else if !server.registering {
            start_registration(&self.ctx, server);
        }
    }

    pub(super) fn disconnect_peripheral(
        &mut self,
        app_uuid: Uuid,
        addr: BdAddr,
        reply: Reply<()>,
    ) {
        let Some(server) = self.servers.get_mut(&app_uuid) else {
            return respond(reply, Err(GattManagerError::InvalidParameter));
        };
        if !server.is_registered() {
            return respond(reply, Err(GattManagerError::NotReady));
        }
        if server.connect.is_some() || server.disconnect.is_some() {
            return respond(reply, Err(GattManagerError::Busy));
        }
        let Some(conn_id) = server.conn_id(&addr) else {
            return respond(reply, Ok(()));
        };

        server.disconnect = Some((addr, reply));
        self.ctx.interface.disconnect_peripheral(
            server.server_if,
            addr,
            conn_id,
            self.ctx.completion(server.key, Op::ServerDisconnect),
        );
    }

    pub(super) fn unregister_server(&mut self, server_if: i32, reply: Reply<()>) {
        let Some(server) = by_if(&mut self.servers, server_if) else {
            debug!(server_if, "unregister of unknown server");
            return respond(reply, Ok(()));
        };
        if server.unregister.is_some() {
            return respond(reply, Err(GattManagerError::Busy));
        }

        server.unregister = Some(reply);
        self.ctx.interface.unregister_server(
            server_if,
            self.ctx.completion(server.key, Op::UnregisterServer),
        );
    }

    pub(super) fn add_service(&mut self, app_uuid: Uuid, db: Vec<GattDbElement>, reply: Reply<()>) {
        let next_key = &mut self.next_key;
        let server = self
            .servers
            .entry(app_uuid)
            .or_insert_with(|| ServerRecord::new(take_key(next_key), app_uuid));

        if server.add_service.is_some() {
            return respond(reply, Err(GattManagerError::Busy));
        }

        if server.is_registered() {
            server.add_service = Some(AddServiceState { reply, db: None });
            send_add_service(&self.ctx, server, db);
        } else {
            server.add_service = Some(AddServiceState {
                reply,
                db: Some(db),
            });
            if !server.registering {
                start_registration(&self.ctx, server);
            }
        }
    }

    fn service_command(
        &mut self,
        app_uuid: Uuid,
        service_handle: AttHandle,
        delete: bool,
        reply: Reply<()>,
    ) {
        let Some(server) = self.servers.get_mut(&app_uuid) else {
            return respond(reply, Err(GattManagerError::InvalidParameter));
        };
        if !server.is_registered() {
            return respond(reply, Err(GattManagerError::NotReady));
        }
        let slot = if delete {
            &mut server.delete_service
        } else {
            &mut server.stop_service
        };
        if slot.is_some() {
            return respond(reply, Err(GattManagerError::Busy));
        }
        *slot = Some(reply);

        let ctx = &self.ctx;
        if delete {
            ctx.interface.delete_service(
                server.server_if,
                service_handle,
                ctx.completion(server.key, Op::DeleteService),
            );
        } else {
            ctx.interface.stop_service(
                server.server_if,
                service_handle,
                ctx.completion(server.key, Op::StopService),
            );
        }
    }

    pub(super) fn stop_service(&mut self, app_uuid: Uuid, service_handle: AttHandle, reply: Reply<()>) {
        self.service_command(app_uuid, service_handle, false, reply)
    }

    pub(super) fn remove_service(
        &mut self,
        app_uuid: Uuid,
        service_handle: AttHandle,
        reply: Reply<()>,
    ) {
        self.service_command(app_uuid, service_handle, true, reply)
    }

    pub(super) fn send_response(
        &mut self,
        app_uuid: Uuid,
        addr: BdAddr,
        status: GattStatus,
        request_id: i32,
        response: GattResponse,
        reply: Reply<()>,
    ) {
        let Some(server) = self.servers.get_mut(&app_uuid) else {
            return respond(reply, Err(GattManagerError::NotReady));
        };
        let Some(conn_id) = server.conn_id(&addr) else {
            return respond(reply, Err(GattManagerError::NotReady));
        };
        if server.send_response.is_some() {
            return respond(reply, Err(GattManagerError::Busy));
        }

        server.send_response = Some(reply);
        self.ctx.interface.send_response(
            conn_id,
            request_id,
            status,
            response,
            self.ctx.completion(server.key, Op::SendResponse),
        );
    }

    pub(super) fn send_indication(
        &mut self,
        app_uuid: Uuid,
        addr: BdAddr,
        handle: AttHandle,
        confirm: bool,
        value: Vec<u8>,
        reply: Reply<()>,
    ) {
        let server = match self.servers.get_mut(&app_uuid) {
            Some(server) if server.is_registered() => server,
            _ => return respond(reply, Err(GattManagerError::NotReady)),
        };
        if server.send_indication.is_some() {
            return respond(reply, Err(GattManagerError::Busy));
        }
        let conn_id = match server.conn_id(&addr) {
            None => return respond(reply, Err(GattManagerError::InvalidParameter)),
            Some(0) => return respond(reply, Err(GattManagerError::NotReady)),
            Some(id) => id,
        };

        server.send_indication = Some(reply);
        self.ctx.interface.send_indication(
            server.server_if,
            handle,
            conn_id,
            confirm,
            value,
            self.ctx.completion(server.key, Op::SendIndication),
        );
    }

    pub(super) fn on_register_server(&mut self, event: RegisterServerEvent) {
        let ctx = &self.ctx;
        let Some(server) = self.servers.get_mut(&event.app_uuid) else {
            debug!(app_uuid = %event.app_uuid, "server registration for unknown app");
            return;
        };
        if !server.registering {
            return;
        }
        server.registering = false;

        if !event.status.is_success() {
            self.server_registration_failed(event.app_uuid);
            return;
        }

        info!(app_uuid = %event.app_uuid, server_if = event.server_if, "server registered");
        server.server_if = event.server_if;
        ctx.emit(GattEvent::ServerRegistered {
            app_uuid: server.app_uuid,
            server_if: server.server_if,
        });

        // Replay what was deferred behind registration
        if let Some((addr, _)) = &server.connect {
            send_connect(ctx, server, *addr);
        }
        if let Some(db) = server.add_service.as_mut().and_then(|state| state.db.take()) {
            send_add_service(ctx, server, db);
        }
        respond_opt(server.register.take(), Ok(()));
    }

    pub(super) fn on_connection(&mut self, event: ConnectionEvent) {
        let ctx = &self.ctx;
        let Some(server) = by_if(&mut self.servers, event.server_if) else {
            return;
        };

        if event.connected {
            info!(server_if = event.server_if, conn_id = event.conn_id, addr = %event.addr, "peer connected");
            server.connections.insert(event.addr, event.conn_id);
        } else {
            info!(server_if = event.server_if, addr = %event.addr, "peer disconnected");
            server.connections.remove(&event.addr);
        }
        ctx.emit(GattEvent::ServerConnectionChanged {
            app_uuid: server.app_uuid,
            addr: event.addr,
            connected: event.connected,
        });

        // Only the peer a request is waiting on may settle it
        if let Some(reply) = take_for(&mut server.connect, &event.addr) {
            let result = if event.connected {
                Ok(())
            } else {
                Err(GattManagerError::Failed("connect peripheral failed".into()))
            };
            respond(reply, result);
        } else if let Some(reply) = take_for(&mut server.disconnect, &event.addr) {
            let result = if event.connected {
                Err(GattManagerError::Failed("disconnect peripheral failed".into()))
            } else {
                Ok(())
            };
            respond(reply, result);
        }
    }

    pub(super) fn on_service_added(&mut self, event: ServiceAddedEvent) {
        let ctx = &self.ctx;
        let Some(server) = by_if(&mut self.servers, event.server_if) else {
            return;
        };
        let Some(state) = server.add_service.take() else {
            return;
        };

        if event.status.is_success() {
            ctx.emit(GattEvent::ServerServiceUpdated {
                app_uuid: server.app_uuid,
                db: event.db,
            });
        }
        respond(state.reply, status_result(event.status));
    }

    pub(super) fn on_service_stopped(&mut self, event: ServiceHandleEvent) {
        if let Some(server) = by_if(&mut self.servers, event.server_if) {
            respond_opt(server.stop_service.take(), status_result(event.status));
        }
    }

    pub(super) fn on_service_deleted(&mut self, event: ServiceHandleEvent) {
        if let Some(server) = by_if(&mut self.servers, event.server_if) {
            respond_opt(server.delete_service.take(), status_result(event.status));
        }
    }

    pub(super) fn on_request_read(&mut self, event: RequestReadEvent) {
        let ctx = &self.ctx;
        let Some(server) = by_conn(&mut self.servers, event.conn_id) else {
            return;
        };

        if event.is_long || event.offset > 0 {
            debug!(conn_id = event.conn_id, "rejecting long attribute read");
            reject_request(ctx, server, event.conn_id, event.trans_id);
            return;
        }
        ctx.emit(GattEvent::ReadRequested {
            app_uuid: server.app_uuid,
            addr: event.addr,
            request_id: event.trans_id,
            handle: event.handle,
        });
    }

    pub(super) fn on_request_write(&mut self, event: RequestWriteEvent) {
        let ctx = &self.ctx;
        let Some(server) = by_conn(&mut self.servers, event.conn_id) else {
            return;
        };

        if event.is_prepare || event.offset > 0 {
            debug!(conn_id = event.conn_id, "rejecting prepared or long attribute write");
            if event.need_response {
                reject_request(ctx, server, event.conn_id, event.trans_id);
            }
            return;
        }
        ctx.emit(GattEvent::WriteRequested {
            app_uuid: server.app_uuid,
            addr: event.addr,
            request_id: event.trans_id,
            handle: event.handle,
            value: event.value,
            need_response: event.need_response,
        });
    }

    pub(super) fn server_completed(
        &mut self,
        key: RecordKey,
        op: Op,
        result: Result<GattReply, BluetoothStatus>,
    ) {
        let ctx = &self.ctx;
        let Some(server) = by_key(&mut self.servers, key) else {
            debug!(key, ?op, "completion for removed server");
            return;
        };
        let app_uuid = server.app_uuid;
        let status = result.err();

        match (op, status) {
            (Op::RegisterServer, Some(status)) => {
                warn!(%app_uuid, %status, "register server command failed");
                self.server_registration_failed(app_uuid);
            }
            (Op::ServerConnect, Some(status)) => {
                if let Some((addr, reply)) = server.connect.take() {
                    if server.conn_id(&addr) == Some(0) {
                        server.connections.remove(&addr);
                    }
                    respond(reply, Err(GattManagerError::Daemon(status)));
                }
            }
            (Op::ServerDisconnect, Some(status)) => {
                if let Some((_, reply)) = server.disconnect.take() {
                    respond(reply, Err(GattManagerError::Daemon(status)));
                }
            }
            (Op::AddService, Some(status)) => {
                if let Some(state) = server.add_service.take() {
                    respond(state.reply, Err(GattManagerError::Daemon(status)));
                }
            }
            (Op::StopService, Some(status)) => {
                respond_opt(server.stop_service.take(), Err(GattManagerError::Daemon(status)));
            }
            (Op::DeleteService, Some(status)) => {
                respond_opt(server.delete_service.take(), Err(GattManagerError::Daemon(status)));
            }
            (Op::SendResponse, status) => {
                respond_opt(server.send_response.take(), command_result(status));
            }
            (Op::SendIndication, status) => {
                respond_opt(server.send_indication.take(), command_result(status));
            }
            (Op::AutoResponse, Some(status)) => {
                warn!(%app_uuid, %status, "automatic error response failed");
            }
            (Op::UnregisterServer, None) => {
                info!(%app_uuid, server_if = server.server_if, "server unregistered");
                let reply = server.unregister.take();
                server.fail_pending(GattManagerError::Failed("server unregistered".into()));
                self.servers.remove(&app_uuid);
                ctx.emit(GattEvent::ServerUnregistered { app_uuid });
                respond_opt(reply, Ok(()));
            }
            (Op::UnregisterServer, Some(status)) => {
                respond_opt(server.unregister.take(), Err(GattManagerError::Daemon(status)));
            }
            (_, None) => {}
            (op, Some(status)) => debug!(?op, %status, "unexpected server completion"),
        }
    }
}
