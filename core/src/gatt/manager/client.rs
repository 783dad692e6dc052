// GATT client operations
//
// A client is registered lazily by its first connect. It holds at most one
// connection, and every dependent operation is addressed by the daemon's
// connection id once that connection exists.

use super::state::{respond, respond_opt, AttrKind, ClientRecord, ReadState, Reply, WriteState};
use super::{take_key, Context, GattEvent, GattManager, GattManagerError, Op, RecordKey};
use crate::gatt::notification::{
    ConnectEvent, GattDbEvent, NotifyEvent, ReadEvent, ReadRemoteRssiEvent, RegisterClientEvent,
    SearchCompleteEvent, WriteEvent,
};
use crate::gatt::types::{AttHandle, GattAuthReq, GattDbElement, GattWriteType};
use crate::gatt::GattReply;
use crate::types::{BdAddr, BluetoothStatus, LinkTransport};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

type Clients = HashMap<Uuid, ClientRecord>;

fn by_if(clients: &mut Clients, client_if: i32) -> Option<&mut ClientRecord> {
    if client_if == 0 {
        return None;
    }
    clients.values_mut().find(|c| c.client_if == client_if)
}

fn by_conn(clients: &mut Clients, conn_id: i32) -> Option<&mut ClientRecord> {
    if conn_id == 0 {
        return None;
    }
    clients.values_mut().find(|c| c.conn_id == conn_id)
}

fn by_key(clients: &mut Clients, key: RecordKey) -> Option<&mut ClientRecord> {
    clients.values_mut().find(|c| c.key == key)
}

fn send_connect(ctx: &Context, client: &ClientRecord) {
    ctx.interface.connect(
        client.client_if,
        client.addr,
        true,
        LinkTransport::Auto,
        ctx.completion(client.key, Op::Connect),
    );
}

fn send_read(ctx: &Context, kind: AttrKind, client: &ClientRecord, handle: AttHandle, auth: GattAuthReq) {
    let handler = ctx.completion(client.key, Op::Read(kind));
    match kind {
        AttrKind::Characteristic => {
            ctx.interface
                .read_characteristic(client.conn_id, handle, auth, handler)
        }
        AttrKind::Descriptor => ctx
            .interface
            .read_descriptor(client.conn_id, handle, auth, handler),
    }
}

fn send_write(
    ctx: &Context,
    kind: AttrKind,
    client: &ClientRecord,
    state: &WriteState,
    auth: GattAuthReq,
) {
    let handler = ctx.completion(client.key, Op::Write(kind));
    let value = state.value.clone();
    match kind {
        AttrKind::Characteristic => ctx.interface.write_characteristic(
            client.conn_id,
            state.handle,
            state.write_type,
            auth,
            value,
            handler,
        ),
        AttrKind::Descriptor => ctx.interface.write_descriptor(
            client.conn_id,
            state.handle,
            state.write_type,
            auth,
            value,
            handler,
        ),
    }
}

/// Fail a pending connect and report the link as down
fn connect_failed(ctx: &Context, client: &mut ClientRecord, error: GattManagerError) {
    if let Some(reply) = client.connect.take() {
        ctx.emit(GattEvent::ClientConnectionChanged {
            app_uuid: client.app_uuid,
            addr: client.addr,
            connected: false,
        });
        respond(reply, Err(error));
    }
}

fn discover_failed(ctx: &Context, client: &mut ClientRecord, error: GattManagerError) {
    if let Some(reply) = client.discover.take() {
        ctx.emit(GattEvent::DiscoverCompleted {
            app_uuid: client.app_uuid,
            success: false,
        });
        respond(reply, Err(error));
    }
}

impl GattManager {
    pub(super) fn connect(&mut self, app_uuid: Uuid, addr: BdAddr, reply: Reply<()>) {
        let next_key = &mut self.next_key;
        let client = self
            .clients
            .entry(app_uuid)
            .or_insert_with(|| ClientRecord::new(take_key(next_key), app_uuid));

        if client.connect.is_some() || client.disconnect.is_some() {
            return respond(reply, Err(GattManagerError::Busy));
        }

        client.addr = addr;
        client.connect = Some(reply);

        if client.client_if > 0 {
            send_connect(&self.ctx, client);
        } else if !client.registering {
            debug!(%app_uuid, "registering client before connect");
            client.registering = true;
            self.ctx.interface.register_client(
                app_uuid,
                self.ctx.completion(client.key, Op::RegisterClient),
            );
        }
    }

    pub(super) fn disconnect(&mut self, app_uuid: Uuid, addr: BdAddr, reply: Reply<()>) {
        let Some(client) = self.clients.get_mut(&app_uuid) else {
            return respond(reply, Err(GattManagerError::InvalidParameter));
        };
        if client.connect.is_some() || client.disconnect.is_some() {
            return respond(reply, Err(GattManagerError::Busy));
        }
        if !client.is_connected() {
            return respond(reply, Ok(()));
        }

        client.disconnect = Some(reply);
        self.ctx.interface.disconnect(
            client.client_if,
            addr,
            client.conn_id,
            self.ctx.completion(client.key, Op::Disconnect),
        );
    }

    pub(super) fn discover(&mut self, app_uuid: Uuid, reply: Reply<Vec<GattDbElement>>) {
        let client = match self.clients.get_mut(&app_uuid) {
            Some(client) if client.is_connected() => client,
            _ => return respond(reply, Err(GattManagerError::NotReady)),
        };
        if client.discover.is_some() {
            return respond(reply, Err(GattManagerError::Busy));
        }

        client.discover = Some(reply);
        self.ctx.interface.search_service(
            client.conn_id,
            None,
            self.ctx.completion(client.key, Op::SearchService),
        );
    }

    pub(super) fn read_remote_rssi(&mut self, client_if: i32, addr: BdAddr, reply: Reply<i32>) {
        let Some(client) = by_if(&mut self.clients, client_if) else {
            return respond(reply, Err(GattManagerError::InvalidParameter));
        };
        if client.read_rssi.is_some() {
            return respond(reply, Err(GattManagerError::Busy));
        }

        client.read_rssi = Some(reply);
        self.ctx.interface.read_remote_rssi(
            client_if,
            addr,
            self.ctx.completion(client.key, Op::ReadRemoteRssi),
        );
    }

    pub(super) fn register_notifications(
        &mut self,
        app_uuid: Uuid,
        handle: AttHandle,
        reply: Reply<()>,
    ) {
        let client = match self.clients.get_mut(&app_uuid) {
            Some(client) if client.is_connected() => client,
            _ => return respond(reply, Err(GattManagerError::NotReady)),
        };
        if client.register_notification.is_some() {
            return respond(reply, Err(GattManagerError::Busy));
        }

        client.register_notification = Some(reply);
        self.ctx.interface.register_notification(
            client.client_if,
            client.addr,
            handle,
            self.ctx.completion(client.key, Op::RegisterNotification),
        );
    }

    pub(super) fn deregister_notifications(
        &mut self,
        app_uuid: Uuid,
        handle: AttHandle,
        reply: Reply<()>,
    ) {
        let Some(client) = self.clients.get_mut(&app_uuid) else {
            return respond(reply, Err(GattManagerError::InvalidParameter));
        };
        if client.deregister_notification.is_some() {
            return respond(reply, Err(GattManagerError::Busy));
        }

        client.deregister_notification = Some(reply);
        self.ctx.interface.deregister_notification(
            client.client_if,
            client.addr,
            handle,
            self.ctx.completion(client.key, Op::DeregisterNotification),
        );
    }

    pub(super) fn read_attribute(
        &mut self,
        kind: AttrKind,
        app_uuid: Uuid,
        handle: AttHandle,
        reply: Reply<Vec<u8>>,
    ) {
        let client = match self.clients.get_mut(&app_uuid) {
            Some(client) if client.is_connected() => client,
            _ => return respond(reply, Err(GattManagerError::NotReady)),
        };
        if client.read_slot(kind).is_some() {
            return respond(reply, Err(GattManagerError::Busy));
        }

        *client.read_slot(kind) = Some(ReadState {
            reply,
            handle,
            auth_retried: false,
        });
        send_read(&self.ctx, kind, client, handle, GattAuthReq::None);
    }

    pub(super) fn write_attribute(
        &mut self,
        kind: AttrKind,
        app_uuid: Uuid,
        handle: AttHandle,
        write_type: GattWriteType,
        value: Vec<u8>,
        reply: Reply<()>,
    ) {
        let client = match self.clients.get_mut(&app_uuid) {
            Some(client) if client.is_connected() => client,
            _ => return respond(reply, Err(GattManagerError::NotReady)),
        };
        if client.write_slot(kind).is_some() {
            return respond(reply, Err(GattManagerError::Busy));
        }

        let state = WriteState {
            reply,
            handle,
            write_type,
            value,
            auth_retried: false,
        };
        send_write(&self.ctx, kind, client, &state, GattAuthReq::None);
        *client.write_slot(kind) = Some(state);
    }

    pub(super) fn unregister_client(&mut self, client_if: i32, reply: Reply<()>) {
        let Some(client) = by_if(&mut self.clients, client_if) else {
            debug!(client_if, "unregister of unknown client");
            return respond(reply, Ok(()));
        };
        if client.unregister.is_some() {
            return respond(reply, Err(GattManagerError::Busy));
        }

        client.unregister = Some(reply);
        self.ctx.interface.unregister_client(
            client_if,
            self.ctx.completion(client.key, Op::UnregisterClient),
        );
    }

    pub(super) fn on_register_client(&mut self, event: RegisterClientEvent) {
        let ctx = &self.ctx;
        let Some(client) = self.clients.get_mut(&event.app_uuid) else {
            debug!(app_uuid = %event.app_uuid, "client registration for unknown app");
            return;
        };
        if !client.registering {
            return;
        }
        client.registering = false;

        if !event.status.is_success() {
            warn!(app_uuid = %event.app_uuid, status = %event.status, "client registration failed");
            connect_failed(ctx, client, GattManagerError::RegistrationFailed);
            client.fail_pending(GattManagerError::RegistrationFailed);
            self.clients.remove(&event.app_uuid);
            return;
        }

        info!(app_uuid = %event.app_uuid, client_if = event.client_if, "client registered");
        client.client_if = event.client_if;
        ctx.emit(GattEvent::ClientRegistered {
            app_uuid: client.app_uuid,
            client_if: client.client_if,
        });
        if client.connect.is_some() {
            send_connect(ctx, client);
        }
    }

    pub(super) fn on_connect(&mut self, event: ConnectEvent) {
        let ctx = &self.ctx;
        let Some(client) = by_if(&mut self.clients, event.client_if) else {
            return;
        };

        if event.status.is_success() {
            info!(client_if = event.client_if, conn_id = event.conn_id, addr = %event.addr, "client connected");
            client.conn_id = event.conn_id;
            client.addr = event.addr;
            ctx.emit(GattEvent::ClientConnectionChanged {
                app_uuid: client.app_uuid,
                addr: event.addr,
                connected: true,
            });
            respond_opt(client.connect.take(), Ok(()));
        } else {
            connect_failed(ctx, client, GattManagerError::Gatt(event.status));
        }
    }

    pub(super) fn on_disconnect(&mut self, event: ConnectEvent) {
        let ctx = &self.ctx;
        let Some(client) = by_if(&mut self.clients, event.client_if) else {
            return;
        };

        if event.status.is_success() {
            info!(client_if = event.client_if, addr = %event.addr, "client disconnected");
            client.conn_id = 0;
            client.fail_link_ops(GattManagerError::NotReady);
            ctx.emit(GattEvent::ClientConnectionChanged {
                app_uuid: client.app_uuid,
                addr: event.addr,
                connected: false,
            });
            respond_opt(client.disconnect.take(), Ok(()));
        } else {
            // The link is still up
            ctx.emit(GattEvent::ClientConnectionChanged {
                app_uuid: client.app_uuid,
                addr: event.addr,
                connected: true,
            });
            respond_opt(
                client.disconnect.take(),
                Err(GattManagerError::Gatt(event.status)),
            );
        }
    }

    pub(super) fn on_search_complete(&mut self, event: SearchCompleteEvent) {
        let ctx = &self.ctx;
        let Some(client) = by_conn(&mut self.clients, event.conn_id) else {
            return;
        };
        if client.discover.is_none() {
            return;
        }

        if event.status.is_success() {
            ctx.interface
                .get_gatt_db(client.conn_id, ctx.completion(client.key, Op::GetGattDb));
        } else {
            discover_failed(ctx, client, GattManagerError::Gatt(event.status));
        }
    }

    pub(super) fn on_gatt_db(&mut self, event: GattDbEvent) {
        let ctx = &self.ctx;
        let Some(client) = by_conn(&mut self.clients, event.conn_id) else {
            return;
        };
        let Some(reply) = client.discover.take() else {
            return;
        };

        debug!(conn_id = event.conn_id, count = event.db.len(), "services discovered");
        ctx.emit(GattEvent::ServicesDiscovered {
            app_uuid: client.app_uuid,
            db: event.db.clone(),
        });
        ctx.emit(GattEvent::DiscoverCompleted {
            app_uuid: client.app_uuid,
            success: true,
        });
        respond(reply, Ok(event.db));
    }

    pub(super) fn on_notify(&mut self, event: NotifyEvent) {
        let ctx = &self.ctx;
        if let Some(client) = by_conn(&mut self.clients, event.conn_id) {
            ctx.emit(GattEvent::CharacteristicChanged {
                app_uuid: client.app_uuid,
                handle: event.handle,
                value: event.value,
            });
        }
    }

    pub(super) fn on_read(&mut self, kind: AttrKind, event: ReadEvent) {
        let ctx = &self.ctx;
        let Some(client) = by_conn(&mut self.clients, event.conn_id) else {
            return;
        };
        let Some(mut state) = client.read_slot(kind).take() else {
            debug!(conn_id = event.conn_id, ?kind, "read result with no pending read");
            return;
        };

        if event.status.is_success() {
            if kind == AttrKind::Characteristic {
                ctx.emit(GattEvent::CharacteristicChanged {
                    app_uuid: client.app_uuid,
                    handle: event.handle,
                    value: event.value.clone(),
                });
            }
            respond(state.reply, Ok(event.value));
        } else if event.status.needs_authentication() && !state.auth_retried {
            debug!(conn_id = event.conn_id, status = %event.status, "retrying read with MITM protection");
            state.auth_retried = true;
            send_read(ctx, kind, client, state.handle, GattAuthReq::Mitm);
            *client.read_slot(kind) = Some(state);
        } else {
            respond(state.reply, Err(GattManagerError::Gatt(event.status)));
        }
    }

    pub(super) fn on_write(&mut self, kind: AttrKind, event: WriteEvent) {
        let ctx = &self.ctx;
        let Some(client) = by_conn(&mut self.clients, event.conn_id) else {
            return;
        };
        let Some(mut state) = client.write_slot(kind).take() else {
            debug!(conn_id = event.conn_id, ?kind, "write result with no pending write");
            return;
        };

        if event.status.is_success() {
            respond(state.reply, Ok(()));
        } else if event.status.needs_authentication() && !state.auth_retried {
            debug!(conn_id = event.conn_id, status = %event.status, "retrying write with MITM protection");
            state.auth_retried = true;
            send_write(ctx, kind, client, &state, GattAuthReq::Mitm);
            *client.write_slot(kind) = Some(state);
        } else {
            respond(state.reply, Err(GattManagerError::Gatt(event.status)));
        }
    }

    pub(super) fn on_read_remote_rssi(&mut self, event: ReadRemoteRssiEvent) {
        let Some(client) = by_if(&mut self.clients, event.client_if) else {
            return;
        };
        let result = if event.status.is_success() {
            Ok(event.rssi)
        } else {
            Err(GattManagerError::Gatt(event.status))
        };
        respond_opt(client.read_rssi.take(), result);
    }

    pub(super) fn client_completed(
        &mut self,
        key: RecordKey,
        op: Op,
        result: Result<GattReply, BluetoothStatus>,
    ) {
        let ctx = &self.ctx;
        let Some(client) = by_key(&mut self.clients, key) else {
            debug!(key, ?op, "completion for removed client");
            return;
        };
        let app_uuid = client.app_uuid;

        let status = match result {
            Ok(_) => None,
            Err(status) => Some(status),
        };

        match (op, status) {
            (Op::RegisterClient, Some(status)) => {
                warn!(%app_uuid, %status, "register client command failed");
                client.registering = false;
                connect_failed(ctx, client, GattManagerError::RegistrationFailed);
                client.fail_pending(GattManagerError::RegistrationFailed);
                self.clients.remove(&app_uuid);
            }
            (Op::Connect, Some(status)) => {
                connect_failed(ctx, client, GattManagerError::Daemon(status));
            }
            (Op::Disconnect, Some(status)) => {
                respond_opt(client.disconnect.take(), Err(GattManagerError::Daemon(status)));
            }
            (Op::SearchService | Op::GetGattDb, Some(status)) => {
                discover_failed(ctx, client, GattManagerError::Daemon(status));
            }
            (Op::ReadRemoteRssi, Some(status)) => {
                respond_opt(client.read_rssi.take(), Err(GattManagerError::Daemon(status)));
            }
            (Op::RegisterNotification, status) => respond_opt(
                client.register_notification.take(),
                status.map_or(Ok(()), |s| Err(GattManagerError::Daemon(s))),
            ),
            (Op::DeregisterNotification, status) => respond_opt(
                client.deregister_notification.take(),
                status.map_or(Ok(()), |s| Err(GattManagerError::Daemon(s))),
            ),
            (Op::Read(kind), Some(status)) => {
                if let Some(state) = client.read_slot(kind).take() {
                    respond(state.reply, Err(GattManagerError::Daemon(status)));
                }
            }
            (Op::Write(kind), Some(status)) => {
                if let Some(state) = client.write_slot(kind).take() {
                    respond(state.reply, Err(GattManagerError::Daemon(status)));
                }
            }
            (Op::UnregisterClient, None) => {
                info!(%app_uuid, client_if = client.client_if, "client unregistered");
                let reply = client.unregister.take();
                client.fail_pending(GattManagerError::Failed("client unregistered".into()));
                self.clients.remove(&app_uuid);
                ctx.emit(GattEvent::ClientUnregistered { app_uuid });
                respond_opt(reply, Ok(()));
            }
            (Op::UnregisterClient, Some(status)) => {
                respond_opt(client.unregister.take(), Err(GattManagerError::Daemon(status)));
            }
            // Success of a command whose outcome arrives as a notification
            (_, None) => {}
            (op, Some(status)) => debug!(?op, %status, "unexpected client completion"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Harness;
    use super::*;
    use crate::gatt::notification::GattNotification;
    use crate::gatt::types::GattStatus;
    use tokio_test::task;
    use tokio_test::{assert_pending, assert_ready, assert_ready_eq};

    const ADDR: BdAddr = BdAddr([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
    const CLIENT_IF: i32 = 7;
    const CONN_ID: i32 = 3;

    fn app() -> Uuid {
        Uuid::from_u128(0xa1)
    }

    fn registered(status: GattStatus) -> GattNotification {
        GattNotification::RegisterClient(RegisterClientEvent {
            status,
            client_if: CLIENT_IF,
            app_uuid: app(),
        })
    }

    fn connected(status: GattStatus) -> GattNotification {
        GattNotification::Connect(ConnectEvent {
            conn_id: CONN_ID,
            status,
            client_if: CLIENT_IF,
            addr: ADDR,
        })
    }

    fn read_result(status: GattStatus, value: Vec<u8>) -> GattNotification {
        GattNotification::ReadCharacteristic(ReadEvent {
            conn_id: CONN_ID,
            status,
            handle: AttHandle(0x2a),
            read_status: 0,
            value_type: 0,
            value,
        })
    }

    /// Drive a fresh client through registration and connection
    fn connect_client(h: &mut Harness) {
        let handle = h.handle.clone();
        let mut fut = task::spawn(async move { handle.connect(app(), ADDR).await });
        assert_pending!(fut.poll());
        h.pump();
        h.ack();
        h.notify(registered(GattStatus::SUCCESS));
        h.ack();
        h.notify(connected(GattStatus::SUCCESS));
        assert_ready_eq!(fut.poll(), Ok(()));
        h.events();
    }

    #[test]
    fn test_connect_registers_first() {
        let mut h = Harness::new();
        let handle = h.handle.clone();
        let mut fut = task::spawn(async move { handle.connect(app(), ADDR).await });
        assert_pending!(fut.poll());
        h.pump();

        // Only the registration goes out while the client has no id
        assert_eq!(h.sent(), vec![0x01]);
        let register = h.ack();
        assert_eq!(register.payload(), app().as_bytes());
        assert_eq!(h.sent(), Vec::<u8>::new());

        h.notify(registered(GattStatus::SUCCESS));
        assert_eq!(h.sent(), vec![0x03]);
        let connect = h.ack();
        assert_eq!(&connect.payload()[..4], &CLIENT_IF.to_le_bytes());
        assert_eq!(h.sent(), Vec::<u8>::new());
        assert_pending!(fut.poll());

        h.notify(connected(GattStatus::SUCCESS));
        assert_ready_eq!(fut.poll(), Ok(()));
        assert_eq!(
            h.events(),
            vec![
                GattEvent::ClientRegistered {
                    app_uuid: app(),
                    client_if: CLIENT_IF
                },
                GattEvent::ClientConnectionChanged {
                    app_uuid: app(),
                    addr: ADDR,
                    connected: true
                },
            ]
        );
    }

    #[test]
    fn test_registration_failure_rejects_connect() {
        let mut h = Harness::new();
        let handle = h.handle.clone();
        let mut fut = task::spawn(async move { handle.connect(app(), ADDR).await });
        assert_pending!(fut.poll());
        h.pump();
        h.ack();
        h.notify(registered(GattStatus::ERROR));

        assert_ready_eq!(fut.poll(), Err(GattManagerError::RegistrationFailed));
        assert!(h.manager.clients.is_empty());
        assert_eq!(h.sent(), Vec::<u8>::new());
    }

    #[test]
    fn test_register_command_error_rejects_connect() {
        let mut h = Harness::new();
        let handle = h.handle.clone();
        let mut fut = task::spawn(async move { handle.connect(app(), ADDR).await });
        assert_pending!(fut.poll());
        h.pump();
        h.fail(BluetoothStatus::NoMem);

        assert_ready_eq!(fut.poll(), Err(GattManagerError::RegistrationFailed));
        assert!(h.manager.clients.is_empty());
    }

    #[test]
    fn test_second_connect_is_busy() {
        let mut h = Harness::new();
        let first = h.handle.clone();
        let second = h.handle.clone();
        let mut fut1 = task::spawn(async move { first.connect(app(), ADDR).await });
        let mut fut2 = task::spawn(async move { second.connect(app(), ADDR).await });
        assert_pending!(fut1.poll());
        assert_pending!(fut2.poll());
        h.pump();

        assert_ready_eq!(fut2.poll(), Err(GattManagerError::Busy));
        assert_eq!(h.sent(), vec![0x01]);
        assert_pending!(fut1.poll());
    }

    #[test]
    fn test_connect_failure_notification() {
        let mut h = Harness::new();
        let handle = h.handle.clone();
        let mut fut = task::spawn(async move { handle.connect(app(), ADDR).await });
        assert_pending!(fut.poll());
        h.pump();
        h.ack();
        h.notify(registered(GattStatus::SUCCESS));
        h.ack();
        h.notify(connected(GattStatus::ERROR));

        assert_ready_eq!(fut.poll(), Err(GattManagerError::Gatt(GattStatus::ERROR)));
        assert!(h.events().contains(&GattEvent::ClientConnectionChanged {
            app_uuid: app(),
            addr: ADDR,
            connected: false
        }));
        // The registration survives an operation-level failure
        assert_eq!(h.manager.clients[&app()].client_if, CLIENT_IF);
    }

    #[test]
    fn test_read_auth_retry_once() {
        let mut h = Harness::new();
        connect_client(&mut h);

        let handle = h.handle.clone();
        let mut fut =
            task::spawn(async move { handle.read_characteristic(app(), AttHandle(0x2a)).await });
        assert_pending!(fut.poll());
        h.pump();

        let first = h.ack();
        assert_eq!(first.opcode(), 0x08);
        assert_eq!(&first.payload()[6..], &[0, 0, 0, 0]);

        h.notify(read_result(GattStatus::INSUFFICIENT_AUTHENTICATION, vec![]));
        let retry = h.ack();
        assert_eq!(retry.opcode(), 0x08);
        assert_eq!(&retry.payload()[..6], &first.payload()[..6]);
        assert_eq!(&retry.payload()[6..], &[2, 0, 0, 0]);

        h.notify(read_result(GattStatus::SUCCESS, vec![0x64]));
        assert_ready_eq!(fut.poll(), Ok(vec![0x64]));
        assert_eq!(
            h.events(),
            vec![GattEvent::CharacteristicChanged {
                app_uuid: app(),
                handle: AttHandle(0x2a),
                value: vec![0x64]
            }]
        );
    }

    #[test]
    fn test_second_auth_failure_is_terminal() {
        let mut h = Harness::new();
        connect_client(&mut h);

        let handle = h.handle.clone();
        let mut fut =
            task::spawn(async move { handle.read_characteristic(app(), AttHandle(0x2a)).await });
        assert_pending!(fut.poll());
        h.pump();
        h.ack();
        h.notify(read_result(GattStatus::INSUFFICIENT_ENCRYPTION, vec![]));
        h.ack();
        h.notify(read_result(GattStatus::INSUFFICIENT_AUTHENTICATION, vec![]));

        assert_ready_eq!(
            fut.poll(),
            Err(GattManagerError::Gatt(GattStatus::INSUFFICIENT_AUTHENTICATION))
        );
        assert_eq!(h.sent(), Vec::<u8>::new());
        assert!(h.manager.clients[&app()].read_characteristic.is_none());
    }

    #[test]
    fn test_concurrent_read_is_busy() {
        let mut h = Harness::new();
        connect_client(&mut h);

        let first = h.handle.clone();
        let second = h.handle.clone();
        let mut fut1 =
            task::spawn(async move { first.read_characteristic(app(), AttHandle(0x2a)).await });
        let mut fut2 =
            task::spawn(async move { second.read_characteristic(app(), AttHandle(0x2a)).await });
        assert_pending!(fut1.poll());
        assert_pending!(fut2.poll());
        h.pump();

        assert_ready_eq!(fut2.poll(), Err(GattManagerError::Busy));
        assert_eq!(h.sent(), vec![0x08]);

        h.ack();
        h.notify(read_result(GattStatus::SUCCESS, vec![1, 2]));
        assert_ready_eq!(fut1.poll(), Ok(vec![1, 2]));
    }

    #[test]
    fn test_write_retry_resends_value() {
        let mut h = Harness::new();
        connect_client(&mut h);

        let handle = h.handle.clone();
        let mut fut = task::spawn(async move {
            handle
                .write_descriptor(app(), AttHandle(0x2b), vec![0x01, 0x00])
                .await
        });
        assert_pending!(fut.poll());
        h.pump();
        let first = h.ack();
        assert_eq!(first.opcode(), 0x0c);

        h.notify(GattNotification::WriteDescriptor(WriteEvent {
            conn_id: CONN_ID,
            status: GattStatus::INSUFFICIENT_AUTHENTICATION,
            handle: AttHandle(0x2b),
        }));
        let retry = h.ack();
        assert_eq!(retry.opcode(), 0x0c);
        assert_eq!(&retry.payload()[retry.len() - 2..], &[0x01, 0x00]);

        h.notify(GattNotification::WriteDescriptor(WriteEvent {
            conn_id: CONN_ID,
            status: GattStatus::SUCCESS,
            handle: AttHandle(0x2b),
        }));
        assert_ready_eq!(fut.poll(), Ok(()));
    }

    #[test]
    fn test_read_requires_connection() {
        let mut h = Harness::new();
        let handle = h.handle.clone();
        let mut fut = task::spawn(async move { handle.read_descriptor(app(), AttHandle(1)).await });
        assert_pending!(fut.poll());
        h.pump();
        assert_ready_eq!(fut.poll(), Err(GattManagerError::NotReady));
    }

    #[test]
    fn test_discover_flow() {
        let mut h = Harness::new();
        connect_client(&mut h);

        let handle = h.handle.clone();
        let mut fut = task::spawn(async move { handle.discover(app()).await });
        assert_pending!(fut.poll());
        h.pump();
        let search = h.ack();
        assert_eq!(search.opcode(), 0x06);
        // Unfiltered search
        assert_eq!(search.payload()[4], 0);

        h.notify(GattNotification::SearchComplete(SearchCompleteEvent {
            conn_id: CONN_ID,
            status: GattStatus::SUCCESS,
        }));
        assert_eq!(h.ack().opcode(), 0x17);

        let db = vec![GattDbElement::new(
            crate::gatt::types::GattAttrType::PrimaryService,
            Uuid::from_u128(0x180f),
        )];
        h.notify(GattNotification::GetGattDb(GattDbEvent {
            conn_id: CONN_ID,
            db: db.clone(),
        }));

        assert_ready_eq!(fut.poll(), Ok(db.clone()));
        assert_eq!(
            h.events(),
            vec![
                GattEvent::ServicesDiscovered {
                    app_uuid: app(),
                    db
                },
                GattEvent::DiscoverCompleted {
                    app_uuid: app(),
                    success: true
                },
            ]
        );
    }

    #[test]
    fn test_discover_search_failure() {
        let mut h = Harness::new();
        connect_client(&mut h);

        let handle = h.handle.clone();
        let mut fut = task::spawn(async move { handle.discover(app()).await });
        assert_pending!(fut.poll());
        h.pump();
        h.fail(BluetoothStatus::Busy);

        assert_ready_eq!(
            fut.poll(),
            Err(GattManagerError::Daemon(BluetoothStatus::Busy))
        );
        assert_eq!(
            h.events(),
            vec![GattEvent::DiscoverCompleted {
                app_uuid: app(),
                success: false
            }]
        );
    }

    #[test]
    fn test_register_notifications_resolves_on_command() {
        let mut h = Harness::new();
        connect_client(&mut h);

        let handle = h.handle.clone();
        let mut fut = task::spawn(async move {
            handle
                .register_notifications(app(), AttHandle(0x2a))
                .await
        });
        assert_pending!(fut.poll());
        h.pump();
        assert_eq!(h.ack().opcode(), 0x0e);
        assert_ready_eq!(fut.poll(), Ok(()));
    }

    #[test]
    fn test_unregister_with_pending_connect() {
        let mut h = Harness::new();
        connect_client(&mut h);

        // Drop the link so a new connect can be issued
        h.notify(GattNotification::Disconnect(ConnectEvent {
            conn_id: CONN_ID,
            status: GattStatus::SUCCESS,
            client_if: CLIENT_IF,
            addr: ADDR,
        }));
        h.events();

        let connect = h.handle.clone();
        let mut connect_fut = task::spawn(async move { connect.connect(app(), ADDR).await });
        assert_pending!(connect_fut.poll());
        h.pump();
        assert_eq!(h.sent(), vec![0x03]);
        h.ack();

        let unregister = h.handle.clone();
        let mut unregister_fut =
            task::spawn(async move { unregister.unregister_client(CLIENT_IF).await });
        assert_pending!(unregister_fut.poll());
        h.pump();
        assert_eq!(h.ack().opcode(), 0x02);

        assert_ready_eq!(unregister_fut.poll(), Ok(()));
        assert_ready_eq!(
            connect_fut.poll(),
            Err(GattManagerError::Failed("client unregistered".into()))
        );
        assert!(h.manager.clients.is_empty());
        assert_eq!(
            h.events(),
            vec![GattEvent::ClientUnregistered { app_uuid: app() }]
        );

        // A late notification for the old interface id is a no-op
        h.notify(connected(GattStatus::SUCCESS));
        assert!(h.events().is_empty());
        assert!(h.manager.clients.is_empty());
    }

    #[test]
    fn test_unregister_unknown_client_is_noop() {
        let mut h = Harness::new();
        let handle = h.handle.clone();
        let mut fut = task::spawn(async move { handle.unregister_client(42).await });
        assert_pending!(fut.poll());
        h.pump();
        assert_ready_eq!(fut.poll(), Ok(()));
        assert_eq!(h.transport.sent_count(), 0);
    }

    #[test]
    fn test_read_remote_rssi() {
        let mut h = Harness::new();
        connect_client(&mut h);

        let handle = h.handle.clone();
        let mut fut = task::spawn(async move { handle.read_remote_rssi(CLIENT_IF, ADDR).await });
        assert_pending!(fut.poll());
        h.pump();
        h.ack();
        h.notify(GattNotification::ReadRemoteRssi(ReadRemoteRssiEvent {
            client_if: CLIENT_IF,
            addr: ADDR,
            rssi: -58,
            status: GattStatus::SUCCESS,
        }));
        assert_ready_eq!(fut.poll(), Ok(-58));
    }

    #[test]
    fn test_disconnect_unknown_and_unconnected() {
        let mut h = Harness::new();
        let handle = h.handle.clone();
        let mut fut = task::spawn(async move { handle.disconnect(app(), ADDR).await });
        assert_pending!(fut.poll());
        h.pump();
        assert_ready_eq!(fut.poll(), Err(GattManagerError::InvalidParameter));
    }

    fn disconnected(status: GattStatus) -> GattNotification {
        GattNotification::Disconnect(ConnectEvent {
            conn_id: CONN_ID,
            status,
            client_if: CLIENT_IF,
            addr: ADDR,
        })
    }

    #[test]
    fn test_disconnect_failure_keeps_link() {
        let mut h = Harness::new();
        connect_client(&mut h);

        let handle = h.handle.clone();
        let mut fut = task::spawn(async move { handle.disconnect(app(), ADDR).await });
        assert_pending!(fut.poll());
        h.pump();
        assert_eq!(h.ack().opcode(), 0x04);

        h.notify(disconnected(GattStatus::ERROR));
        assert_ready_eq!(fut.poll(), Err(GattManagerError::Gatt(GattStatus::ERROR)));
        assert_eq!(
            h.events(),
            vec![GattEvent::ClientConnectionChanged {
                app_uuid: app(),
                addr: ADDR,
                connected: true
            }]
        );
        assert_eq!(h.manager.clients[&app()].conn_id, CONN_ID);
    }

    #[test]
    fn test_link_loss_fails_pending_read() {
        let mut h = Harness::new();
        connect_client(&mut h);

        let handle = h.handle.clone();
        let mut read =
            task::spawn(async move { handle.read_characteristic(app(), AttHandle(0x2a)).await });
        assert_pending!(read.poll());
        h.pump();
        assert_eq!(h.ack().opcode(), 0x08);

        h.notify(disconnected(GattStatus::SUCCESS));
        assert_ready_eq!(read.poll(), Err(GattManagerError::NotReady));
        assert_eq!(
            h.events(),
            vec![GattEvent::ClientConnectionChanged {
                app_uuid: app(),
                addr: ADDR,
                connected: false
            }]
        );

        // Reconnect; the read slot is free again
        let handle = h.handle.clone();
        let mut connect = task::spawn(async move { handle.connect(app(), ADDR).await });
        assert_pending!(connect.poll());
        h.pump();
        assert_eq!(h.ack().opcode(), 0x03);
        h.notify(connected(GattStatus::SUCCESS));
        assert_ready_eq!(connect.poll(), Ok(()));

        let handle = h.handle.clone();
        let mut read =
            task::spawn(async move { handle.read_characteristic(app(), AttHandle(0x2a)).await });
        assert_pending!(read.poll());
        h.pump();
        assert_eq!(h.ack().opcode(), 0x08);
        h.notify(read_result(GattStatus::SUCCESS, vec![0x01]));
        assert_ready_eq!(read.poll(), Ok(vec![0x01]));
    }

    #[test]
    fn test_closed_transport_fails_through_completion() {
        let mut h = Harness::new();
        h.transport.close();
        let handle = h.handle.clone();
        let mut fut = task::spawn(async move { handle.connect(app(), ADDR).await });
        assert_pending!(fut.poll());
        h.pump();

        let result = assert_ready!(fut.poll());
        assert_eq!(result, Err(GattManagerError::RegistrationFailed));
    }
}
