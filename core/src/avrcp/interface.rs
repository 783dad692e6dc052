// AVRCP interface: caller façade over the module and transport

use super::command::AvrcpCommand;
use super::module::AvrcpModule;
use super::notification::AvrcpNotificationHandler;
use super::types::{
    AvrcpEvent, AvrcpStatus, NotificationParam, NotificationType, PlayStatus, PlayerItem,
    TextEntry,
};
use crate::daemon::{ReplyHandler, ResultHandler, Transport};
use crate::error::BridgeError;
use std::sync::Arc;
use tracing::warn;

type Handler = ResultHandler<()>;

#[derive(Clone)]
pub struct AvrcpInterface {
    module: Arc<AvrcpModule>,
    transport: Arc<dyn Transport>,
}

impl AvrcpInterface {
    pub fn new(module: Arc<AvrcpModule>, transport: Arc<dyn Transport>) -> Self {
        Self { module, transport }
    }

    pub fn module(&self) -> &Arc<AvrcpModule> {
        &self.module
    }

    pub fn init(&self, handler: Arc<dyn AvrcpNotificationHandler>) {
        self.module.set_notification_handler(handler);
    }

    pub fn cleanup(&self) {
        self.module.clear_notification_handler();
    }

    pub fn send(&self, command: AvrcpCommand, handler: Handler) {
        let pdu = match self.module.build(&command) {
            Ok(pdu) => pdu,
            Err(e) => {
                warn!(opcode = ?command.opcode(), "failed to pack AVRCP command: {}", e);
                handler.fail(BridgeError::from(e).status());
                return;
            }
        };
        if let Err(rejected) = self.transport.send(pdu, ReplyHandler::Avrcp(handler)) {
            warn!(opcode = ?command.opcode(), "failed to send AVRCP command: {}", rejected.error);
            rejected.fail_handler();
        }
    }

    pub fn get_play_status_rsp(
        &self,
        status: PlayStatus,
        song_len: u32,
        song_pos: u32,
        handler: Handler,
    ) {
        self.send(
            AvrcpCommand::GetPlayStatusRsp {
                status,
                song_len,
                song_pos,
            },
            handler,
        )
    }

    pub fn list_player_app_attr_rsp(&self, attributes: Vec<u8>, handler: Handler) {
        self.send(AvrcpCommand::ListPlayerAppAttrRsp { attributes }, handler)
    }

    pub fn list_player_app_value_rsp(&self, values: Vec<u8>, handler: Handler) {
        self.send(AvrcpCommand::ListPlayerAppValueRsp { values }, handler)
    }

    pub fn get_player_app_value_rsp(&self, values: Vec<(u8, u8)>, handler: Handler) {
        self.send(AvrcpCommand::GetPlayerAppValueRsp { values }, handler)
    }

    pub fn get_player_app_attr_text_rsp(&self, entries: Vec<TextEntry>, handler: Handler) {
        self.send(AvrcpCommand::GetPlayerAppAttrTextRsp { entries }, handler)
    }

    pub fn get_player_app_value_text_rsp(&self, entries: Vec<TextEntry>, handler: Handler) {
        self.send(AvrcpCommand::GetPlayerAppValueTextRsp { entries }, handler)
    }

    pub fn get_element_attr_rsp(&self, entries: Vec<TextEntry>, handler: Handler) {
        self.send(AvrcpCommand::GetElementAttrRsp { entries }, handler)
    }

    pub fn set_player_app_value_rsp(&self, status: AvrcpStatus, handler: Handler) {
        self.send(AvrcpCommand::SetPlayerAppValueRsp { status }, handler)
    }

    pub fn register_notification_rsp(
        &self,
        event: AvrcpEvent,
        kind: NotificationType,
        param: NotificationParam,
        handler: Handler,
    ) {
        self.send(
            AvrcpCommand::RegisterNotificationRsp { event, kind, param },
            handler,
        )
    }

    /// Absolute volume, 0..=0x7f
    pub fn set_volume(&self, volume: u8, handler: Handler) {
        self.send(AvrcpCommand::SetVolume { volume }, handler)
    }

    pub fn set_addressed_player_rsp(&self, status: AvrcpStatus, handler: Handler) {
        self.send(AvrcpCommand::SetAddressedPlayerRsp { status }, handler)
    }

    pub fn get_folder_items_list_rsp(
        &self,
        status: AvrcpStatus,
        uid_counter: u16,
        players: Vec<PlayerItem>,
        handler: Handler,
    ) {
        self.send(
            AvrcpCommand::GetFolderItemsListRsp {
                status,
                uid_counter,
                players,
            },
            handler,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::mock::MockTransport;
    use crate::types::BluetoothStatus;
    use tokio::sync::oneshot;

    fn interface() -> (AvrcpInterface, MockTransport) {
        let transport = MockTransport::new();
        let avrcp = AvrcpInterface::new(Arc::new(AvrcpModule::new()), Arc::new(transport.clone()));
        (avrcp, transport)
    }

    #[test]
    fn test_set_volume_sent() {
        let (avrcp, transport) = interface();
        let (tx, mut rx) = oneshot::channel();
        avrcp.set_volume(0x40, ResultHandler::from_sender(tx));
        let pdu = transport.ack().unwrap();
        assert_eq!((pdu.service(), pdu.opcode()), (0x08, 0x0a));
        assert_eq!(pdu.payload(), &[0x40]);
        assert_eq!(rx.try_recv().unwrap(), Ok(()));
    }

    #[test]
    fn test_oversized_text_fails_through_handler() {
        let (avrcp, transport) = interface();
        let (tx, mut rx) = oneshot::channel();
        avrcp.get_element_attr_rsp(
            vec![TextEntry {
                id: 1,
                text: "t".repeat(300),
            }],
            ResultHandler::from_sender(tx),
        );
        assert_eq!(transport.sent_count(), 0);
        assert_eq!(rx.try_recv().unwrap(), Err(BluetoothStatus::ParmInvalid));
    }
}
