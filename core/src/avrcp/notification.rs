//! AVRCP notifications: controller requests and remote state changes
//!
//! Most notifications ask the target for data; the embedder answers with
//! the matching `*_rsp` command on [`AvrcpInterface`](super::AvrcpInterface).

use super::types::{get_u8_array, AvrcpEvent, KeyState};
use crate::codec::CodecError;
use crate::pdu::Pdu;
use crate::types::BdAddr;

pub const NOTIFICATION_BASE: u8 = 0x81;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFeaturesEvent {
    pub addr: BdAddr,
    pub features: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerAppValuesTextEvent {
    pub attribute: u8,
    pub values: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterNotificationEvent {
    pub event: AvrcpEvent,
    pub param: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeChangeEvent {
    pub volume: u8,
    pub ctype: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassthroughEvent {
    pub id: u8,
    pub state: KeyState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetFolderItemsEvent {
    pub scope: u8,
    pub start: u32,
    pub end: u32,
    pub attributes: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvrcpNotification {
    RemoteFeatures(RemoteFeaturesEvent),
    GetPlayStatus,
    ListPlayerAppAttr,
    ListPlayerAppValues { attribute: u8 },
    GetPlayerAppValue { attributes: Vec<u8> },
    GetPlayerAppAttrsText { attributes: Vec<u8> },
    GetPlayerAppValuesText(PlayerAppValuesTextEvent),
    SetPlayerAppValue { values: Vec<(u8, u8)> },
    GetElementAttr { attributes: Vec<u32> },
    RegisterNotification(RegisterNotificationEvent),
    VolumeChange(VolumeChangeEvent),
    PassthroughCmd(PassthroughEvent),
    SetAddressedPlayer { player_id: u16 },
    GetFolderItems(GetFolderItemsEvent),
}

impl AvrcpNotification {
    /// Decode the notification carried by `pdu`; gaps decode to `None`
    pub fn decode(pdu: &mut Pdu) -> Result<Option<Self>, CodecError> {
        let opcode = pdu.opcode();
        if opcode < NOTIFICATION_BASE {
            return Ok(None);
        }
        use AvrcpNotification::*;
        let notification = match opcode - NOTIFICATION_BASE {
            0 => RemoteFeatures(RemoteFeaturesEvent {
                addr: pdu.get()?,
                features: pdu.get()?,
            }),
            1 => GetPlayStatus,
            2 => ListPlayerAppAttr,
            3 => ListPlayerAppValues {
                attribute: pdu.get()?,
            },
            4 => GetPlayerAppValue {
                attributes: get_u8_array(pdu)?,
            },
            5 => GetPlayerAppAttrsText {
                attributes: get_u8_array(pdu)?,
            },
            6 => GetPlayerAppValuesText(PlayerAppValuesTextEvent {
                attribute: pdu.get()?,
                values: get_u8_array(pdu)?,
            }),
            7 => SetPlayerAppValue {
                values: get_u8_array(pdu)?,
            },
            8 => GetElementAttr {
                attributes: get_u8_array(pdu)?,
            },
            9 => RegisterNotification(RegisterNotificationEvent {
                event: pdu.get()?,
                param: pdu.get()?,
            }),
            10 => VolumeChange(VolumeChangeEvent {
                volume: pdu.get()?,
                ctype: pdu.get()?,
            }),
            11 => PassthroughCmd(PassthroughEvent {
                id: pdu.get()?,
                state: pdu.get()?,
            }),
            12 => SetAddressedPlayer {
                player_id: pdu.get()?,
            },
            14 => GetFolderItems(GetFolderItemsEvent {
                scope: pdu.get()?,
                start: pdu.get()?,
                end: pdu.get()?,
                attributes: get_u8_array(pdu)?,
            }),
            _ => return Ok(None),
        };
        Ok(Some(notification))
    }

    pub fn deliver(self, handler: &dyn AvrcpNotificationHandler) {
        use AvrcpNotification::*;
        match self {
            RemoteFeatures(e) => handler.remote_features(e),
            GetPlayStatus => handler.get_play_status(),
            ListPlayerAppAttr => handler.list_player_app_attr(),
            ListPlayerAppValues { attribute } => handler.list_player_app_values(attribute),
            GetPlayerAppValue { attributes } => handler.get_player_app_value(attributes),
            GetPlayerAppAttrsText { attributes } => handler.get_player_app_attrs_text(attributes),
            GetPlayerAppValuesText(e) => handler.get_player_app_values_text(e),
            SetPlayerAppValue { values } => handler.set_player_app_value(values),
            GetElementAttr { attributes } => handler.get_element_attr(attributes),
            RegisterNotification(e) => handler.register_notification(e),
            VolumeChange(e) => handler.volume_change(e),
            PassthroughCmd(e) => handler.passthrough_cmd(e),
            SetAddressedPlayer { player_id } => handler.set_addressed_player(player_id),
            GetFolderItems(e) => handler.get_folder_items(e),
        }
    }
}

/// Receiver of AVRCP notifications, called on the I/O context
#[cfg_attr(test, mockall::automock)]
pub trait AvrcpNotificationHandler: Send + Sync {
    fn remote_features(&self, _event: RemoteFeaturesEvent) {}
    fn get_play_status(&self) {}
    fn list_player_app_attr(&self) {}
    fn list_player_app_values(&self, _attribute: u8) {}
    fn get_player_app_value(&self, _attributes: Vec<u8>) {}
    fn get_player_app_attrs_text(&self, _attributes: Vec<u8>) {}
    fn get_player_app_values_text(&self, _event: PlayerAppValuesTextEvent) {}
    fn set_player_app_value(&self, _values: Vec<(u8, u8)>) {}
    fn get_element_attr(&self, _attributes: Vec<u32>) {}
    fn register_notification(&self, _event: RegisterNotificationEvent) {}
    fn volume_change(&self, _event: VolumeChangeEvent) {}
    fn passthrough_cmd(&self, _event: PassthroughEvent) {}
    fn set_addressed_player(&self, _player_id: u16) {}
    fn get_folder_items(&self, _event: GetFolderItemsEvent) {}
}
