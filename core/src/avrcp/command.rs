// AVRCP command packers (target-role responses to the remote controller)

use super::types::{
    put_u8_array, AvrcpEvent, AvrcpStatus, NotificationParam, NotificationType, PlayStatus,
    PlayerItem, TextEntry,
};
use super::SERVICE_ID;
use crate::codec::{len_u8, CodecError};
use crate::pdu::Pdu;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AvrcpOpcode {
    Error = 0x00,
    GetPlayStatusRsp = 0x01,
    ListPlayerAppAttrRsp = 0x02,
    ListPlayerAppValueRsp = 0x03,
    GetPlayerAppValueRsp = 0x04,
    GetPlayerAppAttrTextRsp = 0x05,
    GetPlayerAppValueTextRsp = 0x06,
    GetElementAttrRsp = 0x07,
    SetPlayerAppValueRsp = 0x08,
    RegisterNotificationRsp = 0x09,
    SetVolume = 0x0a,
    SetAddressedPlayerRsp = 0x0b,
    GetFolderItemsListRsp = 0x0d,
}

impl AvrcpOpcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        use AvrcpOpcode::*;
        Some(match value {
            0x00 => Error,
            0x01 => GetPlayStatusRsp,
            0x02 => ListPlayerAppAttrRsp,
            0x03 => ListPlayerAppValueRsp,
            0x04 => GetPlayerAppValueRsp,
            0x05 => GetPlayerAppAttrTextRsp,
            0x06 => GetPlayerAppValueTextRsp,
            0x07 => GetElementAttrRsp,
            0x08 => SetPlayerAppValueRsp,
            0x09 => RegisterNotificationRsp,
            0x0a => SetVolume,
            0x0b => SetAddressedPlayerRsp,
            0x0d => GetFolderItemsListRsp,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvrcpCommand {
    GetPlayStatusRsp {
        status: PlayStatus,
        song_len: u32,
        song_pos: u32,
    },
    ListPlayerAppAttrRsp {
        attributes: Vec<u8>,
    },
    ListPlayerAppValueRsp {
        values: Vec<u8>,
    },
    /// (attribute, value) pairs
    GetPlayerAppValueRsp {
        values: Vec<(u8, u8)>,
    },
    GetPlayerAppAttrTextRsp {
        entries: Vec<TextEntry>,
    },
    GetPlayerAppValueTextRsp {
        entries: Vec<TextEntry>,
    },
    GetElementAttrRsp {
        entries: Vec<TextEntry>,
    },
    SetPlayerAppValueRsp {
        status: AvrcpStatus,
    },
    RegisterNotificationRsp {
        event: AvrcpEvent,
        kind: NotificationType,
        param: NotificationParam,
    },
    SetVolume {
        volume: u8,
    },
    SetAddressedPlayerRsp {
        status: AvrcpStatus,
    },
    GetFolderItemsListRsp {
        status: AvrcpStatus,
        uid_counter: u16,
        players: Vec<PlayerItem>,
    },
}

impl AvrcpCommand {
    pub fn opcode(&self) -> AvrcpOpcode {
        use AvrcpCommand::*;
        match self {
            GetPlayStatusRsp { .. } => AvrcpOpcode::GetPlayStatusRsp,
            ListPlayerAppAttrRsp { .. } => AvrcpOpcode::ListPlayerAppAttrRsp,
            ListPlayerAppValueRsp { .. } => AvrcpOpcode::ListPlayerAppValueRsp,
            GetPlayerAppValueRsp { .. } => AvrcpOpcode::GetPlayerAppValueRsp,
            GetPlayerAppAttrTextRsp { .. } => AvrcpOpcode::GetPlayerAppAttrTextRsp,
            GetPlayerAppValueTextRsp { .. } => AvrcpOpcode::GetPlayerAppValueTextRsp,
            GetElementAttrRsp { .. } => AvrcpOpcode::GetElementAttrRsp,
            SetPlayerAppValueRsp { .. } => AvrcpOpcode::SetPlayerAppValueRsp,
            RegisterNotificationRsp { .. } => AvrcpOpcode::RegisterNotificationRsp,
            SetVolume { .. } => AvrcpOpcode::SetVolume,
            SetAddressedPlayerRsp { .. } => AvrcpOpcode::SetAddressedPlayerRsp,
            GetFolderItemsListRsp { .. } => AvrcpOpcode::GetFolderItemsListRsp,
        }
    }

    pub fn to_pdu(&self) -> Result<Pdu, CodecError> {
        let mut pdu = Pdu::new(SERVICE_ID, self.opcode() as u8);
        self.pack(&mut pdu)?;
        Ok(pdu)
    }

    fn pack(&self, pdu: &mut Pdu) -> Result<(), CodecError> {
        use AvrcpCommand::*;
        match self {
            GetPlayStatusRsp {
                status,
                song_len,
                song_pos,
            } => pdu.put(&(status, song_len, song_pos)),
            ListPlayerAppAttrRsp { attributes } => put_u8_array(pdu, "attributes", attributes),
            ListPlayerAppValueRsp { values } => put_u8_array(pdu, "values", values),
            GetPlayerAppValueRsp { values } => put_u8_array(pdu, "attribute values", values),
            GetPlayerAppAttrTextRsp { entries }
            | GetPlayerAppValueTextRsp { entries }
            | GetElementAttrRsp { entries } => put_u8_array(pdu, "text entries", entries),
            SetPlayerAppValueRsp { status } | SetAddressedPlayerRsp { status } => pdu.put(status),
            RegisterNotificationRsp { event, kind, param } => {
                let bytes = param.to_bytes()?;
                pdu.put(&(event, kind, len_u8("notification param", bytes.len())?))?;
                pdu.append(&bytes)
            }
            SetVolume { volume } => pdu.put(volume),
            GetFolderItemsListRsp {
                status,
                uid_counter,
                players,
            } => {
                pdu.put(&(status, uid_counter))?;
                put_u8_array(pdu, "players", players)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(command: AvrcpCommand) -> Vec<u8> {
        command.to_pdu().unwrap().payload().to_vec()
    }

    #[test]
    fn test_get_play_status_rsp() {
        let bytes = payload(AvrcpCommand::GetPlayStatusRsp {
            status: PlayStatus::Playing,
            song_len: 1000,
            song_pos: 10,
        });
        assert_eq!(bytes, vec![1, 0xe8, 0x03, 0, 0, 10, 0, 0, 0]);
    }

    #[test]
    fn test_element_attr_text() {
        let bytes = payload(AvrcpCommand::GetElementAttrRsp {
            entries: vec![TextEntry {
                id: 1,
                text: "Song".into(),
            }],
        });
        assert_eq!(bytes, vec![1, 1, 4, b'S', b'o', b'n', b'g']);
    }

    #[test]
    fn test_register_notification_rsp() {
        let pdu = AvrcpCommand::RegisterNotificationRsp {
            event: AvrcpEvent::PlayStatusChanged,
            kind: NotificationType::Interim,
            param: NotificationParam::PlayStatus(PlayStatus::Paused),
        }
        .to_pdu()
        .unwrap();
        assert_eq!(pdu.service(), 0x08);
        assert_eq!(pdu.opcode(), 0x09);
        assert_eq!(pdu.payload(), &[0x01, 0x00, 1, 2]);
    }

    #[test]
    fn test_too_many_attributes() {
        let err = AvrcpCommand::ListPlayerAppAttrRsp {
            attributes: vec![0; 256],
        }
        .to_pdu()
        .unwrap_err();
        assert!(matches!(err, CodecError::ValueTooLong { max: 255, .. }));
    }

    #[test]
    fn test_folder_items_player() {
        let bytes = payload(AvrcpCommand::GetFolderItemsListRsp {
            status: AvrcpStatus::SUCCESS,
            uid_counter: 0,
            players: vec![PlayerItem {
                id: 1,
                major_type: 0x01,
                subtype: 0,
                play_status: PlayStatus::Stopped,
                features: [0; 16],
                charset: 0x006a,
                name: "Music".into(),
            }],
        });
        // status, uid counter, count
        assert_eq!(&bytes[..4], &[0x04, 0, 0, 1]);
        // id, type, subtype, play status, features, charset, name length, name
        assert_eq!(bytes.len(), 4 + 2 + 1 + 4 + 1 + 16 + 2 + 2 + 5);
        assert_eq!(&bytes[bytes.len() - 5..], b"Music");
    }
}
