// AVRCP wire types

use crate::codec::{len_u8, CodecError, Pack, Unpack};
use crate::pdu::Pdu;
use std::fmt;

/// Media player state reported to the remote controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PlayStatus {
    Stopped = 0x00,
    Playing = 0x01,
    Paused = 0x02,
    FwdSeek = 0x03,
    RevSeek = 0x04,
    Error = 0xff,
}

impl Pack for PlayStatus {
    fn pack(&self, pdu: &mut Pdu) -> Result<(), CodecError> {
        (*self as u8).pack(pdu)
    }
}

/// Events a controller can register for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AvrcpEvent {
    PlayStatusChanged = 0x01,
    TrackChange = 0x02,
    TrackReachedEnd = 0x03,
    TrackReachedStart = 0x04,
    PlayPosChanged = 0x05,
    AppSettingsChanged = 0x08,
}

impl AvrcpEvent {
    pub fn from_u8(value: u8) -> Result<Self, CodecError> {
        use AvrcpEvent::*;
        Ok(match value {
            0x01 => PlayStatusChanged,
            0x02 => TrackChange,
            0x03 => TrackReachedEnd,
            0x04 => TrackReachedStart,
            0x05 => PlayPosChanged,
            0x08 => AppSettingsChanged,
            other => {
                return Err(CodecError::InvalidValue {
                    field: "AVRCP event",
                    value: other as i64,
                })
            }
        })
    }
}

impl Pack for AvrcpEvent {
    fn pack(&self, pdu: &mut Pdu) -> Result<(), CodecError> {
        (*self as u8).pack(pdu)
    }
}

impl Unpack for AvrcpEvent {
    fn unpack(pdu: &mut Pdu) -> Result<Self, CodecError> {
        Self::from_u8(u8::unpack(pdu)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NotificationType {
    Interim = 0x00,
    Changed = 0x01,
}

impl Pack for NotificationType {
    fn pack(&self, pdu: &mut Pdu) -> Result<(), CodecError> {
        (*self as u8).pack(pdu)
    }
}

/// AVRCP response status; the space is open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvrcpStatus(pub u8);

impl AvrcpStatus {
    pub const INVALID_COMMAND: AvrcpStatus = AvrcpStatus(0x00);
    pub const INVALID_PARAMETER: AvrcpStatus = AvrcpStatus(0x01);
    pub const PARAMETER_NOT_FOUND: AvrcpStatus = AvrcpStatus(0x02);
    pub const INTERNAL_ERROR: AvrcpStatus = AvrcpStatus(0x03);
    pub const SUCCESS: AvrcpStatus = AvrcpStatus(0x04);
}

impl fmt::Display for AvrcpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AVRCP status {:#04x}", self.0)
    }
}

impl Pack for AvrcpStatus {
    fn pack(&self, pdu: &mut Pdu) -> Result<(), CodecError> {
        self.0.pack(pdu)
    }
}

/// Key state of a passthrough command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Pressed,
    Released,
}

impl Unpack for KeyState {
    fn unpack(pdu: &mut Pdu) -> Result<Self, CodecError> {
        Ok(match u8::unpack(pdu)? {
            0 => KeyState::Pressed,
            _ => KeyState::Released,
        })
    }
}

/// Attribute id (or value id) with its display text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEntry {
    pub id: u8,
    pub text: String,
}

impl Pack for TextEntry {
    fn pack(&self, pdu: &mut Pdu) -> Result<(), CodecError> {
        let bytes = self.text.as_bytes();
        pdu.put(&(self.id, len_u8("AVRCP text", bytes.len())?))?;
        pdu.append(bytes)
    }
}

/// Parameter of a register-notification response, shaped by the event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationParam {
    PlayStatus(PlayStatus),
    /// Track UID; all 0xff when nothing is selected
    Track([u8; 8]),
    PlayPosition(u32),
    /// (attribute, value) pairs
    PlayerSettings(Vec<(u8, u8)>),
    Empty,
}

impl NotificationParam {
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        Ok(match self {
            NotificationParam::PlayStatus(status) => vec![*status as u8],
            NotificationParam::Track(uid) => uid.to_vec(),
            NotificationParam::PlayPosition(pos) => pos.to_le_bytes().to_vec(),
            NotificationParam::PlayerSettings(pairs) => {
                let mut out = vec![len_u8("player settings", pairs.len())?];
                for (attr, value) in pairs {
                    out.push(*attr);
                    out.push(*value);
                }
                out
            }
            NotificationParam::Empty => Vec::new(),
        })
    }
}

/// Media player entry of a folder-items listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerItem {
    pub id: u16,
    pub major_type: u8,
    pub subtype: u32,
    pub play_status: PlayStatus,
    pub features: [u8; 16],
    pub charset: u16,
    pub name: String,
}

impl Pack for PlayerItem {
    fn pack(&self, pdu: &mut Pdu) -> Result<(), CodecError> {
        pdu.put(&(self.id, self.major_type, self.subtype))?;
        pdu.put(&self.play_status)?;
        pdu.append(&self.features)?;
        let name = self.name.as_bytes();
        let len = u16::try_from(name.len()).map_err(|_| CodecError::ValueTooLong {
            field: "player name",
            len: name.len(),
            max: u16::MAX as usize,
        })?;
        pdu.put(&(self.charset, len))?;
        pdu.append(name)
    }
}

/// Pack a `u8` count followed by the elements
pub(crate) fn put_u8_array<T: Pack>(
    pdu: &mut Pdu,
    field: &'static str,
    items: &[T],
) -> Result<(), CodecError> {
    pdu.put(&len_u8(field, items.len())?)?;
    for item in items {
        pdu.put(item)?;
    }
    Ok(())
}

/// Unpack a `u8` count followed by that many elements
pub(crate) fn get_u8_array<T: Unpack>(pdu: &mut Pdu) -> Result<Vec<T>, CodecError> {
    let count = pdu.get::<u8>()?;
    (0..count).map(|_| pdu.get()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_entry_too_long() {
        let mut pdu = Pdu::new(0x08, 0x05);
        let entry = TextEntry {
            id: 1,
            text: "x".repeat(256),
        };
        assert!(matches!(
            pdu.put(&entry),
            Err(CodecError::ValueTooLong { max: 255, .. })
        ));
    }

    #[test]
    fn test_notification_param_bytes() {
        assert_eq!(
            NotificationParam::PlayStatus(PlayStatus::Paused).to_bytes().unwrap(),
            vec![2]
        );
        assert_eq!(
            NotificationParam::PlayPosition(0x0102).to_bytes().unwrap(),
            vec![2, 1, 0, 0]
        );
        assert_eq!(
            NotificationParam::PlayerSettings(vec![(2, 1), (3, 2)])
                .to_bytes()
                .unwrap(),
            vec![2, 2, 1, 3, 2]
        );
    }

    #[test]
    fn test_unknown_event_rejected() {
        assert!(AvrcpEvent::from_u8(0x07).is_err());
        assert_eq!(AvrcpEvent::from_u8(0x05).unwrap(), AvrcpEvent::PlayPosChanged);
    }
}
