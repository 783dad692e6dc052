// Wire types shared by every profile module

use crate::codec::{CodecError, Pack, Unpack};
use crate::pdu::Pdu;
use std::fmt;
use std::str::FromStr;

/// 6-byte Bluetooth device address, most significant byte first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BdAddr(pub [u8; 6]);

impl BdAddr {
    pub const ANY: BdAddr = BdAddr([0; 6]);

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAddrError(pub String);

impl fmt::Display for ParseAddrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid Bluetooth address: {}", self.0)
    }
}

impl std::error::Error for ParseAddrError {}

impl FromStr for BdAddr {
    type Err = ParseAddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(ParseAddrError(s.to_string()));
        }
        let mut out = [0u8; 6];
        for (slot, part) in out.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(ParseAddrError(s.to_string()));
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| ParseAddrError(s.to_string()))?;
        }
        Ok(BdAddr(out))
    }
}

impl Pack for BdAddr {
    fn pack(&self, pdu: &mut Pdu) -> Result<(), CodecError> {
        pdu.append(&self.0)
    }
}

impl Unpack for BdAddr {
    fn unpack(pdu: &mut Pdu) -> Result<Self, CodecError> {
        Ok(BdAddr(pdu.take_array()?))
    }
}

/// Daemon-level status carried in error responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BluetoothStatus {
    Success = 0,
    Fail = 1,
    NotReady = 2,
    NoMem = 3,
    Busy = 4,
    Done = 5,
    Unsupported = 6,
    ParmInvalid = 7,
    Unhandled = 8,
    AuthFailure = 9,
    RmtDevDown = 10,
    AuthRejected = 11,
}

impl BluetoothStatus {
    pub fn from_u8(value: u8) -> Result<Self, CodecError> {
        use BluetoothStatus::*;
        Ok(match value {
            0 => Success,
            1 => Fail,
            2 => NotReady,
            3 => NoMem,
            4 => Busy,
            5 => Done,
            6 => Unsupported,
            7 => ParmInvalid,
            8 => Unhandled,
            9 => AuthFailure,
            10 => RmtDevDown,
            11 => AuthRejected,
            other => {
                return Err(CodecError::InvalidValue {
                    field: "bluetooth status",
                    value: other as i64,
                })
            }
        })
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for BluetoothStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BluetoothStatus::Success => "success",
            BluetoothStatus::Fail => "fail",
            BluetoothStatus::NotReady => "not ready",
            BluetoothStatus::NoMem => "no memory",
            BluetoothStatus::Busy => "busy",
            BluetoothStatus::Done => "done",
            BluetoothStatus::Unsupported => "unsupported",
            BluetoothStatus::ParmInvalid => "invalid parameter",
            BluetoothStatus::Unhandled => "unhandled",
            BluetoothStatus::AuthFailure => "authentication failure",
            BluetoothStatus::RmtDevDown => "remote device down",
            BluetoothStatus::AuthRejected => "authentication rejected",
        };
        f.write_str(name)
    }
}

impl Pack for BluetoothStatus {
    fn pack(&self, pdu: &mut Pdu) -> Result<(), CodecError> {
        self.as_u8().pack(pdu)
    }
}

impl Unpack for BluetoothStatus {
    fn unpack(pdu: &mut Pdu) -> Result<Self, CodecError> {
        BluetoothStatus::from_u8(u8::unpack(pdu)?)
    }
}

/// Link selection for connect commands, carried as a 4-byte integer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum LinkTransport {
    Auto = 0,
    BrEdr = 1,
    Le = 2,
}

impl Pack for LinkTransport {
    fn pack(&self, pdu: &mut Pdu) -> Result<(), CodecError> {
        (*self as i32).pack(pdu)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeviceType {
    BrEdr = 1,
    Ble = 2,
    Dual = 3,
}

impl DeviceType {
    pub fn from_u8(value: u8) -> Result<Self, CodecError> {
        match value {
            1 => Ok(DeviceType::BrEdr),
            2 => Ok(DeviceType::Ble),
            3 => Ok(DeviceType::Dual),
            other => Err(CodecError::InvalidValue {
                field: "device type",
                value: other as i64,
            }),
        }
    }
}

impl Unpack for DeviceType {
    fn unpack(pdu: &mut Pdu) -> Result<Self, CodecError> {
        DeviceType::from_u8(u8::unpack(pdu)?)
    }
}
