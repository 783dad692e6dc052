//! GATT wire types
//!
//! Strongly-typed values that travel in GATT commands and notifications.

use crate::codec::{len_u8, CodecError, Pack, Unpack};
use crate::pdu::Pdu;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The handle of a given ATT attribute
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AttHandle(pub u16);

impl Pack for AttHandle {
    fn pack(&self, pdu: &mut Pdu) -> Result<(), CodecError> {
        self.0.pack(pdu)
    }
}

impl Unpack for AttHandle {
    fn unpack(pdu: &mut Pdu) -> Result<Self, CodecError> {
        Ok(AttHandle(u16::unpack(pdu)?))
    }
}

impl fmt::Display for AttHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// ATT-level status carried as a 4-byte integer in notifications.
/// The space is open; unknown values pass through unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GattStatus(pub i32);

impl GattStatus {
    pub const SUCCESS: GattStatus = GattStatus(0x00);
    pub const INVALID_HANDLE: GattStatus = GattStatus(0x01);
    pub const READ_NOT_PERMITTED: GattStatus = GattStatus(0x02);
    pub const WRITE_NOT_PERMITTED: GattStatus = GattStatus(0x03);
    pub const INSUFFICIENT_AUTHENTICATION: GattStatus = GattStatus(0x05);
    pub const REQUEST_NOT_SUPPORTED: GattStatus = GattStatus(0x06);
    pub const INVALID_OFFSET: GattStatus = GattStatus(0x07);
    pub const INSUFFICIENT_AUTHORIZATION: GattStatus = GattStatus(0x08);
    pub const ATTRIBUTE_NOT_FOUND: GattStatus = GattStatus(0x0a);
    pub const INSUFFICIENT_ENCRYPTION: GattStatus = GattStatus(0x0f);
    pub const ERROR: GattStatus = GattStatus(0x85);

    pub fn is_success(&self) -> bool {
        *self == Self::SUCCESS
    }

    /// Statuses that may succeed when reissued with MITM protection
    pub fn needs_authentication(&self) -> bool {
        *self == Self::INSUFFICIENT_AUTHENTICATION || *self == Self::INSUFFICIENT_ENCRYPTION
    }
}

impl fmt::Display for GattStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GATT status {:#04x}", self.0)
    }
}

impl Pack for GattStatus {
    fn pack(&self, pdu: &mut Pdu) -> Result<(), CodecError> {
        self.0.pack(pdu)
    }
}

impl Unpack for GattStatus {
    fn unpack(pdu: &mut Pdu) -> Result<Self, CodecError> {
        Ok(GattStatus(i32::unpack(pdu)?))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum GattAuthReq {
    None = 0,
    NoMitm = 1,
    Mitm = 2,
    SignedNoMitm = 3,
    SignedMitm = 4,
}

impl Pack for GattAuthReq {
    fn pack(&self, pdu: &mut Pdu) -> Result<(), CodecError> {
        (*self as i32).pack(pdu)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum GattWriteType {
    NoResponse = 1,
    Normal = 2,
    Prepare = 3,
    Signed = 4,
}

impl Pack for GattWriteType {
    fn pack(&self, pdu: &mut Pdu) -> Result<(), CodecError> {
        (*self as i32).pack(pdu)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum GattAttrType {
    PrimaryService = 0,
    SecondaryService = 1,
    IncludedService = 2,
    Characteristic = 3,
    Descriptor = 4,
}

impl GattAttrType {
    pub fn from_i32(value: i32) -> Result<Self, CodecError> {
        match value {
            0 => Ok(GattAttrType::PrimaryService),
            1 => Ok(GattAttrType::SecondaryService),
            2 => Ok(GattAttrType::IncludedService),
            3 => Ok(GattAttrType::Characteristic),
            4 => Ok(GattAttrType::Descriptor),
            other => Err(CodecError::InvalidValue {
                field: "attribute type",
                value: other as i64,
            }),
        }
    }
}

/// One entry of a GATT database as exchanged with the daemon.
///
/// Wire layout (31 bytes): id u16, uuid (natural order), type i32,
/// handle u16, start handle u16, end handle u16, properties u8,
/// permissions u16.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GattDbElement {
    pub id: u16,
    pub uuid: Uuid,
    pub attr_type: GattAttrType,
    pub handle: AttHandle,
    pub start_handle: AttHandle,
    pub end_handle: AttHandle,
    pub properties: u8,
    pub permissions: u16,
}

impl GattDbElement {
    pub const WIRE_SIZE: usize = 31;

    pub fn new(attr_type: GattAttrType, uuid: Uuid) -> Self {
        Self {
            id: 0,
            uuid,
            attr_type,
            handle: AttHandle::default(),
            start_handle: AttHandle::default(),
            end_handle: AttHandle::default(),
            properties: 0,
            permissions: 0,
        }
    }
}

impl Pack for GattDbElement {
    fn pack(&self, pdu: &mut Pdu) -> Result<(), CodecError> {
        pdu.put(&self.id)?;
        pdu.put(&self.uuid)?;
        pdu.put(&(self.attr_type as i32))?;
        pdu.put(&self.handle)?;
        pdu.put(&self.start_handle)?;
        pdu.put(&self.end_handle)?;
        pdu.put(&self.properties)?;
        pdu.put(&self.permissions)
    }
}

impl Unpack for GattDbElement {
    fn unpack(pdu: &mut Pdu) -> Result<Self, CodecError> {
        Ok(Self {
            id: pdu.get()?,
            uuid: pdu.get()?,
            attr_type: GattAttrType::from_i32(pdu.get()?)?,
            handle: pdu.get()?,
            start_handle: pdu.get()?,
            end_handle: pdu.get()?,
            properties: pdu.get()?,
            permissions: pdu.get()?,
        })
    }
}

/// Server reply to a remote read or write request
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct GattResponse {
    pub handle: AttHandle,
    pub offset: u16,
    pub auth_req: u8,
    pub value: Vec<u8>,
}

impl GattResponse {
    /// Largest value the daemon accepts in a send-response command
    pub const MAX_VALUE_LEN: usize = 600;
}

/// Fixed advertising parameters sent with every start-advertising command
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvertisingParams {
    /// Minimum interval in 0.625 ms units
    pub min_interval: u32,
    /// Maximum interval in 0.625 ms units
    pub max_interval: u32,
    /// Bitmask of channels 37, 38 and 39
    pub channel_map: u8,
    pub tx_power: i8,
    pub primary_phy: u8,
    pub secondary_phy: u8,
    /// Advertising duration in 10 ms units, 0 for no limit
    pub timeout: i32,
}

impl Default for AdvertisingParams {
    fn default() -> Self {
        Self {
            min_interval: 1600,
            max_interval: 1700,
            channel_map: 0x07,
            tx_power: -7,
            primary_phy: 0x01,
            secondary_phy: 0x01,
            timeout: 0,
        }
    }
}

const AD_COMPLETE_128_UUIDS: u8 = 0x07;
const AD_COMPLETE_LOCAL_NAME: u8 = 0x09;
const AD_TX_POWER_LEVEL: u8 = 0x0a;
const AD_APPEARANCE: u8 = 0x19;
const AD_SERVICE_DATA_128: u8 = 0x21;
const AD_MANUFACTURER_DATA: u8 = 0xff;

/// Legacy advertising payload limit
pub const MAX_LEGACY_ADV_LEN: usize = 31;

/// Caller-facing description of an advertisement or scan response
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct AdvertiseData {
    pub local_name: Option<String>,
    pub include_tx_power: bool,
    pub appearance: Option<u16>,
    pub service_uuids: Vec<Uuid>,
    pub service_data: Option<(Uuid, Vec<u8>)>,
    pub manufacturer_data: Option<(u16, Vec<u8>)>,
}

impl AdvertiseData {
    pub fn is_empty(&self) -> bool {
        self.local_name.is_none()
            && !self.include_tx_power
            && self.appearance.is_none()
            && self.service_uuids.is_empty()
            && self.service_data.is_none()
            && self.manufacturer_data.is_none()
    }

    /// Serialize into AD structures (`len`, `type`, `data`).
    /// 128-bit UUIDs inside AD structures are little-endian on air.
    pub fn encode(&self, tx_power: i8) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();

        if let Some(name) = &self.local_name {
            push_ad(&mut out, AD_COMPLETE_LOCAL_NAME, name.as_bytes())?;
        }
        if self.include_tx_power {
            push_ad(&mut out, AD_TX_POWER_LEVEL, &tx_power.to_le_bytes())?;
        }
        if let Some(appearance) = self.appearance {
            push_ad(&mut out, AD_APPEARANCE, &appearance.to_le_bytes())?;
        }
        if !self.service_uuids.is_empty() {
            let mut uuids = Vec::with_capacity(16 * self.service_uuids.len());
            for uuid in &self.service_uuids {
                uuids.extend_from_slice(&reversed(uuid));
            }
            push_ad(&mut out, AD_COMPLETE_128_UUIDS, &uuids)?;
        }
        if let Some((uuid, data)) = &self.service_data {
            let mut body = reversed(uuid).to_vec();
            body.extend_from_slice(data);
            push_ad(&mut out, AD_SERVICE_DATA_128, &body)?;
        }
        if let Some((company, data)) = &self.manufacturer_data {
            let mut body = company.to_le_bytes().to_vec();
            body.extend_from_slice(data);
            push_ad(&mut out, AD_MANUFACTURER_DATA, &body)?;
        }

        if out.len() > MAX_LEGACY_ADV_LEN {
            return Err(CodecError::ValueTooLong {
                field: "advertising data",
                len: out.len(),
                max: MAX_LEGACY_ADV_LEN,
            });
        }
        Ok(out)
    }
}

fn reversed(uuid: &Uuid) -> [u8; 16] {
    let mut bytes = *uuid.as_bytes();
    bytes.reverse();
    bytes
}

fn push_ad(out: &mut Vec<u8>, ad_type: u8, data: &[u8]) -> Result<(), CodecError> {
    out.push(len_u8("AD structure", data.len() + 1)?);
    out.push(ad_type);
    out.extend_from_slice(data);
    Ok(())
}
