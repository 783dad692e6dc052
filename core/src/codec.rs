//! Pack/Unpack: composable wire encodings over a [`Pdu`]
//!
//! Every integer is little-endian. Types that need a non-default encoding on
//! particular opcodes get a wrapper:
//! - [`BoolI32`]: a boolean carried as a 4-byte integer (plain `bool` is 1 byte)
//! - [`ReversedUuid`]: a 128-bit UUID with its byte order flipped
//! - [`Array16`]: a `u16` element count followed by the elements
//!
//! `unpack` consumes exactly the bytes the matching `pack` wrote.

use crate::pdu::Pdu;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("PDU truncated: need {need} bytes, {remaining} remaining")]
    Truncated { need: usize, remaining: usize },

    #[error("Payload too large: {0} bytes (max 65535)")]
    PayloadTooLarge(usize),

    #[error("Declared length {declared} does not match payload size {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Array too long: {0} elements")]
    ArrayTooLong(usize),

    #[error("Value for {field} too long: {len} bytes (max {max})")]
    ValueTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: i64 },
}

/// Append a canonical wire representation to a PDU
pub trait Pack {
    fn pack(&self, pdu: &mut Pdu) -> Result<(), CodecError>;
}

/// Consume a wire representation from a PDU's read cursor
pub trait Unpack: Sized {
    fn unpack(pdu: &mut Pdu) -> Result<Self, CodecError>;
}

macro_rules! impl_int {
    ($($ty:ty),*) => {$(
        impl Pack for $ty {
            fn pack(&self, pdu: &mut Pdu) -> Result<(), CodecError> {
                pdu.append(&self.to_le_bytes())
            }
        }

        impl Unpack for $ty {
            fn unpack(pdu: &mut Pdu) -> Result<Self, CodecError> {
                Ok(<$ty>::from_le_bytes(pdu.take_array()?))
            }
        }
    )*};
}

impl_int!(u8, i8, u16, i16, u32, i32, u64);

impl Pack for bool {
    fn pack(&self, pdu: &mut Pdu) -> Result<(), CodecError> {
        u8::from(*self).pack(pdu)
    }
}

impl Unpack for bool {
    fn unpack(pdu: &mut Pdu) -> Result<Self, CodecError> {
        Ok(u8::unpack(pdu)? != 0)
    }
}

/// Boolean carried as a 4-byte integer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoolI32(pub bool);

impl Pack for BoolI32 {
    fn pack(&self, pdu: &mut Pdu) -> Result<(), CodecError> {
        i32::from(self.0).pack(pdu)
    }
}

impl Unpack for BoolI32 {
    fn unpack(pdu: &mut Pdu) -> Result<Self, CodecError> {
        Ok(BoolI32(i32::unpack(pdu)? != 0))
    }
}

/// UUIDs travel in natural order unless an opcode asks for [`ReversedUuid`]
impl Pack for Uuid {
    fn pack(&self, pdu: &mut Pdu) -> Result<(), CodecError> {
        pdu.append(self.as_bytes())
    }
}

impl Unpack for Uuid {
    fn unpack(pdu: &mut Pdu) -> Result<Self, CodecError> {
        Ok(Uuid::from_bytes(pdu.take_array()?))
    }
}

/// 128-bit UUID with byte order flipped relative to natural order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReversedUuid(pub Uuid);

impl Pack for ReversedUuid {
    fn pack(&self, pdu: &mut Pdu) -> Result<(), CodecError> {
        let mut bytes = *self.0.as_bytes();
        bytes.reverse();
        pdu.append(&bytes)
    }
}

impl Unpack for ReversedUuid {
    fn unpack(pdu: &mut Pdu) -> Result<Self, CodecError> {
        let mut bytes: [u8; 16] = pdu.take_array()?;
        bytes.reverse();
        Ok(ReversedUuid(Uuid::from_bytes(bytes)))
    }
}

/// Length-prefixed array: `u16` count, then each element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Array16<T>(pub Vec<T>);

impl<T: Pack> Pack for Array16<T> {
    fn pack(&self, pdu: &mut Pdu) -> Result<(), CodecError> {
        let count =
            u16::try_from(self.0.len()).map_err(|_| CodecError::ArrayTooLong(self.0.len()))?;
        count.pack(pdu)?;
        self.0.iter().try_for_each(|item| item.pack(pdu))
    }
}

impl<T: Unpack> Unpack for Array16<T> {
    fn unpack(pdu: &mut Pdu) -> Result<Self, CodecError> {
        let count = u16::unpack(pdu)? as usize;
        let mut items = Vec::with_capacity(count.min(pdu.remaining()));
        for _ in 0..count {
            items.push(T::unpack(pdu)?);
        }
        Ok(Array16(items))
    }
}

impl<T: Pack + ?Sized> Pack for &T {
    fn pack(&self, pdu: &mut Pdu) -> Result<(), CodecError> {
        (**self).pack(pdu)
    }
}

macro_rules! impl_tuple {
    ($($name:ident),+) => {
        impl<$($name: Pack),+> Pack for ($($name,)+) {
            #[allow(non_snake_case)]
            fn pack(&self, pdu: &mut Pdu) -> Result<(), CodecError> {
                let ($($name,)+) = self;
                $($name.pack(pdu)?;)+
                Ok(())
            }
        }

        impl<$($name: Unpack),+> Unpack for ($($name,)+) {
            fn unpack(pdu: &mut Pdu) -> Result<Self, CodecError> {
                Ok(($($name::unpack(pdu)?,)+))
            }
        }
    };
}

impl_tuple!(A, B);
impl_tuple!(A, B, C);

/// Narrow a length to `u8`, failing on overflow
pub fn len_u8(field: &'static str, len: usize) -> Result<u8, CodecError> {
    u8::try_from(len).map_err(|_| CodecError::ValueTooLong {
        field,
        len,
        max: u8::MAX as usize,
    })
}

/// Narrow a length to `u16`, failing on overflow
pub fn len_u16(field: &'static str, len: usize) -> Result<u16, CodecError> {
    u16::try_from(len).map_err(|_| CodecError::ValueTooLong {
        field,
        len,
        max: u16::MAX as usize,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::PduHeader;
    use proptest::prelude::*;

    fn inbound(payload: Vec<u8>) -> Pdu {
        let header = PduHeader::new(0, 0x81, payload.len() as u16);
        Pdu::from_parts(header, payload).unwrap()
    }

    fn round_trip<T: Pack + Unpack>(value: &T, trailer: &[u8]) -> (T, usize) {
        let mut out = Pdu::new(0, 0x01);
        out.put(value).unwrap();
        out.append(trailer).unwrap();
        let mut back = inbound(out.payload().to_vec());
        let decoded = back.get::<T>().unwrap();
        (decoded, back.remaining())
    }

    #[test]
    fn test_little_endian_integers() {
        let mut pdu = Pdu::new(0, 0);
        pdu.put(&0x0102u16).unwrap();
        pdu.put(&-2i32).unwrap();
        assert_eq!(pdu.payload(), &[0x02, 0x01, 0xfe, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn test_bool_widths() {
        let mut pdu = Pdu::new(0, 0);
        pdu.put(&true).unwrap();
        pdu.put(&BoolI32(true)).unwrap();
        assert_eq!(pdu.payload(), &[1, 1, 0, 0, 0]);

        let mut back = inbound(vec![2, 0, 0, 0, 0]);
        assert!(back.get::<bool>().unwrap());
        assert_eq!(back.get::<BoolI32>().unwrap(), BoolI32(false));
    }

    #[test]
    fn test_reversed_uuid_flips_bytes() {
        let uuid = Uuid::from_bytes([
            0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
        ]);
        let mut pdu = Pdu::new(0, 0);
        pdu.put(&ReversedUuid(uuid)).unwrap();
        assert_eq!(
            pdu.payload(),
            &[15, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0]
        );

        let mut natural = Pdu::new(0, 0);
        natural.put(&uuid).unwrap();
        assert_eq!(natural.payload(), uuid.as_bytes());
    }

    #[test]
    fn test_array_prefix() {
        let mut pdu = Pdu::new(0, 0);
        pdu.put(&Array16(vec![0x11u8, 0x22])).unwrap();
        assert_eq!(pdu.payload(), &[2, 0, 0x11, 0x22]);
    }

    #[test]
    fn test_array_truncated_elements() {
        // Count says 3 but only 2 elements follow
        let mut pdu = inbound(vec![3, 0, 0x11, 0x22]);
        assert!(matches!(
            pdu.get::<Array16<u8>>(),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn test_unpack_empty_is_truncated() {
        let mut pdu = inbound(vec![]);
        assert_eq!(
            pdu.get::<i32>().unwrap_err(),
            CodecError::Truncated { need: 4, remaining: 0 }
        );
    }

    #[test]
    fn test_len_helpers() {
        assert_eq!(len_u8("text", 255).unwrap(), 255);
        assert!(len_u8("text", 256).is_err());
        assert_eq!(len_u16("value", 600).unwrap(), 600);
    }

    proptest! {
        #[test]
        fn prop_int_round_trip(a: u8, b: i8, c: u16, d: i32, e: u32, f: u64, trailer: Vec<u8>) {
            let trailer = &trailer[..trailer.len().min(32)];
            prop_assert_eq!(round_trip(&a, trailer), (a, trailer.len()));
            prop_assert_eq!(round_trip(&b, trailer), (b, trailer.len()));
            prop_assert_eq!(round_trip(&c, trailer), (c, trailer.len()));
            prop_assert_eq!(round_trip(&d, trailer), (d, trailer.len()));
            prop_assert_eq!(round_trip(&e, trailer), (e, trailer.len()));
            prop_assert_eq!(round_trip(&f, trailer), (f, trailer.len()));
        }

        #[test]
        fn prop_uuid_round_trip(bytes: [u8; 16], flag: bool) {
            let uuid = Uuid::from_bytes(bytes);
            prop_assert_eq!(round_trip(&uuid, &[]), (uuid, 0));
            prop_assert_eq!(round_trip(&ReversedUuid(uuid), &[0xaa]), (ReversedUuid(uuid), 1));
            prop_assert_eq!(round_trip(&BoolI32(flag), &[]), (BoolI32(flag), 0));
            prop_assert_eq!(round_trip(&flag, &[]), (flag, 0));
        }

        #[test]
        fn prop_array_round_trip(items: Vec<(u8, u16)>, trailer: Vec<u8>) {
            let items = Array16(items);
            let trailer = &trailer[..trailer.len().min(8)];
            prop_assert_eq!(round_trip(&items, trailer), (items.clone(), trailer.len()));
        }
    }
}
