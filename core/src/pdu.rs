/// PDU: one framed daemon message with read/write cursors
use crate::codec::{CodecError, Pack, Unpack};
use tracing::warn;

/// Header layout (4 bytes):
/// [1 byte]  service id
/// [1 byte]  opcode (bit 7 set for notifications)
/// [2 bytes] payload length (LE u16)
pub const HEADER_SIZE: usize = 4;

/// Largest payload a single PDU can carry
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// Opcode bit selecting the notification path
pub const NOTIFICATION_BIT: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PduHeader {
    pub service: u8,
    pub opcode: u8,
    pub length: u16,
}

impl PduHeader {
    pub fn new(service: u8, opcode: u8, length: u16) -> Self {
        Self {
            service,
            opcode,
            length,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.opcode & NOTIFICATION_BIT != 0
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let len = self.length.to_le_bytes();
        [self.service, self.opcode, len[0], len[1]]
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < HEADER_SIZE {
            return Err(CodecError::Truncated {
                need: HEADER_SIZE,
                remaining: data.len(),
            });
        }
        Ok(Self {
            service: data[0],
            opcode: data[1],
            length: u16::from_le_bytes([data[2], data[3]]),
        })
    }
}

/// A single protocol message: header fields plus a payload buffer.
///
/// Outgoing PDUs are built by appending packed values; the header length is
/// computed from the payload when the frame is produced, so it always matches.
/// Incoming PDUs are consumed front-to-back through the read cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    service: u8,
    opcode: u8,
    payload: Vec<u8>,
    read_pos: usize,
}

impl Pdu {
    /// Start an empty outgoing PDU
    pub fn new(service: u8, opcode: u8) -> Self {
        Self {
            service,
            opcode,
            payload: Vec::new(),
            read_pos: 0,
        }
    }

    /// Rebuild an inbound PDU from its header and the payload bytes read
    /// off the wire. The declared length must match the payload size.
    pub fn from_parts(header: PduHeader, payload: Vec<u8>) -> Result<Self, CodecError> {
        if payload.len() != header.length as usize {
            return Err(CodecError::LengthMismatch {
                declared: header.length as usize,
                actual: payload.len(),
            });
        }
        Ok(Self {
            service: header.service,
            opcode: header.opcode,
            payload,
            read_pos: 0,
        })
    }

    /// Parse one complete frame (header + payload)
    pub fn from_frame(data: &[u8]) -> Result<Self, CodecError> {
        let header = PduHeader::from_bytes(data)?;
        let end = HEADER_SIZE + header.length as usize;
        if data.len() < end {
            return Err(CodecError::Truncated {
                need: end,
                remaining: data.len(),
            });
        }
        Self::from_parts(header, data[HEADER_SIZE..end].to_vec())
    }

    /// Serialize to a wire frame
    pub fn to_frame(&self) -> Result<Vec<u8>, CodecError> {
        let header = self.header()?;
        let mut frame = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        frame.extend_from_slice(&header.to_bytes());
        frame.extend_from_slice(&self.payload);
        Ok(frame)
    }

    pub fn header(&self) -> Result<PduHeader, CodecError> {
        let length = u16::try_from(self.payload.len())
            .map_err(|_| CodecError::PayloadTooLarge(self.payload.len()))?;
        Ok(PduHeader::new(self.service, self.opcode, length))
    }

    pub fn service(&self) -> u8 {
        self.service
    }

    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    pub fn is_notification(&self) -> bool {
        self.opcode & NOTIFICATION_BIT != 0
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Bytes not yet consumed by the read cursor
    pub fn remaining(&self) -> usize {
        self.payload.len() - self.read_pos
    }

    /// Append raw bytes to the payload
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        let new_len = self.payload.len() + bytes.len();
        if new_len > MAX_PAYLOAD {
            return Err(CodecError::PayloadTooLarge(new_len));
        }
        self.payload.extend_from_slice(bytes);
        Ok(())
    }

    /// Consume exactly `n` bytes from the read cursor
    pub fn take(&mut self, n: usize) -> Result<&[u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::Truncated {
                need: n,
                remaining: self.remaining(),
            });
        }
        let start = self.read_pos;
        self.read_pos += n;
        Ok(&self.payload[start..self.read_pos])
    }

    /// Consume exactly `N` bytes into a fixed array
    pub fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Pack a value onto the end of the payload
    pub fn put<T: Pack + ?Sized>(&mut self, value: &T) -> Result<(), CodecError> {
        value.pack(self)
    }

    /// Unpack the next value from the read cursor
    pub fn get<T: Unpack>(&mut self) -> Result<T, CodecError> {
        T::unpack(self)
    }

    /// Unpack a raw byte buffer whose length was carried by an earlier field
    pub fn get_bytes(&mut self, len: usize) -> Result<Vec<u8>, CodecError> {
        Ok(self.take(len)?.to_vec())
    }

    /// Log unconsumed bytes after a structured unpack. The daemon may append
    /// fields in newer versions, so this never fails.
    pub fn warn_trailing(&self) {
        if self.remaining() > 0 {
            warn!(
                service = self.service,
                opcode = self.opcode,
                trailing = self.remaining(),
                "trailing data after unpacking PDU"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_bytes() {
        let header = PduHeader::new(0x09, 0x81, 0x0102);
        assert_eq!(header.to_bytes(), [0x09, 0x81, 0x02, 0x01]);
        assert_eq!(PduHeader::from_bytes(&header.to_bytes()).unwrap(), header);
        assert!(header.is_notification());
        assert!(!PduHeader::new(0x09, 0x7f, 0).is_notification());
    }

    #[test]
    fn test_frame_length_matches_payload() {
        let mut pdu = Pdu::new(0x09, 0x02);
        pdu.put(&7i32).unwrap();
        let frame = pdu.to_frame().unwrap();
        assert_eq!(frame, vec![0x09, 0x02, 0x04, 0x00, 0x07, 0x00, 0x00, 0x00]);

        let parsed = Pdu::from_frame(&frame).unwrap();
        assert_eq!(parsed.service(), 0x09);
        assert_eq!(parsed.opcode(), 0x02);
        assert_eq!(parsed.payload(), &[0x07, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_from_frame_truncated() {
        let err = Pdu::from_frame(&[0x09, 0x02, 0x04, 0x00, 0x07]).unwrap_err();
        assert_eq!(err, CodecError::Truncated { need: 8, remaining: 5 });
        assert!(Pdu::from_frame(&[0x09]).is_err());
    }

    #[test]
    fn test_from_parts_rejects_length_mismatch() {
        let header = PduHeader::new(0x09, 0x01, 3);
        assert!(Pdu::from_parts(header, vec![1, 2]).is_err());
    }

    #[test]
    fn test_take_past_end() {
        let mut pdu = Pdu::from_parts(PduHeader::new(0, 0, 2), vec![1, 2]).unwrap();
        assert_eq!(pdu.take(1).unwrap(), &[1]);
        assert_eq!(
            pdu.take(2).unwrap_err(),
            CodecError::Truncated { need: 2, remaining: 1 }
        );
        // A failed take leaves the cursor where it was
        assert_eq!(pdu.remaining(), 1);
    }

    #[test]
    fn test_append_rejects_oversized_payload() {
        let mut pdu = Pdu::new(0x09, 0x0a);
        pdu.append(&vec![0u8; MAX_PAYLOAD]).unwrap();
        assert!(matches!(
            pdu.append(&[0]),
            Err(CodecError::PayloadTooLarge(_))
        ));
        assert_eq!(pdu.len(), MAX_PAYLOAD);
    }
}
