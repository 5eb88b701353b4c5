//! Wire format encoding and decoding.
//!
//! Implements the 8-byte record header:
//! ```text
//! ┌─────────┬──────┬────────────┬───────────────┬─────────┬──────────┐
//! │ Version │ Type │ Request ID │ ContentLength │ Padding │ Reserved │
//! │ 1 byte  │1 byte│ 2 bytes    │ 2 bytes       │ 1 byte  │ 1 byte   │
//! │         │      │ uint16 BE  │ uint16 BE     │         │          │
//! └─────────┴──────┴────────────┴───────────────┴─────────┴──────────┘
//! ```
//!
//! Content and padding follow the header. Padding is chosen so that the
//! whole record is a multiple of 8 bytes.

/// Header size in bytes (fixed, exactly 8).
pub const HEADER_SIZE: usize = 8;

/// The only protocol version this crate speaks.
pub const VERSION_1: u8 = 1;

/// Largest content length expressible in the header.
pub const MAX_CONTENT_LENGTH: usize = u16::MAX as usize;

/// Request id reserved for management records.
pub const MANAGEMENT_REQUEST_ID: u16 = 0;

/// BEGIN_REQUEST flag bit: keep the connection open after the request.
pub const FLAG_KEEP_CONN: u8 = 0b0000_0001;

/// Record type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordType {
    BeginRequest = 1,
    AbortRequest = 2,
    EndRequest = 3,
    Params = 4,
    Stdin = 5,
    Stdout = 6,
    Stderr = 7,
    Data = 8,
    GetValues = 9,
    GetValuesResult = 10,
    UnknownType = 11,
}

impl RecordType {
    /// Map a raw type code to a known record type.
    pub fn from_u8(code: u8) -> Option<Self> {
        Some(match code {
            1 => Self::BeginRequest,
            2 => Self::AbortRequest,
            3 => Self::EndRequest,
            4 => Self::Params,
            5 => Self::Stdin,
            6 => Self::Stdout,
            7 => Self::Stderr,
            8 => Self::Data,
            9 => Self::GetValues,
            10 => Self::GetValuesResult,
            11 => Self::UnknownType,
            _ => return None,
        })
    }

    /// Raw type code.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Stream types are terminated by an empty-content record.
    #[inline]
    pub fn is_stream(self) -> bool {
        matches!(
            self,
            Self::Params | Self::Stdin | Self::Stdout | Self::Stderr | Self::Data
        )
    }
}

/// Application role requested by BEGIN_REQUEST.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Role {
    Responder = 1,
    Authorizer = 2,
    Filter = 3,
}

impl Role {
    /// All roles defined by the protocol.
    pub const ALL: [Role; 3] = [Role::Responder, Role::Authorizer, Role::Filter];

    /// Map a raw role code, `None` for undefined codes.
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            1 => Some(Self::Responder),
            2 => Some(Self::Authorizer),
            3 => Some(Self::Filter),
            _ => None,
        }
    }

    /// Raw role code.
    #[inline]
    pub fn code(self) -> u16 {
        self as u16
    }
}

/// Protocol-level completion status carried by END_REQUEST.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProtocolStatus {
    RequestComplete = 0,
    CantMpxConn = 1,
    Overloaded = 2,
    UnknownRole = 3,
}

impl ProtocolStatus {
    /// Map a raw status code.
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::RequestComplete),
            1 => Some(Self::CantMpxConn),
            2 => Some(Self::Overloaded),
            3 => Some(Self::UnknownRole),
            _ => None,
        }
    }

    /// Raw status code.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Padding needed after `content_length` bytes of content.
#[inline]
pub fn padding_for(content_length: usize) -> u8 {
    ((8 - content_length % 8) % 8) as u8
}

/// Decoded record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Protocol version.
    pub version: u8,
    /// Raw record type code (may be unknown to this crate).
    pub record_type: u8,
    /// Request identifier (0 = management).
    pub request_id: u16,
    /// Content length in bytes.
    pub content_length: u16,
    /// Padding length in bytes.
    pub padding_length: u8,
}

impl Header {
    /// Create a version 1 header with padding derived from the content length.
    pub fn new(record_type: u8, request_id: u16, content_length: u16) -> Self {
        Self {
            version: VERSION_1,
            record_type,
            request_id,
            content_length,
            padding_length: padding_for(content_length as usize),
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use fcgi_worker::protocol::{Header, RecordType};
    ///
    /// let header = Header::new(RecordType::Stdout.code(), 1, 5);
    /// let bytes = header.encode();
    /// assert_eq!(bytes, [1, 6, 0, 1, 0, 5, 3, 0]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (8 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0] = self.version;
        buf[1] = self.record_type;
        buf[2..4].copy_from_slice(&self.request_id.to_be_bytes());
        buf[4..6].copy_from_slice(&self.content_length.to_be_bytes());
        buf[6] = self.padding_length;
        buf[7] = 0;
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            version: buf[0],
            record_type: buf[1],
            request_id: u16::from_be_bytes([buf[2], buf[3]]),
            content_length: u16::from_be_bytes([buf[4], buf[5]]),
            padding_length: buf[6],
        })
    }

    /// Number of bytes following the header (content + padding).
    #[inline]
    pub fn body_length(&self) -> usize {
        self.content_length as usize + self.padding_length as usize
    }

    /// Known record type, if any.
    #[inline]
    pub fn known_type(&self) -> Option<RecordType> {
        RecordType::from_u8(self.record_type)
    }

    /// Check if this header addresses the management channel.
    #[inline]
    pub fn is_management(&self) -> bool {
        self.request_id == MANAGEMENT_REQUEST_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let original = Header::new(RecordType::Params.code(), 42, 100);
        let encoded = original.encode();
        let decoded = Header::decode(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_header_big_endian_byte_order() {
        let header = Header {
            version: 1,
            record_type: 5,
            request_id: 0x0102,
            content_length: 0x0304,
            padding_length: 4,
        };
        let bytes = header.encode();

        assert_eq!(bytes[0], 1);
        assert_eq!(bytes[1], 5);
        assert_eq!(bytes[2], 0x01);
        assert_eq!(bytes[3], 0x02);
        assert_eq!(bytes[4], 0x03);
        assert_eq!(bytes[5], 0x04);
        assert_eq!(bytes[6], 4);
        // Reserved
        assert_eq!(bytes[7], 0);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        let buf = [0u8; 7];
        assert!(Header::decode(&buf).is_none());
    }

    #[test]
    fn test_padding_for() {
        assert_eq!(padding_for(0), 0);
        assert_eq!(padding_for(1), 7);
        assert_eq!(padding_for(7), 1);
        assert_eq!(padding_for(8), 0);
        assert_eq!(padding_for(13), 3);
        assert_eq!(padding_for(MAX_CONTENT_LENGTH), 1);
    }

    #[test]
    fn test_header_new_derives_padding() {
        let header = Header::new(RecordType::Stdout.code(), 1, 13);
        assert_eq!(header.padding_length, 3);
        assert_eq!(HEADER_SIZE + header.body_length(), 24);
    }

    #[test]
    fn test_record_type_codes() {
        for code in 1..=11u8 {
            let ty = RecordType::from_u8(code).unwrap();
            assert_eq!(ty.code(), code);
        }
        assert!(RecordType::from_u8(0).is_none());
        assert!(RecordType::from_u8(12).is_none());
    }

    #[test]
    fn test_stream_types() {
        assert!(RecordType::Params.is_stream());
        assert!(RecordType::Stdin.is_stream());
        assert!(RecordType::Data.is_stream());
        assert!(RecordType::Stdout.is_stream());
        assert!(RecordType::Stderr.is_stream());
        assert!(!RecordType::BeginRequest.is_stream());
        assert!(!RecordType::GetValues.is_stream());
    }

    #[test]
    fn test_role_codes() {
        assert_eq!(Role::from_u16(1), Some(Role::Responder));
        assert_eq!(Role::from_u16(2), Some(Role::Authorizer));
        assert_eq!(Role::from_u16(3), Some(Role::Filter));
        assert_eq!(Role::from_u16(0), None);
        assert_eq!(Role::from_u16(4), None);
    }

    #[test]
    fn test_protocol_status_codes() {
        assert_eq!(ProtocolStatus::RequestComplete.code(), 0);
        assert_eq!(ProtocolStatus::CantMpxConn.code(), 1);
        assert_eq!(ProtocolStatus::Overloaded.code(), 2);
        assert_eq!(ProtocolStatus::UnknownRole.code(), 3);
        assert_eq!(ProtocolStatus::from_u8(4), None);
    }

    #[test]
    fn test_management_header() {
        let header = Header::new(RecordType::GetValues.code(), MANAGEMENT_REQUEST_ID, 0);
        assert!(header.is_management());
        assert_eq!(header.known_type(), Some(RecordType::GetValues));
    }
}
