//! Typed records with content encoding and decoding.
//!
//! A [`Record`] is one framed protocol unit. Its [`Body`] carries the
//! type-specific content already parsed:
//!
//! | Type | Content |
//! |---|---|
//! | BEGIN_REQUEST | role u16, flags u8, 5 reserved |
//! | ABORT_REQUEST | empty |
//! | END_REQUEST | appStatus u32, protocolStatus u8, 3 reserved |
//! | PARAMS, GET_VALUES, GET_VALUES_RESULT | name-value pairs |
//! | STDIN, STDOUT, STDERR, DATA | opaque bytes |
//! | UNKNOWN_TYPE | unknownType u8, 7 reserved |
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use fcgi_worker::protocol::{Body, Record};
//!
//! let record = Record::new(1, Body::Stdout(Bytes::from_static(b"hello")));
//! let wire = record.encode().unwrap();
//! assert_eq!(wire.len(), 16); // 8 header + 5 content + 3 padding
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::name_value::{decode_pairs, encode_pairs, NameValuePair};
use super::wire_format::{
    padding_for, Header, ProtocolStatus, RecordType, Role, FLAG_KEEP_CONN, HEADER_SIZE,
    MAX_CONTENT_LENGTH, VERSION_1,
};
use crate::error::{FcgiError, Result};

/// Fixed content size of BEGIN_REQUEST, END_REQUEST and UNKNOWN_TYPE.
pub const FIXED_BODY_SIZE: usize = 8;

/// BEGIN_REQUEST content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeginRequest {
    /// Raw role code; may be undefined.
    pub role: u16,
    /// Flag bits (bit 0 = keep connection open).
    pub flags: u8,
}

impl BeginRequest {
    /// Create a BEGIN_REQUEST body for a known role.
    pub fn new(role: Role, keep_alive: bool) -> Self {
        Self {
            role: role.code(),
            flags: if keep_alive { FLAG_KEEP_CONN } else { 0 },
        }
    }

    /// Known role, `None` for undefined codes.
    #[inline]
    pub fn role(&self) -> Option<Role> {
        Role::from_u16(self.role)
    }

    /// Whether the front end wants the connection kept open.
    #[inline]
    pub fn keep_alive(&self) -> bool {
        self.flags & FLAG_KEEP_CONN != 0
    }
}

/// END_REQUEST content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndRequest {
    /// Application exit status.
    pub app_status: u32,
    /// Raw protocol status code; may be undefined.
    pub protocol_status: u8,
}

impl EndRequest {
    /// Create an END_REQUEST body.
    pub fn new(app_status: u32, protocol_status: ProtocolStatus) -> Self {
        Self {
            app_status,
            protocol_status: protocol_status.code(),
        }
    }

    /// Known protocol status, `None` for undefined codes.
    #[inline]
    pub fn status(&self) -> Option<ProtocolStatus> {
        ProtocolStatus::from_u8(self.protocol_status)
    }
}

/// Type-specific record content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    BeginRequest(BeginRequest),
    AbortRequest,
    EndRequest(EndRequest),
    Params(Vec<NameValuePair>),
    Stdin(Bytes),
    Stdout(Bytes),
    Stderr(Bytes),
    Data(Bytes),
    GetValues(Vec<NameValuePair>),
    GetValuesResult(Vec<NameValuePair>),
    /// Reply to a management record of a type the application does not handle.
    UnknownType(u8),
    /// A type code outside the protocol; content kept as-is.
    Unrecognized { record_type: u8, content: Bytes },
}

impl Body {
    /// Raw type code of this body.
    pub fn record_type(&self) -> u8 {
        let ty = match self {
            Body::BeginRequest(_) => RecordType::BeginRequest,
            Body::AbortRequest => RecordType::AbortRequest,
            Body::EndRequest(_) => RecordType::EndRequest,
            Body::Params(_) => RecordType::Params,
            Body::Stdin(_) => RecordType::Stdin,
            Body::Stdout(_) => RecordType::Stdout,
            Body::Stderr(_) => RecordType::Stderr,
            Body::Data(_) => RecordType::Data,
            Body::GetValues(_) => RecordType::GetValues,
            Body::GetValuesResult(_) => RecordType::GetValuesResult,
            Body::UnknownType(_) => RecordType::UnknownType,
            Body::Unrecognized { record_type, .. } => return *record_type,
        };
        ty.code()
    }

    /// Build a stream body of the given type.
    ///
    /// Returns `None` if `ty` is not a byte stream (PARAMS carries pairs).
    pub fn stream(ty: RecordType, data: Bytes) -> Option<Self> {
        match ty {
            RecordType::Stdin => Some(Body::Stdin(data)),
            RecordType::Stdout => Some(Body::Stdout(data)),
            RecordType::Stderr => Some(Body::Stderr(data)),
            RecordType::Data => Some(Body::Data(data)),
            _ => None,
        }
    }

    /// Check if this is the empty record terminating a stream.
    pub fn is_end_of_stream(&self) -> bool {
        match self {
            Body::Params(pairs) => pairs.is_empty(),
            Body::Stdin(data) | Body::Stdout(data) | Body::Stderr(data) | Body::Data(data) => {
                data.is_empty()
            }
            _ => false,
        }
    }

    fn encode_content(&self, buf: &mut BytesMut) {
        match self {
            Body::BeginRequest(begin) => {
                buf.put_u16(begin.role);
                buf.put_u8(begin.flags);
                buf.put_bytes(0, 5);
            }
            Body::AbortRequest => {}
            Body::EndRequest(end) => {
                buf.put_u32(end.app_status);
                buf.put_u8(end.protocol_status);
                buf.put_bytes(0, 3);
            }
            Body::Params(pairs) | Body::GetValues(pairs) | Body::GetValuesResult(pairs) => {
                encode_pairs(pairs, buf);
            }
            Body::Stdin(data) | Body::Stdout(data) | Body::Stderr(data) | Body::Data(data) => {
                buf.extend_from_slice(data);
            }
            Body::UnknownType(code) => {
                buf.put_u8(*code);
                buf.put_bytes(0, 7);
            }
            Body::Unrecognized { content, .. } => buf.extend_from_slice(content),
        }
    }
}

/// A complete protocol record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Protocol version (always 1 for records built here).
    pub version: u8,
    /// Request identifier (0 = management).
    pub request_id: u16,
    /// Parsed content.
    pub body: Body,
}

impl Record {
    /// Create a version 1 record.
    pub fn new(request_id: u16, body: Body) -> Self {
        Self {
            version: VERSION_1,
            request_id,
            body,
        }
    }

    /// BEGIN_REQUEST for `role`.
    pub fn begin_request(request_id: u16, role: Role, keep_alive: bool) -> Self {
        Self::new(request_id, Body::BeginRequest(BeginRequest::new(role, keep_alive)))
    }

    /// END_REQUEST with the given statuses.
    pub fn end_request(request_id: u16, app_status: u32, protocol_status: ProtocolStatus) -> Self {
        Self::new(
            request_id,
            Body::EndRequest(EndRequest::new(app_status, protocol_status)),
        )
    }

    /// Raw type code.
    #[inline]
    pub fn record_type(&self) -> u8 {
        self.body.record_type()
    }

    /// Encode to a freshly allocated buffer.
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Append header, content and zeroed padding to `buf`.
    ///
    /// On error `buf` is left as it was.
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        let start = buf.len();
        buf.put_bytes(0, HEADER_SIZE);
        self.body.encode_content(buf);

        let content_length = buf.len() - start - HEADER_SIZE;
        if content_length > MAX_CONTENT_LENGTH {
            buf.truncate(start);
            return Err(FcgiError::ContentTooLarge(content_length));
        }

        let header = Header {
            version: self.version,
            record_type: self.record_type(),
            request_id: self.request_id,
            content_length: content_length as u16,
            padding_length: padding_for(content_length),
        };
        header.encode_into(&mut buf[start..start + HEADER_SIZE]);
        buf.put_bytes(0, header.padding_length as usize);
        Ok(())
    }

    /// Parse `content` according to the type named in `header`.
    ///
    /// Padding must already be stripped from `content`.
    pub fn decode(header: &Header, content: Bytes) -> Result<Self> {
        let request_id = header.request_id;
        let fixed = |content: &Bytes| -> Result<()> {
            if content.len() < FIXED_BODY_SIZE {
                return Err(FcgiError::framing(
                    header.record_type,
                    request_id,
                    format!(
                        "content is {} bytes, type requires {}",
                        content.len(),
                        FIXED_BODY_SIZE
                    ),
                ));
            }
            Ok(())
        };
        let pairs = |content: &Bytes| -> Result<Vec<NameValuePair>> {
            decode_pairs(content)
                .map_err(|e| FcgiError::framing(header.record_type, request_id, e.to_string()))
        };

        let body = match header.known_type() {
            Some(RecordType::BeginRequest) => {
                fixed(&content)?;
                Body::BeginRequest(BeginRequest {
                    role: u16::from_be_bytes([content[0], content[1]]),
                    flags: content[2],
                })
            }
            Some(RecordType::AbortRequest) => Body::AbortRequest,
            Some(RecordType::EndRequest) => {
                fixed(&content)?;
                Body::EndRequest(EndRequest {
                    app_status: u32::from_be_bytes([content[0], content[1], content[2], content[3]]),
                    protocol_status: content[4],
                })
            }
            Some(RecordType::Params) => Body::Params(pairs(&content)?),
            Some(RecordType::Stdin) => Body::Stdin(content),
            Some(RecordType::Stdout) => Body::Stdout(content),
            Some(RecordType::Stderr) => Body::Stderr(content),
            Some(RecordType::Data) => Body::Data(content),
            Some(RecordType::GetValues) => Body::GetValues(pairs(&content)?),
            Some(RecordType::GetValuesResult) => Body::GetValuesResult(pairs(&content)?),
            Some(RecordType::UnknownType) => {
                fixed(&content)?;
                Body::UnknownType(content[0])
            }
            None => Body::Unrecognized {
                record_type: header.record_type,
                content,
            },
        };

        Ok(Self {
            version: header.version,
            request_id,
            body,
        })
    }
}
