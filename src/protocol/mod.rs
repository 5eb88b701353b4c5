//! Protocol module - wire format, records and name-value pairs.
//!
//! This module implements the binary record layer:
//! - 8-byte header encoding/decoding
//! - Typed record content (one variant per record type)
//! - Name-value pair codec for PARAMS and GET_VALUES
//! - Exact-read record I/O over async transports
//! - Record buffer for push-style parsing

mod io;
mod name_value;
mod record;
mod record_buffer;
mod wire_format;

pub use io::{read_record, write_encoded, write_record};
pub use name_value::{
    decode_length, decode_pairs, encode_length, encode_pairs, encoded_len, length_size,
    NameValuePair, PairError, MAX_LENGTH, MAX_SHORT_LENGTH,
};
pub use record::{BeginRequest, Body, EndRequest, Record, FIXED_BODY_SIZE};
pub use record_buffer::RecordBuffer;
pub use wire_format::{
    padding_for, Header, ProtocolStatus, RecordType, Role, FLAG_KEEP_CONN, HEADER_SIZE,
    MANAGEMENT_REQUEST_ID, MAX_CONTENT_LENGTH, VERSION_1,
};
