//! Name-value pair encoding used by PARAMS, GET_VALUES and GET_VALUES_RESULT.
//!
//! Each pair is laid out as:
//! ```text
//! nameLength | valueLength | nameBytes | valueBytes
//! ```
//! A length below 128 is one byte. Anything longer is four bytes, Big
//! Endian, with the top bit of the first byte set; the low 31 bits hold
//! the real length.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Longest length that still fits the 1-byte form.
pub const MAX_SHORT_LENGTH: usize = 127;

/// Longest length expressible by the 4-byte form (31 bits).
pub const MAX_LENGTH: usize = 0x7FFF_FFFF;

/// Top bit marking the 4-byte length form.
const LONG_FORM_BIT: u8 = 0x80;

/// A single (name, value) pair. Either side may be empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NameValuePair {
    /// Raw name bytes.
    pub name: Bytes,
    /// Raw value bytes.
    pub value: Bytes,
}

impl NameValuePair {
    /// Create a new pair.
    pub fn new(name: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Create a pair with an empty value (GET_VALUES query form).
    pub fn name_only(name: impl Into<Bytes>) -> Self {
        Self::new(name, Bytes::new())
    }

    /// Number of bytes this pair occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        length_size(self.name.len()) + length_size(self.value.len()) + self.name.len() + self.value.len()
    }
}

/// Failure while decoding pairs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PairError {
    /// A length prefix runs past the end of the content.
    #[error("truncated length prefix at offset {offset}")]
    TruncatedLength { offset: usize },

    /// A name or value length points past the end of the content.
    #[error("pair at offset {offset} needs {needed} bytes, {available} available")]
    TruncatedData {
        offset: usize,
        needed: usize,
        available: usize,
    },
}

/// Size of the length prefix for a name or value of `len` bytes.
#[inline]
pub fn length_size(len: usize) -> usize {
    if len <= MAX_SHORT_LENGTH {
        1
    } else {
        4
    }
}

/// Append an encoded length to `buf`.
pub fn encode_length(len: usize, buf: &mut BytesMut) {
    debug_assert!(len <= MAX_LENGTH);
    if len <= MAX_SHORT_LENGTH {
        buf.put_u8(len as u8);
    } else {
        buf.put_u32(len as u32 | (u32::from(LONG_FORM_BIT) << 24));
    }
}

/// Read a length at `*pos`, advancing the cursor.
pub fn decode_length(content: &[u8], pos: &mut usize) -> Result<usize, PairError> {
    let offset = *pos;
    let first = *content
        .get(offset)
        .ok_or(PairError::TruncatedLength { offset })?;

    if first & LONG_FORM_BIT == 0 {
        *pos += 1;
        return Ok(first as usize);
    }

    let bytes = content
        .get(offset..offset + 4)
        .ok_or(PairError::TruncatedLength { offset })?;
    *pos += 4;
    let len = u32::from_be_bytes([first & !LONG_FORM_BIT, bytes[1], bytes[2], bytes[3]]);
    Ok(len as usize)
}

/// Total encoded size of `pairs`.
pub fn encoded_len(pairs: &[NameValuePair]) -> usize {
    pairs.iter().map(NameValuePair::encoded_len).sum()
}

/// Append all pairs to `buf`, back to back with no separators.
pub fn encode_pairs(pairs: &[NameValuePair], buf: &mut BytesMut) {
    buf.reserve(encoded_len(pairs));
    for pair in pairs {
        encode_length(pair.name.len(), buf);
        encode_length(pair.value.len(), buf);
        buf.extend_from_slice(&pair.name);
        buf.extend_from_slice(&pair.value);
    }
}

/// Decode every pair in `content`, preserving order.
///
/// Names and values are zero-copy slices of `content`.
///
/// # Example
///
/// ```
/// use bytes::{Bytes, BytesMut};
/// use fcgi_worker::protocol::{decode_pairs, encode_pairs, NameValuePair};
///
/// let pairs = vec![NameValuePair::new("SCRIPT_NAME", "/index")];
/// let mut buf = BytesMut::new();
/// encode_pairs(&pairs, &mut buf);
/// assert_eq!(decode_pairs(&buf.freeze()).unwrap(), pairs);
/// ```
pub fn decode_pairs(content: &Bytes) -> Result<Vec<NameValuePair>, PairError> {
    let mut pairs = Vec::new();
    let mut pos = 0;

    while pos < content.len() {
        let offset = pos;
        let name_len = decode_length(content, &mut pos)?;
        let value_len = decode_length(content, &mut pos)?;

        let needed = name_len + value_len;
        let available = content.len() - pos;
        if needed > available {
            return Err(PairError::TruncatedData {
                offset,
                needed,
                available,
            });
        }

        let name = content.slice(pos..pos + name_len);
        pos += name_len;
        let value = content.slice(pos..pos + value_len);
        pos += value_len;

        pairs.push(NameValuePair { name, value });
    }

    Ok(pairs)
}
