//! Record buffer for accumulating partial reads.
//!
//! Push-style counterpart to [`read_record`](super::read_record), for
//! callers that already own the read loop (front-end side tooling, tests,
//! non-blocking drivers). Uses `bytes::BytesMut` and a two-state machine:
//! - `WaitingForHeader`: need at least 8 bytes
//! - `WaitingForBody`: header parsed, need content + padding
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use fcgi_worker::protocol::{Body, Record, RecordBuffer};
//!
//! let wire = Record::new(1, Body::Stdout(Bytes::from_static(b"hi"))).encode().unwrap();
//! let mut buffer = RecordBuffer::new();
//! assert!(buffer.push(&wire[..5]).unwrap().is_empty());
//! let records = buffer.push(&wire[5..]).unwrap();
//! assert_eq!(records.len(), 1);
//! ```

use bytes::BytesMut;

use super::record::Record;
use super::wire_format::{Header, HEADER_SIZE};
use crate::error::Result;

/// State machine for record parsing.
#[derive(Debug, Clone)]
enum State {
    /// Waiting for complete header (need 8 bytes).
    WaitingForHeader,
    /// Header parsed, waiting for content and padding.
    WaitingForBody { header: Header },
}

/// Buffer for accumulating incoming bytes and extracting complete records.
pub struct RecordBuffer {
    buffer: BytesMut,
    state: State,
}

impl RecordBuffer {
    /// Create a new record buffer (16KB initial capacity).
    pub fn new() -> Self {
        Self::with_capacity(16 * 1024)
    }

    /// Create a new record buffer with custom initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            state: State::WaitingForHeader,
        }
    }

    /// Push data into the buffer and extract all complete records.
    ///
    /// # Errors
    ///
    /// Returns a framing error if a complete record has malformed content.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Record>> {
        self.buffer.extend_from_slice(data);

        let mut records = Vec::new();
        while let Some(record) = self.try_extract_one()? {
            records.push(record);
        }
        Ok(records)
    }

    fn try_extract_one(&mut self) -> Result<Option<Record>> {
        loop {
            match &self.state {
                State::WaitingForHeader => {
                    let header = match Header::decode(&self.buffer) {
                        Some(header) => header,
                        None => return Ok(None),
                    };
                    let _ = self.buffer.split_to(HEADER_SIZE);
                    self.state = State::WaitingForBody { header };
                }
                State::WaitingForBody { header } => {
                    let header = *header;
                    if self.buffer.len() < header.body_length() {
                        return Ok(None);
                    }

                    let mut body = self.buffer.split_to(header.body_length());
                    body.truncate(header.content_length as usize);
                    self.state = State::WaitingForHeader;

                    return Record::decode(&header, body.freeze()).map(Some);
                }
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

impl Default for RecordBuffer {
    fn default() -> Self {
        Self::new()
    }
}
