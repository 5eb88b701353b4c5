//! Error types for fcgi-worker.

use thiserror::Error;

/// Main error type for all FastCGI operations.
#[derive(Debug, Error)]
pub enum FcgiError {
    /// I/O error on the transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer closed the connection in the middle of a record.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Record content does not match the shape its type requires.
    #[error("Framing violation in record type {record_type} (request {request_id}): {reason}")]
    Framing {
        /// Raw type code of the offending record.
        record_type: u8,
        /// Request id of the offending record.
        request_id: u16,
        /// What was wrong with the content.
        reason: String,
    },

    /// Content does not fit the 16-bit content length field.
    #[error("Record content of {0} bytes exceeds 65535")]
    ContentTooLarge(usize),

    /// Local protocol misuse (e.g. ending a request with open streams).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl FcgiError {
    /// Build a framing violation error.
    pub(crate) fn framing(record_type: u8, request_id: u16, reason: impl Into<String>) -> Self {
        Self::Framing {
            record_type,
            request_id,
            reason: reason.into(),
        }
    }
}

/// Result type alias using FcgiError.
pub type Result<T> = std::result::Result<T, FcgiError>;
