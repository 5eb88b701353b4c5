//! Response emitter.
//!
//! Turns a request's output into correctly framed records:
//! - each output stream is cut into records of at most `chunk_size`
//!   bytes and always ends with one empty record, even when no bytes
//!   were produced
//! - END_REQUEST is only sent once both STDOUT and STDERR are terminated
//!
//! # Example
//!
//! ```ignore
//! let mut emitter = ResponseEmitter::new(&mut stream, request_id, keep_alive, 8192);
//! emitter.write_stream(OutputStream::Stdout, stdout).await?;
//! emitter.write_stream(OutputStream::Stderr, Bytes::new()).await?;
//! let completion = emitter.finish_request(0, ProtocolStatus::RequestComplete).await?;
//! ```

use bytes::{Bytes, BytesMut};
use tokio::io::AsyncWrite;
use tracing::debug;

use crate::error::{FcgiError, Result};
use crate::protocol::{write_encoded, write_record, Body, ProtocolStatus, Record, MAX_CONTENT_LENGTH};

/// Default maximum content bytes per output record.
pub const DEFAULT_STREAM_CHUNK_SIZE: usize = 8192;

/// Output streams sent back to the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    fn body(self, data: Bytes) -> Body {
        match self {
            Self::Stdout => Body::Stdout(data),
            Self::Stderr => Body::Stderr(data),
        }
    }
}

/// Outcome of a finished request, read by the connection driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// Request that was ended.
    pub request_id: u16,
    /// Whether the connection should be kept open for another request.
    pub keep_alive: bool,
}

/// Writes the response of one request.
///
/// Holds the transport's write side exclusively for the whole response.
pub struct ResponseEmitter<'a, W> {
    writer: &'a mut W,
    request_id: u16,
    keep_alive: bool,
    chunk_size: usize,
    stdout_closed: bool,
    stderr_closed: bool,
    buf: BytesMut,
}

impl<'a, W> ResponseEmitter<'a, W>
where
    W: AsyncWrite + Unpin,
{
    /// Create an emitter for `request_id`.
    ///
    /// `chunk_size` is clamped to `1..=65535`.
    pub fn new(writer: &'a mut W, request_id: u16, keep_alive: bool, chunk_size: usize) -> Self {
        Self {
            writer,
            request_id,
            keep_alive,
            chunk_size: chunk_size.clamp(1, MAX_CONTENT_LENGTH),
            stdout_closed: false,
            stderr_closed: false,
            buf: BytesMut::new(),
        }
    }

    /// Check if `stream` has been terminated.
    pub fn is_closed(&self, stream: OutputStream) -> bool {
        match stream {
            OutputStream::Stdout => self.stdout_closed,
            OutputStream::Stderr => self.stderr_closed,
        }
    }

    /// Send all of `data` on `stream`, followed by its terminator.
    ///
    /// # Errors
    ///
    /// Fails if the stream was already terminated, or on transport errors.
    pub async fn write_stream(&mut self, stream: OutputStream, data: Bytes) -> Result<()> {
        if self.is_closed(stream) {
            return Err(FcgiError::Protocol(format!(
                "{:?} already terminated for request {}",
                stream, self.request_id
            )));
        }

        self.buf.clear();
        let mut records = 0usize;
        let mut offset = 0;
        while offset < data.len() {
            let end = (offset + self.chunk_size).min(data.len());
            Record::new(self.request_id, stream.body(data.slice(offset..end)))
                .encode_into(&mut self.buf)?;
            offset = end;
            records += 1;
        }
        Record::new(self.request_id, stream.body(Bytes::new())).encode_into(&mut self.buf)?;

        write_encoded(&mut *self.writer, &self.buf).await?;
        debug!(
            request_id = self.request_id,
            ?stream,
            bytes = data.len(),
            records,
            "stream written"
        );

        match stream {
            OutputStream::Stdout => self.stdout_closed = true,
            OutputStream::Stderr => self.stderr_closed = true,
        }
        Ok(())
    }

    /// Send END_REQUEST.
    ///
    /// # Errors
    ///
    /// Fails if STDOUT or STDERR has not been terminated yet.
    pub async fn finish_request(
        self,
        app_status: u32,
        protocol_status: ProtocolStatus,
    ) -> Result<Completion> {
        if !(self.stdout_closed && self.stderr_closed) {
            return Err(FcgiError::Protocol(format!(
                "request {} ended before STDOUT and STDERR were terminated",
                self.request_id
            )));
        }

        write_record(
            &mut *self.writer,
            &Record::end_request(self.request_id, app_status, protocol_status),
        )
        .await?;
        debug!(
            request_id = self.request_id,
            app_status,
            ?protocol_status,
            "request ended"
        );

        Ok(Completion {
            request_id: self.request_id,
            keep_alive: self.keep_alive,
        })
    }
}

/// End a request without any output streams.
///
/// Used for aborted requests.
pub async fn end_request<W>(
    writer: &mut W,
    request_id: u16,
    app_status: u32,
    protocol_status: ProtocolStatus,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_record(
        writer,
        &Record::end_request(request_id, app_status, protocol_status),
    )
    .await
}
