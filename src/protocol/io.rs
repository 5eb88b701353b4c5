//! Reading and writing whole records over an async transport.
//!
//! Reads are exact: a record is only returned once its header, content
//! and padding have all arrived. A peer that closes the transport between
//! records ends the stream cleanly; one that closes inside a record is an
//! error.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::record::Record;
use super::wire_format::{Header, HEADER_SIZE};
use crate::error::{FcgiError, Result};

/// Read exactly one record.
///
/// Returns `Ok(None)` if the transport closed cleanly before the first
/// header byte.
pub async fn read_record<R>(reader: &mut R) -> Result<Option<Record>>
where
    R: AsyncRead + Unpin,
{
    let mut head = [0u8; HEADER_SIZE];
    let mut filled = 0;
    while filled < HEADER_SIZE {
        let n = reader.read(&mut head[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(FcgiError::ConnectionClosed);
        }
        filled += n;
    }

    // HEADER_SIZE bytes are present
    let header = match Header::decode(&head) {
        Some(header) => header,
        None => return Err(FcgiError::ConnectionClosed),
    };

    let mut body = BytesMut::zeroed(header.body_length());
    if let Err(e) = reader.read_exact(&mut body).await {
        return Err(match e.kind() {
            std::io::ErrorKind::UnexpectedEof => FcgiError::ConnectionClosed,
            _ => FcgiError::Io(e),
        });
    }
    body.truncate(header.content_length as usize);

    Record::decode(&header, body.freeze()).map(Some)
}

/// Encode and write one record, then flush.
pub async fn write_record<W>(writer: &mut W, record: &Record) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let wire = record.encode()?;
    writer.write_all(&wire).await?;
    writer.flush().await?;
    Ok(())
}

/// Write already-encoded records in a single call, then flush.
pub async fn write_encoded<W>(writer: &mut W, wire: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if wire.is_empty() {
        return Ok(());
    }
    writer.write_all(wire).await?;
    writer.flush().await?;
    Ok(())
}
