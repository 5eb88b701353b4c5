//! Connection driver.
//!
//! A [`Connection`] owns one transport and runs request/response cycles
//! on it, strictly one record at a time:
//! 1. Read records, answering management records on the spot
//! 2. Hand the ready request to the handler
//! 3. Send STDOUT, STDERR and END_REQUEST
//! 4. Keep the connection for another request, or shut it down
//!
//! Any transport error or framing violation ends the connection and
//! discards the in-flight request.
//!
//! # Example
//!
//! ```ignore
//! use fcgi_worker::{handler_fn, Connection, Response, ServerConfig};
//!
//! let handler = handler_fn(|_req| async { Response::new("Status: 204\r\n\r\n") });
//! Connection::new(stream, &ServerConfig::default()).serve(&handler).await?;
//! ```

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, warn};

use crate::assembler::{Assembler, ConnectionState, Step};
use crate::config::ServerConfig;
use crate::emitter::{end_request, Completion, OutputStream, ResponseEmitter};
use crate::error::{FcgiError, Result};
use crate::handler::{Handler, Response};
use crate::protocol::{read_record, write_record, ProtocolStatus};
use crate::request::Request;

/// Application status reported for aborted requests.
pub const ABORTED_APP_STATUS: u32 = 0;

/// One front-end connection.
pub struct Connection<T> {
    io: T,
    assembler: Assembler,
    stream_chunk_size: usize,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an accepted transport.
    pub fn new(io: T, config: &ServerConfig) -> Self {
        Self {
            io,
            assembler: Assembler::new(&config.roles),
            stream_chunk_size: config.stream_chunk_size,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.assembler.state()
    }

    /// Read records until a request is ready.
    ///
    /// Returns `Ok(None)` when the front end closed the connection, or when
    /// an aborted request did not ask for keep-alive.
    pub async fn next_request(&mut self) -> Result<Option<Request>> {
        loop {
            let record = match read_record(&mut self.io).await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    if let Some(active) = self.assembler.active() {
                        warn!(request_id = active.id(), "connection closed with request in flight");
                    }
                    self.assembler.close();
                    return Ok(None);
                }
                Err(e) => {
                    if let FcgiError::Framing {
                        record_type,
                        request_id,
                        reason,
                    } = &e
                    {
                        error!(record_type, request_id, %reason, "framing violation, closing connection");
                    }
                    self.assembler.close();
                    return Err(e);
                }
            };

            match self.assembler.apply(record) {
                Step::Continue => {}
                Step::Reply(reply) => self.send(&reply).await?,
                Step::Ready(request) => return Ok(Some(request)),
                Step::Aborted {
                    request_id,
                    keep_alive,
                } => {
                    let sent = end_request(
                        &mut self.io,
                        request_id,
                        ABORTED_APP_STATUS,
                        ProtocolStatus::RequestComplete,
                    )
                    .await;
                    if let Err(e) = sent {
                        self.assembler.close();
                        return Err(e);
                    }
                    self.assembler.finish()?;
                    if !keep_alive {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Send the response for the request returned by `next_request`.
    pub async fn respond(&mut self, request_id: u16, keep_alive: bool, response: Response) -> Result<Completion> {
        self.assembler.start_response(request_id)?;

        let result = self.emit(request_id, keep_alive, response).await;
        match result {
            Ok(completion) => {
                self.assembler.finish()?;
                Ok(completion)
            }
            Err(e) => {
                self.assembler.close();
                Err(e)
            }
        }
    }

    async fn emit(&mut self, request_id: u16, keep_alive: bool, response: Response) -> Result<Completion> {
        let mut emitter = ResponseEmitter::new(&mut self.io, request_id, keep_alive, self.stream_chunk_size);
        emitter.write_stream(OutputStream::Stdout, response.stdout).await?;
        emitter.write_stream(OutputStream::Stderr, response.stderr).await?;
        emitter
            .finish_request(response.app_status, ProtocolStatus::RequestComplete)
            .await
    }

    async fn send(&mut self, record: &crate::protocol::Record) -> Result<()> {
        if let Err(e) = write_record(&mut self.io, record).await {
            self.assembler.close();
            return Err(e);
        }
        Ok(())
    }

    /// Serve requests until the connection ends.
    ///
    /// The transport is shut down when a request without keep-alive
    /// completes.
    pub async fn serve<H>(mut self, handler: &H) -> Result<()>
    where
        H: Handler + ?Sized,
    {
        while let Some(request) = self.next_request().await? {
            let request_id = request.id();
            let keep_alive = request.keep_alive();

            let response = handler.call(request).await;
            let completion = self.respond(request_id, keep_alive, response).await?;
            if !completion.keep_alive {
                break;
            }
            debug!(request_id, "keeping connection open");
        }

        self.close().await
    }

    /// Shut down the write side of the transport.
    pub async fn close(&mut self) -> Result<()> {
        self.assembler.close();
        match self.io.shutdown().await {
            Ok(()) => Ok(()),
            // Peer already gone
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Give back the transport.
    pub fn into_inner(self) -> T {
        self.io
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::protocol::{Body, NameValuePair, Record, RecordBuffer, Role};
    use bytes::{Bytes, BytesMut};
    use tokio::io::{duplex, AsyncReadExt};

    fn wire(records: &[Record]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for record in records {
            record.encode_into(&mut buf).unwrap();
        }
        buf.to_vec()
    }

    async fn run(input: Vec<u8>, config: ServerConfig) -> (Result<()>, Vec<Record>) {
        let (mut front, back) = duplex(64 * 1024);
        front.write_all(&input).await.unwrap();
        front.shutdown().await.unwrap();

        let handler = handler_fn(|request: Request| async move {
            let body = format!(
                "role={:?} stdin={} data={}",
                request.role(),
                request.stdin().len(),
                request.data().len()
            );
            Response::new(body)
        });
        let result = Connection::new(back, &config).serve(&handler).await;

        let mut out = Vec::new();
        front.read_to_end(&mut out).await.unwrap();
        let mut buffer = RecordBuffer::new();
        (result, buffer.push(&out).unwrap())
    }

    #[tokio::test]
    async fn test_single_request_then_close() {
        let input = wire(&[
            Record::begin_request(1, Role::Responder, false),
            Record::new(1, Body::Params(vec![NameValuePair::new("A", "b")])),
            Record::new(1, Body::Params(vec![])),
            Record::new(1, Body::Stdin(Bytes::from_static(b"abc"))),
            Record::new(1, Body::Stdin(Bytes::new())),
        ]);
        let (result, records) = run(input, ServerConfig::default()).await;
        assert!(result.is_ok());

        assert_eq!(records.len(), 4);
        assert_eq!(
            records[0].body,
            Body::Stdout(Bytes::from_static(b"role=Responder stdin=3 data=0"))
        );
        assert_eq!(records[1].body, Body::Stdout(Bytes::new()));
        assert_eq!(records[2].body, Body::Stderr(Bytes::new()));
        assert_eq!(
            records[3],
            Record::end_request(1, 0, ProtocolStatus::RequestComplete)
        );
    }

    #[tokio::test]
    async fn test_keep_alive_serves_two_requests() {
        let input = wire(&[
            Record::begin_request(1, Role::Authorizer, true),
            Record::new(1, Body::Params(vec![])),
            Record::begin_request(2, Role::Authorizer, false),
            Record::new(2, Body::Params(vec![])),
        ]);
        let (result, records) = run(input, ServerConfig::default()).await;
        assert!(result.is_ok());

        let ends: Vec<u16> = records
            .iter()
            .filter(|r| matches!(r.body, Body::EndRequest(_)))
            .map(|r| r.request_id)
            .collect();
        assert_eq!(ends, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_without_keep_alive_stops_after_first() {
        let input = wire(&[
            Record::begin_request(1, Role::Authorizer, false),
            Record::new(1, Body::Params(vec![])),
            Record::begin_request(2, Role::Authorizer, false),
            Record::new(2, Body::Params(vec![])),
        ]);
        let (_, records) = run(input, ServerConfig::default()).await;
        assert!(records.iter().all(|r| r.request_id == 1));
    }

    #[tokio::test]
    async fn test_abort_sends_end_request() {
        let input = wire(&[
            Record::begin_request(3, Role::Responder, false),
            Record::new(3, Body::Stdin(Bytes::from_static(b"partial"))),
            Record::new(3, Body::AbortRequest),
        ]);
        let (result, records) = run(input, ServerConfig::default()).await;
        assert!(result.is_ok());
        assert_eq!(
            records,
            vec![Record::end_request(
                3,
                ABORTED_APP_STATUS,
                ProtocolStatus::RequestComplete
            )]
        );
    }

    #[tokio::test]
    async fn test_framing_violation_is_fatal() {
        let mut input = wire(&[Record::begin_request(1, Role::Responder, false)]);
        // PARAMS claiming a 10-byte name inside 2 bytes of content
        input.extend_from_slice(&[1, 4, 0, 1, 0, 2, 6, 0, 10, 0, 0, 0, 0, 0, 0, 0]);
        let (result, records) = run(input, ServerConfig::default()).await;

        assert!(matches!(
            result,
            Err(FcgiError::Framing {
                record_type: 4,
                request_id: 1,
                ..
            })
        ));
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_filter_waits_for_data() {
        let input = wire(&[
            Record::begin_request(1, Role::Filter, false),
            Record::new(1, Body::Params(vec![])),
            Record::new(1, Body::Stdin(Bytes::new())),
            Record::new(1, Body::Data(Bytes::from_static(b"12345678"))),
            Record::new(1, Body::Data(Bytes::new())),
        ]);
        let (_, records) = run(input, ServerConfig::default()).await;
        assert_eq!(
            records[0].body,
            Body::Stdout(Bytes::from_static(b"role=Filter stdin=0 data=8"))
        );
    }

    #[tokio::test]
    async fn test_restricted_roles() {
        let config = ServerConfig {
            roles: vec![Role::Responder],
            ..ServerConfig::default()
        };
        let input = wire(&[Record::begin_request(1, Role::Authorizer, false)]);
        let (_, records) = run(input, config).await;
        assert_eq!(
            records,
            vec![Record::end_request(1, 0, ProtocolStatus::UnknownRole)]
        );
    }

    #[tokio::test]
    async fn test_respond_for_wrong_request() {
        let (_front, back) = duplex(1024);
        let mut conn = Connection::new(back, &ServerConfig::default());
        let err = conn.respond(1, false, Response::empty()).await.unwrap_err();
        assert!(matches!(err, FcgiError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_respond_mismatch_leaves_request_ready() {
        let (mut front, back) = duplex(8 * 1024);
        front
            .write_all(&wire(&[
                Record::begin_request(4, Role::Authorizer, false),
                Record::new(4, Body::Params(vec![])),
            ]))
            .await
            .unwrap();

        let mut conn = Connection::new(back, &ServerConfig::default());
        let request = conn.next_request().await.unwrap().unwrap();
        assert!(conn.respond(5, false, Response::empty()).await.is_err());
        assert_eq!(conn.state(), ConnectionState::Ready);

        let completion = conn
            .respond(request.id(), false, Response::empty())
            .await
            .unwrap();
        assert_eq!(completion.request_id, 4);
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_stray_end_request_is_not_fatal() {
        let mut input = wire(&[Record::begin_request(1, Role::Responder, false)]);
        // END_REQUEST on id 7 with undefined protocol status 9
        input.extend_from_slice(&[1, 3, 0, 7, 0, 8, 0, 0, 0, 0, 0, 0, 9, 0, 0, 0]);
        input.extend_from_slice(&wire(&[
            Record::new(1, Body::Params(vec![])),
            Record::new(1, Body::Stdin(Bytes::new())),
        ]));

        let (result, records) = run(input, ServerConfig::default()).await;
        assert!(result.is_ok());
        assert_eq!(
            records.last(),
            Some(&Record::end_request(1, 0, ProtocolStatus::RequestComplete))
        );
    }
}
