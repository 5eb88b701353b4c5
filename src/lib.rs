//! # fcgi-worker
//!
//! Application-side FastCGI protocol engine.
//!
//! A front end (web server) connects to the worker and sends binary
//! records; the worker assembles each request from its PARAMS, STDIN and
//! DATA streams, runs a handler, and sends the response back as STDOUT,
//! STDERR and END_REQUEST records.
//!
//! ## Architecture
//!
//! - **Record layer** ([`protocol`]): 8-byte headers, typed record bodies,
//!   name-value pairs, exact-read record I/O
//! - **Request assembly** ([`assembler`]): pure per-connection state machine
//!   with single-request capacity
//! - **Management** ([`management`]): GET_VALUES answers and UNKNOWN_TYPE
//! - **Response emission** ([`emitter`]): chunked, terminated output streams
//! - **Driver** ([`Connection`], [`Server`]): async I/O over TCP or Unix sockets
//!
//! ## Example
//!
//! ```ignore
//! use fcgi_worker::{Response, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), fcgi_worker::FcgiError> {
//!     let server = Server::builder()
//!         .handler(|request| async move {
//!             let uri = request.params().get_str("REQUEST_URI").unwrap_or("/").to_string();
//!             Response::new(format!("Content-Type: text/plain\r\n\r\n{uri}"))
//!         })
//!         .bind_tcp("127.0.0.1:9000")
//!         .await?;
//!
//!     server.run().await
//! }
//! ```

pub mod assembler;
pub mod config;
pub mod connection;
pub mod emitter;
pub mod error;
pub mod handler;
pub mod management;
pub mod protocol;
pub mod request;
pub mod transport;

mod server;

pub use assembler::{Assembler, ConnectionState, Step};
pub use config::ServerConfig;
pub use connection::Connection;
pub use emitter::{Completion, OutputStream, ResponseEmitter};
pub use error::{FcgiError, Result};
pub use handler::{handler_fn, Handler, Response};
pub use protocol::{ProtocolStatus, Record, Role};
pub use request::{Params, Request};
pub use server::{Server, ServerBuilder};
