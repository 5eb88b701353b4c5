//! Handler module - the request-processing callback.
//!
//! Provides:
//! - [`Handler`] - turns a ready [`Request`](crate::Request) into a [`Response`]
//! - [`FnHandler`] / [`handler_fn`] - adapter for async closures
//! - [`Response`] - STDOUT bytes, STDERR bytes and application status
//!
//! # Example
//!
//! ```
//! use fcgi_worker::handler::{handler_fn, Response};
//!
//! let handler = handler_fn(|request: fcgi_worker::Request| async move {
//!     let name = request.params().get_str("SCRIPT_NAME").unwrap_or("/").to_string();
//!     Response::new(format!("Content-Type: text/plain\r\n\r\n{name}"))
//! });
//! # let _ = handler;
//! ```

mod function;
mod response;

pub use function::{handler_fn, BoxFuture, FnHandler, Handler};
pub use response::Response;
