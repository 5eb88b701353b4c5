//! Transport module - listening sockets and connected streams.
//!
//! Provides abstraction over:
//! - TCP sockets
//! - Unix Domain Sockets (Linux/macOS)

mod socket;

pub use socket::{generate_socket_path, Listener, Peer, Stream};
