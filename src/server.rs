//! Server builder and accept loop.
//!
//! The [`ServerBuilder`] collects the handler and configuration; the
//! [`Server`] owns the listener and runs the lifecycle:
//! 1. Wait for a free connection slot
//! 2. Accept a front-end connection
//! 3. Check the peer against the allowed addresses
//! 4. Serve the connection on its own task
//!
//! Connection slots are bounded by the advertised `FCGI_MAX_CONNS`, so a
//! worker never holds more connections than it tells the front end.
//!
//! # Example
//!
//! ```ignore
//! use fcgi_worker::{Response, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::builder()
//!         .handler(|request| async move {
//!             Response::new(format!("Content-Type: text/plain\r\n\r\n{} bytes", request.stdin().len()))
//!         })
//!         .bind_tcp("127.0.0.1:9000")
//!         .await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::ToSocketAddrs;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::{FcgiError, Result};
use crate::handler::{handler_fn, Handler, Response};
use crate::management::MAX_CONNS;
use crate::protocol::Role;
use crate::request::Request;
use crate::transport::{Listener, Peer};

/// Pause after an accept error that is not tied to one connection.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Delay before the next accept, `None` to retry at once.
///
/// Errors caused by a single peer (reset or aborted before accept) are
/// retried immediately. Anything else, such as running out of file
/// descriptors, backs off so the loop does not spin.
fn accept_backoff(err: &FcgiError) -> Option<Duration> {
    match err {
        FcgiError::Io(e) => match e.kind() {
            io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock => None,
            _ => Some(ACCEPT_BACKOFF),
        },
        _ => Some(ACCEPT_BACKOFF),
    }
}

/// Builder for configuring and creating a [`Server`].
pub struct ServerBuilder {
    handler: Option<Arc<dyn Handler>>,
    config: ServerConfig,
}

impl ServerBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self {
            handler: None,
            config: ServerConfig::default(),
        }
    }

    /// Set the request handler from an async closure.
    pub fn handler<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.handler_arc(Arc::new(handler_fn(handler)))
    }

    /// Set an already shared request handler.
    pub fn handler_arc(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the maximum content bytes per STDOUT/STDERR record.
    ///
    /// Default: 8192
    pub fn stream_chunk_size(mut self, size: usize) -> Self {
        self.config.stream_chunk_size = size;
        self
    }

    /// Restrict the roles this worker accepts.
    ///
    /// Default: all roles
    pub fn roles(mut self, roles: &[Role]) -> Self {
        self.config.roles = roles.to_vec();
        self
    }

    /// Only accept TCP connections from these addresses.
    pub fn allowed_peers(mut self, peers: Vec<IpAddr>) -> Self {
        self.config.allowed_peers = Some(peers);
        self
    }

    /// Bind a TCP listener and build the server.
    pub async fn bind_tcp<A: ToSocketAddrs>(self, addr: A) -> Result<Server> {
        let listener = Listener::bind_tcp(addr).await?;
        self.build(listener)
    }

    /// Bind a Unix socket listener and build the server.
    #[cfg(unix)]
    pub async fn bind_unix<P: AsRef<std::path::Path>>(self, path: P) -> Result<Server> {
        let listener = Listener::bind_unix(path).await?;
        self.build(listener)
    }

    /// Build the server around an existing listener.
    ///
    /// # Errors
    ///
    /// Fails if no handler was set or the configuration is invalid.
    pub fn build(self, listener: Listener) -> Result<Server> {
        let handler = self
            .handler
            .ok_or_else(|| FcgiError::Config("no request handler configured".to_string()))?;
        self.config.validate()?;

        Ok(Server {
            listener,
            handler,
            config: Arc::new(self.config),
            slots: Arc::new(Semaphore::new(MAX_CONNS)),
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound FastCGI worker.
pub struct Server {
    listener: Listener,
    handler: Arc<dyn Handler>,
    config: Arc<ServerConfig>,
    slots: Arc<Semaphore>,
}

impl Server {
    /// Create a new server builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Human-readable listening address.
    pub fn local_addr(&self) -> String {
        self.listener.local_addr()
    }

    /// Listening TCP address, if bound to TCP.
    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        self.listener.tcp_addr()
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Accept and serve connections forever.
    ///
    /// Failed accepts are logged and skipped; only a closed slot semaphore
    /// ends the loop.
    pub async fn run(self) -> Result<()> {
        info!(addr = %self.listener.local_addr(), "listening");

        loop {
            let permit = self
                .slots
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| FcgiError::Protocol(format!("connection slots closed: {}", e)))?;

            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    drop(permit);
                    warn!(error = %e, "accept failed");
                    if let Some(delay) = accept_backoff(&e) {
                        tokio::time::sleep(delay).await;
                    }
                    continue;
                }
            };
            if let Peer::Tcp(addr) = &peer {
                if !self.config.is_peer_allowed(addr.ip()) {
                    warn!(%peer, "rejecting connection from disallowed peer");
                    continue;
                }
            }
            info!(%peer, "connection accepted");

            let handler = self.handler.clone();
            let config = self.config.clone();
            tokio::spawn(async move {
                let _permit = permit;
                match Connection::new(stream, &config).serve(handler.as_ref()).await {
                    Ok(()) => info!(%peer, "connection closed"),
                    Err(e) => error!(%peer, error = %e, "connection failed"),
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo() -> ServerBuilder {
        Server::builder().handler(|mut request: Request| async move { Response::new(request.take_stdin()) })
    }

    #[test]
    fn test_accept_backoff() {
        let aborted = FcgiError::Io(io::Error::from(io::ErrorKind::ConnectionAborted));
        assert_eq!(accept_backoff(&aborted), None);

        let reset = FcgiError::Io(io::Error::from(io::ErrorKind::ConnectionReset));
        assert_eq!(accept_backoff(&reset), None);

        // EMFILE
        let exhausted = FcgiError::Io(io::Error::from_raw_os_error(24));
        assert_eq!(accept_backoff(&exhausted), Some(ACCEPT_BACKOFF));
    }

    #[tokio::test]
    async fn test_run_survives_rejected_peers() {
        let server = echo()
            .allowed_peers(vec!["192.0.2.1".parse().unwrap()])
            .bind_tcp("127.0.0.1:0")
            .await
            .unwrap();
        let addr = server.tcp_addr().unwrap();
        let task = tokio::spawn(server.run());

        for _ in 0..3 {
            let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
            drop(stream);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());
        task.abort();
    }

    #[tokio::test]
    async fn test_build_requires_handler() {
        let listener = Listener::bind_tcp("127.0.0.1:0").await.unwrap();
        let err = ServerBuilder::new().build(listener).err().unwrap();
        assert!(matches!(err, FcgiError::Config(_)));
    }

    #[tokio::test]
    async fn test_build_validates_config() {
        let err = echo().stream_chunk_size(0).bind_tcp("127.0.0.1:0").await.err().unwrap();
        assert!(matches!(err, FcgiError::Config(_)));

        let err = echo().roles(&[]).bind_tcp("127.0.0.1:0").await.err().unwrap();
        assert!(matches!(err, FcgiError::Config(_)));
    }

    #[tokio::test]
    async fn test_builder_settings() {
        let server = echo()
            .stream_chunk_size(1024)
            .roles(&[Role::Responder])
            .allowed_peers(vec!["127.0.0.1".parse().unwrap()])
            .bind_tcp("127.0.0.1:0")
            .await
            .unwrap();

        assert_eq!(server.config().stream_chunk_size, 1024);
        assert_eq!(server.config().roles, vec![Role::Responder]);
        assert!(server.tcp_addr().unwrap().ip().is_loopback());
        assert_eq!(server.local_addr(), server.tcp_addr().unwrap().to_string());
    }
}
