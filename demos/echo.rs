//! Echo worker.
//!
//! Answers every request with its parameters and input back as plain text.
//!
//! ```text
//! RUST_LOG=fcgi_worker=debug cargo run --example echo -- 127.0.0.1:9000
//! ```

use std::fmt::Write;

use fcgi_worker::{FcgiError, Request, Response, Server, ServerConfig};
use tracing_subscriber::EnvFilter;

async fn echo(mut request: Request) -> Response {
    let mut body = String::from("Content-Type: text/plain\r\n\r\n");
    let _ = writeln!(body, "request {} ({:?})", request.id(), request.role());

    let mut params: Vec<_> = request
        .params()
        .iter()
        .map(|(name, value)| {
            format!(
                "{}={}",
                String::from_utf8_lossy(name),
                String::from_utf8_lossy(value)
            )
        })
        .collect();
    params.sort();
    for param in params {
        let _ = writeln!(body, "{param}");
    }

    let stdin = request.take_stdin();
    let _ = writeln!(body, "stdin: {} bytes", stdin.len());
    body.push_str(&String::from_utf8_lossy(&stdin));

    Response::new(body)
}

#[tokio::main]
async fn main() -> Result<(), FcgiError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let addr = std::env::args().nth(1).unwrap_or_else(|| "127.0.0.1:9000".to_string());
    let server = Server::builder()
        .config(ServerConfig::from_env()?)
        .handler(echo)
        .bind_tcp(addr.as_str())
        .await?;

    server.run().await
}
