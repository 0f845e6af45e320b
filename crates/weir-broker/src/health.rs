//! Minimal HTTP liveness endpoint.
//!
//! Answers `200 ok` to any request on the configured port. Deliberately not a
//! web framework: one accept loop, one canned response.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const RESPONSE: &[u8] =
    b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok";

pub async fn serve_health(addr: String, mut shutdown: broadcast::Receiver<()>) {
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!(%addr, error = %e, "health endpoint failed to bind");
            return;
        }
    };
    info!(%addr, "health endpoint listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let Ok((mut stream, peer)) = accepted else { continue };
                debug!(%peer, "health check");
                tokio::spawn(async move {
                    // Drain whatever request line arrives, then answer.
                    let mut buf = [0u8; 1024];
                    let _ = stream.read(&mut buf).await;
                    let _ = stream.write_all(RESPONSE).await;
                });
            }
            _ = shutdown.recv() => {
                info!(%addr, "health endpoint stopping");
                return;
            }
        }
    }
}
