//! Shared TCP server loop for the three daemons.
//!
//! A service implements [`RequestHandler`] and hands it to [`Server`], which
//! owns the accept loop, per-connection tasks, and graceful shutdown: the
//! accept loop stops first, then each connection finishes its in-flight
//! request and exits.

use crate::framing::{read_frame, write_frame, FrameError};
use crate::{ErrorCode, Request, Response};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, request: Request) -> Response;
}

pub struct Server {
    listener: TcpListener,
    handler: Arc<dyn RequestHandler>,
    shutdown: broadcast::Sender<()>,
}

impl Server {
    /// Bind the listener up front so callers can learn the real address when
    /// binding port 0.
    pub async fn bind(
        addr: &str,
        handler: Arc<dyn RequestHandler>,
        shutdown: broadcast::Sender<()>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            handler,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the shutdown channel fires, then drain every
    /// connection task.
    pub async fn run(self) -> std::io::Result<()> {
        let addr = self.listener.local_addr()?;
        info!(%addr, "listening");

        let mut connections = JoinSet::new();
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!(%peer, "accepted connection");
                            let handler = self.handler.clone();
                            let conn_shutdown = self.shutdown.subscribe();
                            connections.spawn(async move {
                                if let Err(e) = handle_connection(stream, handler, conn_shutdown).await {
                                    warn!(%peer, error = %e, "connection ended with error");
                                }
                            });
                        }
                        Err(e) => error!(error = %e, "accept failed"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!(%addr, "stopping accept loop");
                    break;
                }
            }
        }

        while connections.join_next().await.is_some() {}
        info!(%addr, "all connections drained");
        Ok(())
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    handler: Arc<dyn RequestHandler>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), FrameError> {
    loop {
        let payload = tokio::select! {
            frame = read_frame(&mut stream) => match frame? {
                Some(payload) => payload,
                None => return Ok(()),
            },
            _ = shutdown.recv() => return Ok(()),
        };

        let response = match Request::from_bytes(&payload) {
            Ok(request) => handler.handle(request).await,
            Err(e) => {
                warn!(error = %e, "undecodable request");
                Response::error(ErrorCode::InvalidArgument, format!("bad request: {e}"))
            }
        };

        let encoded = match response.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "response serialization failed");
                Response::error(ErrorCode::Internal, "response serialization failed")
                    .to_bytes()
                    .unwrap_or_default()
            }
        };
        write_frame(&mut stream, &encoded).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoPing;

    #[async_trait]
    impl RequestHandler for EchoPing {
        async fn handle(&self, request: Request) -> Response {
            match request {
                Request::Ping => Response::Pong,
                _ => Response::error(ErrorCode::InvalidArgument, "only ping here"),
            }
        }
    }

    #[tokio::test]
    async fn serves_requests_and_shuts_down() {
        let (shutdown_tx, _) = broadcast::channel(1);
        let server = Server::bind("127.0.0.1:0", Arc::new(EchoPing), shutdown_tx.clone())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let server_task = tokio::spawn(server.run());

        let mut stream = TcpStream::connect(addr).await.unwrap();
        write_frame(&mut stream, &Request::Ping.to_bytes().unwrap())
            .await
            .unwrap();
        let payload = read_frame(&mut stream).await.unwrap().unwrap();
        assert_eq!(Response::from_bytes(&payload).unwrap(), Response::Pong);

        shutdown_tx.send(()).unwrap();
        server_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn garbage_request_gets_error_response() {
        let (shutdown_tx, _) = broadcast::channel(1);
        let server = Server::bind("127.0.0.1:0", Arc::new(EchoPing), shutdown_tx.clone())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());

        let mut stream = TcpStream::connect(addr).await.unwrap();
        write_frame(&mut stream, &[0xDE, 0xAD, 0xBE, 0xEF])
            .await
            .unwrap();
        let payload = read_frame(&mut stream).await.unwrap().unwrap();
        match Response::from_bytes(&payload).unwrap() {
            Response::Error { error_code, .. } => {
                assert_eq!(error_code, ErrorCode::InvalidArgument)
            }
            other => panic!("expected error response, got {other:?}"),
        }
        let _ = shutdown_tx.send(());
    }
}
