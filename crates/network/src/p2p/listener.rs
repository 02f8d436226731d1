//! TCP listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{lookup_host, TcpListener, TcpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::connection::{ConnectionHandler, Direction};
use crate::error::{NetworkError, NetworkResult};

const LISTEN_BACKLOG: u32 = 1024;
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Bound listening socket.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    /// Binds `address` (`host:port`) with address reuse enabled.
    pub async fn bind(address: &str) -> NetworkResult<Self> {
        let bind_error = |source: std::io::Error| NetworkError::Bind {
            address: address.to_string(),
            source,
        };

        let addr = lookup_host(address)
            .await
            .map_err(bind_error)?
            .next()
            .ok_or_else(|| {
                bind_error(std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    "address resolved to nothing",
                ))
            })?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_error)?;
        socket.set_reuseaddr(true).map_err(bind_error)?;
        socket.bind(addr).map_err(bind_error)?;
        let inner = socket.listen(LISTEN_BACKLOG).map_err(bind_error)?;
        let local_addr = inner.local_addr().map_err(bind_error)?;

        Ok(Self { inner, local_addr })
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until `cancel` fires, running each in its own task.
    pub async fn run(self, handler: Arc<ConnectionHandler>, cancel: CancellationToken) {
        info!(address = %self.local_addr, "Listening for peers");

        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.inner.accept() => accepted,
            };

            match accepted {
                Ok((stream, remote)) => {
                    debug!(%remote, "accepted connection");
                    let _ = stream.set_nodelay(true);
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        handler.run(stream, Direction::Inbound).await;
                    });
                }
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }

        info!(address = %self.local_addr, "Listener stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let listener = Listener::bind("127.0.0.1:0").await.unwrap();
        assert!(listener.local_addr().port() > 0);
        assert!(listener.local_addr().ip().is_loopback());
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let first = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = first.local_addr().unwrap().to_string();

        match Listener::bind(&address).await {
            Err(NetworkError::Bind { address: reported, .. }) => assert_eq!(reported, address),
            other => panic!("expected bind error, got {other:?}"),
        }
    }
}
