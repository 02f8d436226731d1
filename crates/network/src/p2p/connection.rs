//! Connection sessions.
//!
//! A session is one TCP connection driven by [`ConnectionHandler::run`]: greet,
//! then read envelopes until the peer hangs up, the stream fails or the node
//! shuts down. Inbound connections and startup seed dials use the same loop.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use p2pminer_core::{EventBus, NodeEvent, PeerAddress};
use tokio::io::AsyncWrite;
use tokio::net::TcpStream;
use tokio::time;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::protocol::ProtocolHandler;
use crate::messages::{CodecError, Message, MessageCodec};
use crate::peers::PeerRegistry;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket established, nothing written yet
    Accepted,
    /// Greeting written
    HandshakeSent,
    /// Read loop running
    Reading,
    /// Session over
    Closed,
}

impl ConnectionState {
    /// Checks if the session can still carry messages
    pub fn is_active(&self) -> bool {
        !matches!(self, ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Accepted => write!(f, "Accepted"),
            ConnectionState::HandshakeSent => write!(f, "HandshakeSent"),
            ConnectionState::Reading => write!(f, "Reading"),
            ConnectionState::Closed => write!(f, "Closed"),
        }
    }
}

/// Which side opened the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Accepted by our listener
    Inbound,
    /// Dialed by us
    Outbound,
}

/// Per-connection state visible to message dispatch.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    remote: SocketAddr,
    direction: Direction,
    announced: Option<PeerAddress>,
    oneshot: bool,
    state: ConnectionState,
}

impl ConnectionContext {
    /// Fresh context for a connection to `remote`.
    pub fn new(remote: SocketAddr, direction: Direction) -> Self {
        Self {
            remote,
            direction,
            announced: None,
            oneshot: false,
            state: ConnectionState::Accepted,
        }
    }

    /// Remote socket address.
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// Which side opened the connection.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Identity the remote announced with a handshake, if it did.
    pub fn announced(&self) -> Option<&PeerAddress> {
        self.announced.as_ref()
    }

    /// Records the identity the remote announced. A later handshake on the
    /// same connection replaces it.
    pub fn announce(&mut self, peer: PeerAddress) {
        self.announced = Some(peer);
    }

    /// Marks the connection as carrying a single delivery. Its close does not
    /// remove the announced peer.
    pub fn mark_oneshot(&mut self) {
        self.oneshot = true;
    }

    /// Whether the remote announced a one-shot delivery.
    pub fn is_oneshot(&self) -> bool {
        self.oneshot
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn transition(&mut self, state: ConnectionState) {
        debug!(remote = %self.remote, from = %self.state, to = %state, "connection state");
        self.state = state;
    }
}

/// Drives sessions for one node.
#[derive(Debug)]
pub struct ConnectionHandler {
    protocol: Arc<ProtocolHandler>,
    registry: Arc<PeerRegistry>,
    events: EventBus,
    read_timeout: Duration,
    max_frame_len: usize,
    cancel: CancellationToken,
}

impl ConnectionHandler {
    /// Creates a handler dispatching through `protocol`.
    pub fn new(
        protocol: Arc<ProtocolHandler>,
        registry: Arc<PeerRegistry>,
        events: EventBus,
        read_timeout: Duration,
        max_frame_len: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            protocol,
            registry,
            events,
            read_timeout,
            max_frame_len,
            cancel,
        }
    }

    /// Runs a session to completion.
    ///
    /// Inbound sessions greet with a handshake; outbound sessions also ask for
    /// the remote's peer list. When the session ends the peer it announced is
    /// removed from the registry.
    pub async fn run(&self, stream: TcpStream, direction: Direction) {
        let remote = match stream.peer_addr() {
            Ok(remote) => remote,
            Err(e) => {
                warn!(error = %e, "dropping connection without peer address");
                return;
            }
        };

        let mut ctx = ConnectionContext::new(remote, direction);
        info!(%remote, ?direction, "Connection opened");
        self.events.emit(NodeEvent::ConnectionOpened {
            remote,
            inbound: direction == Direction::Inbound,
        });

        let (read_half, write_half) = stream.into_split();
        let mut reader = FramedRead::new(read_half, MessageCodec::with_max_frame_len(self.max_frame_len));
        let mut writer = FramedWrite::new(write_half, MessageCodec::with_max_frame_len(self.max_frame_len));

        let local_port = self.registry.local_port();
        let greeting = match direction {
            Direction::Inbound => vec![Message::handshake(local_port)],
            Direction::Outbound => vec![Message::handshake(local_port), Message::RequestPeers],
        };
        match write_all(&mut writer, greeting).await {
            Ok(()) => ctx.transition(ConnectionState::HandshakeSent),
            Err(e) => debug!(%remote, error = %e, "greeting not delivered"),
        }
        ctx.transition(ConnectionState::Reading);

        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => break,
                next = time::timeout(self.read_timeout, reader.next()) => next,
            };

            match next {
                Ok(Some(Ok(Ok(message)))) => {
                    let replies = self.protocol.dispatch(&mut ctx, message);
                    if let Err(e) = write_all(&mut writer, replies).await {
                        warn!(%remote, error = %e, "Failed to write reply");
                    }
                }
                Ok(Some(Ok(Err(e)))) => {
                    warn!(%remote, error = %e, "Invalid message");
                    self.events.emit(NodeEvent::MalformedMessage {
                        from: remote,
                        error: e.to_string(),
                    });
                }
                Ok(Some(Err(e))) => {
                    warn!(%remote, error = %e, "Connection error");
                    break;
                }
                Ok(None) => {
                    debug!(%remote, "connection closed by peer");
                    break;
                }
                Err(_) => {
                    // Idle: probe the peer so a dead socket surfaces as a write error.
                    debug!(%remote, "read timeout, probing peer");
                    if let Err(e) = write_all(&mut writer, vec![Message::RequestPeers]).await {
                        debug!(%remote, error = %e, "idle probe failed");
                        break;
                    }
                }
            }
        }

        ctx.transition(ConnectionState::Closed);
        if !ctx.is_oneshot() {
            let announced_port = ctx.announced().map(|peer| peer.port);
            self.registry.remove_by_connection(&remote, announced_port);
        }
        info!(%remote, announced = ?ctx.announced(), "Connection closed");
        self.events.emit(NodeEvent::ConnectionClosed {
            remote,
            announced: ctx.announced,
        });
    }
}

async fn write_all<W>(writer: &mut FramedWrite<W, MessageCodec>, messages: Vec<Message>) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    if messages.is_empty() {
        return Ok(());
    }
    for message in messages {
        writer.feed(message).await?;
    }
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_tracks_announced_identity() {
        let remote: SocketAddr = "127.0.0.1:50000".parse().unwrap();
        let mut ctx = ConnectionContext::new(remote, Direction::Inbound);
        assert_eq!(ctx.state(), ConnectionState::Accepted);
        assert!(ctx.announced().is_none());

        ctx.announce(PeerAddress::new("127.0.0.1", 8001));
        ctx.announce(PeerAddress::new("127.0.0.1", 8002));
        assert_eq!(ctx.announced(), Some(&PeerAddress::new("127.0.0.1", 8002)));
        assert_eq!(ctx.direction(), Direction::Inbound);
    }

    #[test]
    fn test_context_oneshot_flag() {
        let remote: SocketAddr = "127.0.0.1:50000".parse().unwrap();
        let mut ctx = ConnectionContext::new(remote, Direction::Inbound);
        assert!(!ctx.is_oneshot());
        ctx.mark_oneshot();
        assert!(ctx.is_oneshot());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::HandshakeSent.to_string(), "HandshakeSent");
        assert!(ConnectionState::Reading.is_active());
        assert!(!ConnectionState::Closed.is_active());
    }
}
