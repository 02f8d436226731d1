//! One-shot delivery and fan-out.
//!
//! Gossip does not reuse sessions: every send opens a fresh connection, writes
//! a one-shot handshake and one envelope, closes its write half and collects
//! whatever the receiver answers before it hangs up. The handshake tells the
//! receiver who delivered the envelope, so a relay never goes straight back.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{future, SinkExt, StreamExt};
use p2pminer_config::NetworkConfig;
use p2pminer_core::{EventBus, NodeEvent, PeerAddress};
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use crate::error::{NetworkError, NetworkResult};
use crate::messages::{Message, MessageCodec};
use crate::peers::{PeerRegistry, REASON_UNREACHABLE};

/// Replies collected from one successful delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Peer the message was written to
    pub peer: PeerAddress,
    /// Socket address the connection reached
    pub remote: SocketAddr,
    /// Non-handshake messages the receiver wrote back
    pub replies: Vec<Message>,
}

/// Outcome of a fan-out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BroadcastReport {
    /// Successful deliveries
    pub delivered: Vec<Delivery>,
    /// Peers removed from the registry because the send failed
    pub evicted: Vec<PeerAddress>,
}

impl BroadcastReport {
    /// Number of peers attempted.
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.evicted.len()
    }
}

/// Opens connections on behalf of the node.
#[derive(Debug, Clone)]
pub struct Messenger {
    registry: Arc<PeerRegistry>,
    events: EventBus,
    connect_timeout: Duration,
    reply_timeout: Duration,
    max_frame_len: usize,
}

impl Messenger {
    /// Creates a messenger evicting failed peers from `registry`.
    pub fn new(registry: Arc<PeerRegistry>, config: &NetworkConfig, events: EventBus) -> Self {
        Self {
            registry,
            events,
            connect_timeout: config.connect_timeout(),
            reply_timeout: config.reply_timeout(),
            max_frame_len: config.max_frame_len,
        }
    }

    /// Registry this messenger evicts from.
    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    /// Dials `peer` within the connect timeout.
    pub async fn connect(&self, peer: &PeerAddress) -> NetworkResult<TcpStream> {
        let stream = time::timeout(self.connect_timeout, TcpStream::connect(peer.dial_target()))
            .await
            .map_err(|_| NetworkError::timeout(peer, "connect", self.connect_timeout))?
            .map_err(|source| NetworkError::Connect {
                peer: peer.clone(),
                source,
            })?;
        let _ = stream.set_nodelay(true);
        Ok(stream)
    }

    /// Delivers one message and returns the receiver's replies.
    ///
    /// Any connect or write failure evicts `peer` from the registry. Failing
    /// to read replies after a successful write is not a delivery failure.
    pub async fn send_once(&self, peer: &PeerAddress, message: Message) -> NetworkResult<Delivery> {
        let kind = message.message_type();
        match self.try_send_once(peer, message).await {
            Ok(delivery) => {
                debug!(%peer, %kind, replies = delivery.replies.len(), "message delivered");
                Ok(delivery)
            }
            Err(e) => {
                warn!(%peer, %kind, error = %e, "Failed to send message");
                self.registry.remove_with_reason(peer, REASON_UNREACHABLE);
                Err(e)
            }
        }
    }

    async fn try_send_once(&self, peer: &PeerAddress, message: Message) -> NetworkResult<Delivery> {
        let stream = self.connect(peer).await?;
        let remote = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();

        let mut writer =
            FramedWrite::new(write_half, MessageCodec::with_max_frame_len(self.max_frame_len));
        let greeting = Message::oneshot_handshake(self.registry.local_port());
        time::timeout(self.connect_timeout, async {
            writer.feed(greeting).await?;
            writer.send(message).await?;
            // Shuts down the write half so the receiver sees end of stream.
            writer.close().await
        })
        .await
        .map_err(|_| NetworkError::timeout(peer, "write", self.connect_timeout))??;

        let mut reader =
            FramedRead::new(read_half, MessageCodec::with_max_frame_len(self.max_frame_len));
        let deadline = Instant::now() + self.reply_timeout;
        let mut replies = Vec::new();

        loop {
            match time::timeout_at(deadline, reader.next()).await {
                Ok(Some(Ok(Ok(Message::Handshake(_))))) => continue,
                Ok(Some(Ok(Ok(reply)))) => replies.push(reply),
                Ok(Some(Ok(Err(e)))) => debug!(%peer, error = %e, "discarding malformed reply"),
                Ok(Some(Err(e))) => {
                    debug!(%peer, error = %e, "reply stream failed");
                    break;
                }
                Ok(None) => break,
                Err(_) => {
                    debug!(%peer, "reply window elapsed");
                    break;
                }
            }
        }

        Ok(Delivery {
            peer: peer.clone(),
            remote,
            replies,
        })
    }

    /// Sends `message` to every registered peer except `exclude`, concurrently.
    pub async fn broadcast(&self, message: &Message, exclude: Option<&PeerAddress>) -> BroadcastReport {
        let targets: Vec<PeerAddress> = self
            .registry
            .list()
            .into_iter()
            .filter(|peer| Some(peer) != exclude)
            .collect();

        let sends = targets.iter().map(|peer| {
            let message = message.clone();
            async move { (peer, self.send_once(peer, message).await) }
        });

        let mut report = BroadcastReport::default();
        for (peer, result) in future::join_all(sends).await {
            match result {
                Ok(delivery) => report.delivered.push(delivery),
                Err(_) => report.evicted.push(peer.clone()),
            }
        }

        let kind = message.message_type();
        info!(
            %kind,
            delivered = report.delivered.len(),
            evicted = report.evicted.len(),
            "Broadcast completed"
        );
        self.events.emit(NodeEvent::BroadcastCompleted {
            kind: kind.to_string(),
            delivered: report.delivered.len(),
            evicted: report.evicted.len(),
        });
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{decode, encode};
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    fn config() -> NetworkConfig {
        let mut config = NetworkConfig::default();
        config.connect_timeout_secs = 1;
        config.reply_timeout_secs = 1;
        config
    }

    fn messenger(registry: Arc<PeerRegistry>) -> Messenger {
        Messenger::new(registry, &config(), EventBus::new(64))
    }

    async fn unused_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_send_once_collects_replies() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            write.write_all(&encode(&Message::handshake(port)).unwrap()).await.unwrap();

            let mut lines = BufReader::new(read).lines();
            let greeting = lines.next_line().await.unwrap().unwrap();
            assert_eq!(decode(greeting.as_bytes()).unwrap(), Message::oneshot_handshake(1));
            let line = lines.next_line().await.unwrap().unwrap();
            let received = decode(line.as_bytes()).unwrap();
            write.write_all(&encode(&Message::peer_list(vec![])).unwrap()).await.unwrap();
            assert!(lines.next_line().await.unwrap().is_none());
            received
        });

        let registry = Arc::new(PeerRegistry::new(1, EventBus::new(8)));
        let peer = PeerAddress::new("127.0.0.1", port);
        let delivery = messenger(registry)
            .send_once(&peer, Message::RequestPeers)
            .await
            .unwrap();

        assert_eq!(delivery.replies, vec![Message::peer_list(vec![])]);
        assert_eq!(server.await.unwrap(), Message::RequestPeers);
    }

    #[tokio::test]
    async fn test_send_failure_evicts_peer() {
        let registry = Arc::new(PeerRegistry::new(1, EventBus::new(8)));
        let dead = PeerAddress::new("127.0.0.1", unused_port().await);
        registry.add(dead.clone());

        let result = messenger(registry.clone())
            .send_once(&dead, Message::RequestPeers)
            .await;

        assert!(result.is_err());
        assert!(!registry.contains(&dead));
    }

    #[tokio::test]
    async fn test_broadcast_excludes_and_reports() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let live = PeerAddress::new("127.0.0.1", listener.local_addr().unwrap().port());
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut sink = Vec::new();
                    let _ = stream.read_to_end(&mut sink).await;
                });
            }
        });

        let registry = Arc::new(PeerRegistry::new(1, EventBus::new(8)));
        let dead = PeerAddress::new("127.0.0.1", unused_port().await);
        let excluded = PeerAddress::new("127.0.0.1", unused_port().await);
        registry.merge(vec![live.clone(), dead.clone(), excluded.clone()]);

        let report = messenger(registry.clone())
            .broadcast(&Message::Transaction(serde_json::json!({"id": 1})), Some(&excluded))
            .await;

        assert_eq!(report.attempted(), 2);
        assert_eq!(report.delivered.len(), 1);
        assert_eq!(report.delivered[0].peer, live);
        assert_eq!(report.evicted, vec![dead]);
        assert!(registry.contains(&excluded));
        assert!(registry.contains(&live));
    }
}
