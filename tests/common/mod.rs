//! Helpers shared by the overlay integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use p2pminer::config::NetworkConfig;
use p2pminer::core::PeerAddress;
use p2pminer::network::{Message, MessageCodec};
use p2pminer::MinerNode;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

/// Upper bound for anything the tests wait on.
pub const SETTLE: Duration = Duration::from_secs(10);

/// Picks a port that was free a moment ago.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Picks `N` distinct ports that were free a moment ago.
pub fn free_ports<const N: usize>() -> [u16; N] {
    let listeners: Vec<_> = (0..N)
        .map(|_| std::net::TcpListener::bind("127.0.0.1:0").unwrap())
        .collect();
    let mut ports = [0; N];
    for (slot, listener) in ports.iter_mut().zip(&listeners) {
        *slot = listener.local_addr().unwrap().port();
    }
    ports
}

pub fn local(port: u16) -> PeerAddress {
    PeerAddress::new("127.0.0.1", port)
}

pub fn network_config(port: u16, seeds: Vec<PeerAddress>) -> NetworkConfig {
    NetworkConfig {
        bind_host: "127.0.0.1".to_string(),
        port,
        seeds,
        connect_timeout_secs: 2,
        reply_timeout_secs: 2,
        ..NetworkConfig::default()
    }
}

/// A node whose listener is bound but whose seeds have not been dialed.
pub async fn listening_node(port: u16, seeds: Vec<PeerAddress>) -> MinerNode {
    let node = MinerNode::new(
        network_config(port, seeds),
        format!("wallet-{port}"),
        "pool.example:443",
    );
    node.p2p().start().await.unwrap();
    node
}

/// Polls `condition` until it holds or `timeout` elapses.
pub async fn eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    condition()
}

/// Awaits `future` or panics after `timeout`.
pub async fn within<T>(timeout: Duration, future: impl Future<Output = T>) -> T {
    tokio::time::timeout(timeout, future)
        .await
        .expect("timed out")
}

/// Raw protocol client speaking the envelope codec.
pub struct Client {
    framed: Framed<TcpStream, MessageCodec>,
}

impl Client {
    pub async fn connect(port: u16) -> Self {
        let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        Self::from_stream(stream)
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        Self {
            framed: Framed::new(stream, MessageCodec::new()),
        }
    }

    pub async fn send(&mut self, message: Message) {
        self.framed.send(message).await.unwrap();
    }

    /// Writes bytes as they are, bypassing the codec.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        let stream = self.framed.get_mut();
        stream.write_all(bytes).await.unwrap();
        stream.flush().await.unwrap();
    }

    /// Next successfully decoded message, or `None` at end of stream.
    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            match within(SETTLE, self.framed.next()).await {
                Some(Ok(Ok(message))) => return Some(message),
                Some(Ok(Err(_))) => continue,
                Some(Err(_)) | None => return None,
            }
        }
    }

    /// Reads until a message matching `predicate` arrives.
    pub async fn recv_matching<P>(&mut self, mut predicate: P) -> Message
    where
        P: FnMut(&Message) -> bool,
    {
        loop {
            match self.recv().await {
                Some(message) if predicate(&message) => return message,
                Some(_) => continue,
                None => panic!("stream ended before the expected message"),
            }
        }
    }
}
