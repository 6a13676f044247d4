//! # Mock Network
//!
//! In-process peer endpoints connected by `tokio::io::duplex` pipes. Every
//! host can dial every other host on the same network.

use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::{NodeId, PeerId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

use crate::domain::HostError;
use crate::ports::{Host, PeerStream, StreamHandler};

/// Buffer of each in-memory pipe direction.
const PIPE_CAPACITY: usize = 64 * 1024;

type Handlers = Arc<RwLock<HashMap<String, StreamHandler>>>;

/// Shared registry of mock hosts.
#[derive(Clone, Default)]
pub struct MockNetwork {
    hosts: Arc<RwLock<HashMap<PeerId, Handlers>>>,
    next_id: Arc<AtomicU64>,
}

impl MockNetwork {
    /// Empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Network with `n` hosts, all reachable from each other.
    pub fn full_mesh(n: usize) -> (Self, Vec<Arc<MockHost>>) {
        let net = Self::new();
        let hosts = (0..n).map(|_| net.add_host()).collect();
        (net, hosts)
    }

    /// Create a host with a fresh deterministic peer id.
    pub fn add_host(&self) -> Arc<MockHost> {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut key = [0u8; 32];
        key[..8].copy_from_slice(&n.to_be_bytes());
        let id = NodeId::from_public_key(&key);

        let handlers: Handlers = Arc::default();
        self.hosts.write().insert(id, handlers.clone());
        Arc::new(MockHost {
            id,
            handlers,
            network: self.clone(),
        })
    }

    /// Disconnect a host; dials to it fail as unreachable.
    pub fn remove_host(&self, peer: &PeerId) {
        self.hosts.write().remove(peer);
    }

    fn handler(&self, peer: &PeerId, protocol: &str) -> Result<StreamHandler, HostError> {
        let hosts = self.hosts.read();
        let handlers = hosts.get(peer).ok_or(HostError::PeerUnreachable(*peer))?;
        let handler = handlers.read().get(protocol).cloned();
        handler.ok_or_else(|| HostError::ProtocolNotSupported {
            peer: *peer,
            protocol: protocol.to_string(),
        })
    }
}

/// A peer endpoint on a [`MockNetwork`].
pub struct MockHost {
    id: PeerId,
    handlers: Handlers,
    network: MockNetwork,
}

#[async_trait]
impl Host for MockHost {
    fn peer_id(&self) -> PeerId {
        self.id
    }

    async fn new_stream(&self, peer: PeerId, protocol: &str) -> Result<PeerStream, HostError> {
        let handler = self.network.handler(&peer, protocol)?;
        let (local, remote) = tokio::io::duplex(PIPE_CAPACITY);
        trace!(from = %self.id, to = %peer, protocol, "mock stream opened");

        handler(PeerStream::new(Box::new(remote), self.id, protocol));
        Ok(PeerStream::new(Box::new(local), peer, protocol))
    }

    fn set_stream_handler(&self, protocol: &str, handler: StreamHandler) {
        self.handlers.write().insert(protocol.to_string(), handler);
    }

    fn remove_stream_handler(&self, protocol: &str) {
        self.handlers.write().remove(protocol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_stream_reaches_handler() {
        let (_net, hosts) = MockNetwork::full_mesh(2);
        hosts[1].set_stream_handler(
            "/echo",
            Arc::new(|mut stream: PeerStream| {
                tokio::spawn(async move {
                    let mut buf = [0u8; 4];
                    if stream.read_exact(&mut buf).await.is_ok() {
                        let _ = stream.write_all(&buf).await;
                    }
                });
            }),
        );

        let mut stream = hosts[0].new_stream(hosts[1].peer_id(), "/echo").await.unwrap();
        assert_eq!(stream.remote_peer(), hosts[1].peer_id());
        stream.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn test_unknown_protocol_and_peer() {
        let (net, hosts) = MockNetwork::full_mesh(2);
        let target = hosts[1].peer_id();

        let err = hosts[0].new_stream(target, "/none").await.unwrap_err();
        assert!(matches!(err, HostError::ProtocolNotSupported { .. }));

        net.remove_host(&target);
        let err = hosts[0].new_stream(target, "/none").await.unwrap_err();
        assert_eq!(err, HostError::PeerUnreachable(target));
    }

    #[tokio::test]
    async fn test_removed_handler_refuses_streams() {
        let (_net, hosts) = MockNetwork::full_mesh(2);
        hosts[1].set_stream_handler("/p", Arc::new(|_stream: PeerStream| {}));
        assert!(hosts[0].new_stream(hosts[1].peer_id(), "/p").await.is_ok());

        hosts[1].remove_stream_handler("/p");
        assert!(hosts[0].new_stream(hosts[1].peer_id(), "/p").await.is_err());
    }

    #[test]
    fn test_peer_ids_are_distinct() {
        let (_net, hosts) = MockNetwork::full_mesh(3);
        assert_ne!(hosts[0].peer_id(), hosts[1].peer_id());
        assert_ne!(hosts[1].peer_id(), hosts[2].peer_id());
    }
}
