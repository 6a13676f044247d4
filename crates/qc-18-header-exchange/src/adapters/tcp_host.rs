//! # TCP Host
//!
//! Peer endpoint over plain TCP, one connection per stream.
//!
//! ## Negotiation
//!
//! ```text
//! dialer                               listener
//!   |-- framed { peer_id, protocol } -->|
//!   |<-------- 1 byte: 1 = accept ------|   0 = no handler
//!   |====== protocol bytes follow ======|
//! ```
//!
//! The dialer's claimed peer id is not authenticated.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use shared_types::PeerId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::domain::HostError;
use crate::ports::{Host, PeerStream, StreamHandler};
use crate::wire::MessageCodec;

const NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(5);
const NEGOTIATION_MAX_SIZE: usize = 1024;
const ACCEPT: u8 = 1;
const REJECT: u8 = 0;

type Handlers = Arc<RwLock<HashMap<String, StreamHandler>>>;

#[derive(Debug, Serialize, Deserialize)]
struct Negotiation {
    peer_id: PeerId,
    protocol: String,
}

/// TCP peer endpoint.
pub struct TcpHost {
    id: PeerId,
    local_addr: SocketAddr,
    handlers: Handlers,
    peers: RwLock<HashMap<PeerId, SocketAddr>>,
    closed: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

impl TcpHost {
    /// Bind a listener on `addr` and start accepting streams.
    pub async fn bind(id: PeerId, addr: SocketAddr) -> Result<Arc<Self>, HostError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HostError::Transport(e.to_string()))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| HostError::Transport(e.to_string()))?;

        let handlers: Handlers = Arc::default();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(accept_loop(listener, handlers.clone(), shutdown_rx));

        info!(peer = %id, addr = %local_addr, "TCP host listening");
        Ok(Arc::new(Self {
            id,
            local_addr,
            handlers,
            peers: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
            shutdown_tx,
        }))
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Record where `peer` can be dialed.
    pub fn add_peer_address(&self, peer: PeerId, addr: SocketAddr) {
        self.peers.write().insert(peer, addr);
    }

    /// Stop accepting and refuse new outbound streams.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.shutdown_tx.send(true);
            info!(peer = %self.id, "TCP host closed");
        }
    }

    async fn dial(
        &self,
        peer: PeerId,
        addr: SocketAddr,
        protocol: &str,
    ) -> Result<TcpStream, HostError> {
        let mut socket = TcpStream::connect(addr)
            .await
            .map_err(|_| HostError::PeerUnreachable(peer))?;
        socket
            .set_nodelay(true)
            .map_err(|e| HostError::Transport(e.to_string()))?;

        let codec = MessageCodec::new(NEGOTIATION_MAX_SIZE);
        let hello = Negotiation {
            peer_id: self.id,
            protocol: protocol.to_string(),
        };
        codec
            .write(&mut socket, &hello)
            .await
            .map_err(|e| HostError::Transport(e.to_string()))?;

        match socket.read_u8().await {
            Ok(ACCEPT) => Ok(socket),
            Ok(_) => Err(HostError::ProtocolNotSupported {
                peer,
                protocol: protocol.to_string(),
            }),
            Err(e) => Err(HostError::Transport(e.to_string())),
        }
    }
}

impl Drop for TcpHost {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

#[async_trait]
impl Host for TcpHost {
    fn peer_id(&self) -> PeerId {
        self.id
    }

    async fn new_stream(&self, peer: PeerId, protocol: &str) -> Result<PeerStream, HostError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(HostError::Closed);
        }
        let addr = self
            .peers
            .read()
            .get(&peer)
            .copied()
            .ok_or(HostError::PeerUnreachable(peer))?;

        let socket = tokio::time::timeout(NEGOTIATION_TIMEOUT, self.dial(peer, addr, protocol))
            .await
            .map_err(|_| HostError::PeerUnreachable(peer))??;
        debug!(to = %peer, %addr, protocol, "TCP stream negotiated");
        Ok(PeerStream::new(Box::new(socket), peer, protocol))
    }

    fn set_stream_handler(&self, protocol: &str, handler: StreamHandler) {
        self.handlers.write().insert(protocol.to_string(), handler);
    }

    fn remove_stream_handler(&self, protocol: &str) {
        self.handlers.write().remove(protocol);
    }
}

async fn accept_loop(
    listener: TcpListener,
    handlers: Handlers,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                // sender dropped or shutdown requested
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((socket, addr)) => {
                    let handlers = handlers.clone();
                    tokio::spawn(async move {
                        if let Err(e) = negotiate_inbound(socket, &handlers).await {
                            debug!(%addr, error = %e, "inbound negotiation failed");
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "TCP accept failed");
                }
            }
        }
    }
    debug!("TCP accept loop stopped");
}

async fn negotiate_inbound(mut socket: TcpStream, handlers: &Handlers) -> Result<(), HostError> {
    let _ = socket.set_nodelay(true);
    let codec = MessageCodec::new(NEGOTIATION_MAX_SIZE);
    let read = codec.read::<_, Negotiation>(&mut socket);
    let (hello, _) = tokio::time::timeout(NEGOTIATION_TIMEOUT, read)
        .await
        .map_err(|_| HostError::Transport("negotiation timed out".into()))?
        .map_err(|e| HostError::Transport(e.to_string()))?;

    let handler = handlers.read().get(&hello.protocol).cloned();
    let Some(handler) = handler else {
        let _ = socket.write_u8(REJECT).await;
        return Err(HostError::ProtocolNotSupported {
            peer: hello.peer_id,
            protocol: hello.protocol,
        });
    };

    socket
        .write_u8(ACCEPT)
        .await
        .map_err(|e| HostError::Transport(e.to_string()))?;
    handler(PeerStream::new(Box::new(socket), hello.peer_id, hello.protocol));
    Ok(())
}
