//! # Outbound Ports
//!
//! Dependencies of the exchange: the header store and the peer endpoint.

use async_trait::async_trait;
use shared_types::{Hash, PeerId};
use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::domain::{ExtendedHeader, HostError, StoreError};

/// Header store - outbound port.
///
/// Implementations synchronize internally; the exchange calls it from many
/// stream tasks at once without coordination.
#[async_trait]
pub trait HeaderStore: Send + Sync {
    /// Header at the highest known height.
    async fn head(&self) -> Result<ExtendedHeader, StoreError>;

    /// Header with the given content hash.
    async fn get(&self, hash: &Hash) -> Result<ExtendedHeader, StoreError>;

    /// Header at `height`.
    async fn get_by_height(&self, height: u64) -> Result<ExtendedHeader, StoreError>;

    /// Headers for heights `[from, to)`, ascending, exactly `to - from` long.
    async fn get_range_by_height(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<ExtendedHeader>, StoreError>;

    /// Whether a header with this hash is stored.
    async fn has(&self, hash: &Hash) -> Result<bool, StoreError>;

    /// Add headers, advancing the head when a higher height arrives.
    async fn append(&self, headers: Vec<ExtendedHeader>) -> Result<(), StoreError>;
}

/// Any bidirectional async byte stream.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

/// A negotiated stream to a remote peer for one protocol.
pub struct PeerStream {
    inner: Box<dyn AsyncStream>,
    remote: PeerId,
    protocol: String,
}

impl PeerStream {
    /// Wrap a transport stream already negotiated for `protocol`.
    pub fn new(inner: Box<dyn AsyncStream>, remote: PeerId, protocol: impl Into<String>) -> Self {
        Self {
            inner,
            remote,
            protocol: protocol.into(),
        }
    }

    /// Peer on the other end.
    pub fn remote_peer(&self) -> PeerId {
        self.remote
    }

    /// Negotiated protocol identifier.
    pub fn protocol(&self) -> &str {
        &self.protocol
    }
}

impl fmt::Debug for PeerStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerStream")
            .field("remote", &self.remote)
            .field("protocol", &self.protocol)
            .finish()
    }
}

impl AsyncRead for PeerStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for PeerStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Callback invoked for every inbound stream of a registered protocol.
pub type StreamHandler = Arc<dyn Fn(PeerStream) + Send + Sync>;

/// Peer endpoint - outbound port.
///
/// Shared by the client and server halves; must allow concurrent stream
/// creation and acceptance.
#[async_trait]
pub trait Host: Send + Sync {
    /// Local peer identity.
    fn peer_id(&self) -> PeerId;

    /// Open a stream to `peer` negotiated for `protocol`.
    async fn new_stream(&self, peer: PeerId, protocol: &str) -> Result<PeerStream, HostError>;

    /// Route inbound streams for `protocol` to `handler`, replacing any
    /// previous handler.
    fn set_stream_handler(&self, protocol: &str, handler: StreamHandler);

    /// Stop routing `protocol`; later dials for it are refused.
    fn remove_stream_handler(&self, protocol: &str);
}
