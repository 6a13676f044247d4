//! # Inbound Ports
//!
//! The API the exchange offers to the rest of the node.

use async_trait::async_trait;
use shared_types::Hash;

use crate::domain::{ExchangeError, ExtendedHeader};

/// Header exchange API - inbound port.
///
/// Every call opens its own stream; calls are independent and may complete
/// out of order. Dropping the returned future cancels the request and closes
/// its stream.
#[async_trait]
pub trait HeaderExchange: Send + Sync {
    /// Header at the server's highest height.
    async fn request_head(&self) -> Result<ExtendedHeader, ExchangeError>;

    /// Header at `height`.
    async fn request_header(&self, height: u64) -> Result<ExtendedHeader, ExchangeError>;

    /// `amount` consecutive headers starting at `from`, ascending.
    async fn request_headers(
        &self,
        from: u64,
        amount: u64,
    ) -> Result<Vec<ExtendedHeader>, ExchangeError>;

    /// Header with the given hash, or [`ExchangeError::NotFound`].
    async fn request_by_hash(&self, hash: &Hash) -> Result<ExtendedHeader, ExchangeError>;
}
