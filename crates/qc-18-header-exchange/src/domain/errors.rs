//! # Domain Errors
//!
//! Error types for the header exchange, one enum per concern.

use shared_types::PeerId;
use std::time::Duration;
use thiserror::Error;

/// Structural problems with a header or its wire form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    /// A required wire field is absent.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// A fixed-width byte field has the wrong length.
    #[error("Invalid length for {field}: expected {expected}, got {got}")]
    InvalidLength {
        /// Field name
        field: &'static str,
        /// Required length
        expected: usize,
        /// Actual length
        got: usize,
    },

    /// Heights start at 1.
    #[error("Invalid header height: {0}")]
    InvalidHeight(u64),

    /// Commit does not belong to this header's height.
    #[error("Commit height {commit} does not match header height {header}")]
    CommitHeightMismatch {
        /// Header height
        header: u64,
        /// Commit height
        commit: u64,
    },

    /// Commit signs a different block.
    #[error("Commit block hash does not match header hash")]
    CommitHashMismatch,

    /// Validator set does not hash to `validators_hash`.
    #[error("Validator set hash mismatch")]
    ValidatorsHashMismatch,

    /// DAH does not hash to `data_hash`.
    #[error("Data availability header hash mismatch")]
    DataHashMismatch,

    /// No validators.
    #[error("Empty validator set")]
    EmptyValidatorSet,
}

/// Errors returned by a [`crate::ports::HeaderStore`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No header for the requested hash or height.
    #[error("Header not found")]
    NotFound,

    /// The store holds no headers yet.
    #[error("Store is empty")]
    Empty,

    /// `from >= to`.
    #[error("Invalid range [{from}, {to})")]
    InvalidRange {
        /// Inclusive lower bound
        from: u64,
        /// Exclusive upper bound
        to: u64,
    },

    /// Storage backend failure.
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Errors from the peer endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// Peer is unknown or not listening.
    #[error("Peer unreachable: {0}")]
    PeerUnreachable(PeerId),

    /// Peer has no handler for the protocol.
    #[error("Peer {peer} does not support protocol {protocol}")]
    ProtocolNotSupported {
        /// Remote peer
        peer: PeerId,
        /// Requested protocol
        protocol: String,
    },

    /// The local endpoint has been shut down.
    #[error("Host closed")]
    Closed,

    /// Underlying transport failure.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Request parameters rejected before any I/O.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// Hash must be 32 bytes.
    #[error("Invalid hash length: {0}")]
    InvalidHashLength(usize),

    /// At least one header must be requested.
    #[error("Amount must be at least 1")]
    ZeroAmount,

    /// Height 0 is the head sentinel and cannot be requested directly.
    #[error("Height 0 is reserved for head requests")]
    ZeroHeight,

    /// Amount exceeds the configured cap.
    #[error("Amount {amount} exceeds limit {max}")]
    AmountTooLarge {
        /// Requested amount
        amount: u64,
        /// Configured maximum
        max: u64,
    },

    /// `height + amount` does not fit in a u64.
    #[error("Range starting at {height} with amount {amount} overflows")]
    HeightOverflow {
        /// Start height
        height: u64,
        /// Requested amount
        amount: u64,
    },
}

/// Errors surfaced by the exchange API.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Could not open a stream to the server peer.
    #[error("Connectivity error: {0}")]
    Connectivity(#[from] HostError),

    /// Stream write or read failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// Peer sent something that is not a valid response.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Stream closed before all expected responses arrived.
    #[error("Incomplete response: expected {expected}, received {received}")]
    IncompleteResponse {
        /// Responses expected
        expected: u64,
        /// Responses received
        received: u64,
    },

    /// Peer has no header for the request.
    #[error("Header not found")]
    NotFound,

    /// Request did not complete within the deadline.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Request rejected locally.
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    /// Exchange has been stopped.
    #[error("Exchange stopped")]
    Stopped,

    /// Exchange was built without the requested role.
    #[error("Exchange has no {0} configured")]
    RoleUnavailable(&'static str),
}

impl ExchangeError {
    /// Peer could not be reached.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }

    /// Peer was reached but the exchange broke down.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::MalformedResponse(_) | Self::IncompleteResponse { .. }
        )
    }

    /// Peer answered that it has no such header.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Connectivity(_) => "connectivity",
            Self::Io(_) => "io",
            Self::MalformedResponse(_) | Self::IncompleteResponse { .. } => "protocol",
            Self::NotFound => "not_found",
            Self::Timeout(_) => "timeout",
            Self::InvalidRequest(_) | Self::RoleUnavailable(_) => "invalid",
            Self::Stopped => "stopped",
        }
    }
}
