//! # Core Primitives
//!
//! ## Clusters
//!
//! - **Chain**: `Hash`, `Address`
//! - **Cryptography**: `PublicKey`, `Signature`
//! - **Networking**: `NodeId`, `PeerId`

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A 32-byte SHA-256 hash.
pub type Hash = [u8; 32];

/// A 64-byte Ed25519 signature.
pub type Signature = [u8; 64];

/// A 32-byte Ed25519 public key.
pub type PublicKey = [u8; 32];

/// A 20-byte address derived from a public key.
pub type Address = [u8; 20];

/// Unique identifier for a node in the network.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct NodeId(pub [u8; 32]);

/// A peer identifier (alias for `NodeId` in peer contexts).
pub type PeerId = NodeId;

impl NodeId {
    /// Wrap raw identifier bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive a node identifier from the node's public key (SHA-256 of the key).
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        Self(Sha256::digest(public_key).into())
    }

    /// Raw identifier bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for NodeId {
    /// Short hex form (first 8 bytes), enough to tell peers apart in logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0[..8]))
    }
}

/// Short hex rendering of a hash for log fields.
pub fn short_hash(hash: &Hash) -> String {
    hex::encode(&hash[..8])
}

/// Derive an address from a public key: the first 20 bytes of its SHA-256.
pub fn address_from_public_key(public_key: &PublicKey) -> Address {
    let digest = Sha256::digest(public_key);
    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[..20]);
    address
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_from_public_key_is_deterministic() {
        let a = NodeId::from_public_key(&[7u8; 32]);
        let b = NodeId::from_public_key(&[7u8; 32]);
        let c = NodeId::from_public_key(&[8u8; 32]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_node_id_display_is_short_hex() {
        let id = NodeId::new([0xAB; 32]);
        assert_eq!(id.to_string(), "abababababababab");
    }

    #[test]
    fn test_node_id_bincode_is_raw_bytes() {
        let id = NodeId::new([3u8; 32]);
        let bytes = bincode::serialize(&id).unwrap();
        assert_eq!(bytes.len(), 32);
        let back: NodeId = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_address_from_public_key() {
        let address = address_from_public_key(&[1u8; 32]);
        let digest = Sha256::digest([1u8; 32]);
        assert_eq!(&address[..], &digest[..20]);
    }
}
