//! # Domain Entities
//!
//! The extended header: a block header plus the commit, validator set and
//! data availability roots needed to verify it.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use sha2::{Digest, Sha256};
use shared_types::{Address, Hash, PublicKey, Signature};

use super::errors::HeaderError;

/// Block header fields that are hashed to identify the block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawHeader {
    /// Header format version.
    pub version: u64,
    /// Chain identifier.
    pub chain_id: String,
    /// Block height, starting at 1.
    pub height: u64,
    /// Block time (unix seconds).
    pub time: u64,
    /// Hash of the previous header.
    pub last_block_hash: Hash,
    /// Hash of the data availability header.
    pub data_hash: Hash,
    /// Hash of the validator set that signed this block.
    pub validators_hash: Hash,
    /// Application state root after the previous block.
    pub app_hash: Hash,
    /// Address of the block proposer.
    pub proposer_address: Address,
}

impl RawHeader {
    /// Canonical byte encoding: fixed field order, big-endian integers,
    /// length-prefixed chain id.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 * 3 + 4 + self.chain_id.len() + 32 * 4 + 20);
        out.extend_from_slice(&self.version.to_be_bytes());
        out.extend_from_slice(&(self.chain_id.len() as u32).to_be_bytes());
        out.extend_from_slice(self.chain_id.as_bytes());
        out.extend_from_slice(&self.height.to_be_bytes());
        out.extend_from_slice(&self.time.to_be_bytes());
        out.extend_from_slice(&self.last_block_hash);
        out.extend_from_slice(&self.data_hash);
        out.extend_from_slice(&self.validators_hash);
        out.extend_from_slice(&self.app_hash);
        out.extend_from_slice(&self.proposer_address);
        out
    }

    /// SHA-256 of the canonical encoding.
    pub fn hash(&self) -> Hash {
        Sha256::digest(self.canonical_bytes()).into()
    }
}

/// One validator's signature over a block.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSig {
    /// Signing validator.
    pub validator_address: Address,
    /// Signature time (unix seconds).
    pub timestamp: u64,
    /// Ed25519 signature over [`Commit::sign_bytes`].
    #[serde_as(as = "Bytes")]
    pub signature: Signature,
}

/// Signatures that finalized a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Height of the committed block.
    pub height: u64,
    /// Consensus round the block was committed in.
    pub round: u32,
    /// Hash of the committed header.
    pub block_hash: Hash,
    /// Validator signatures.
    pub signatures: Vec<CommitSig>,
}

impl Commit {
    /// Bytes each validator signs for a block at `height`/`round`.
    pub fn sign_bytes(height: u64, round: u32, block_hash: &Hash) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + 4 + 32);
        out.extend_from_slice(&height.to_be_bytes());
        out.extend_from_slice(&round.to_be_bytes());
        out.extend_from_slice(block_hash);
        out
    }
}

/// A validator entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    /// Address derived from `pub_key`.
    pub address: Address,
    /// Ed25519 public key.
    pub pub_key: PublicKey,
    /// Voting power.
    pub voting_power: u64,
}

/// The validator set that signed a block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSet {
    /// Validators in proposer order.
    pub validators: Vec<Validator>,
}

impl ValidatorSet {
    /// Hash committed to in [`RawHeader::validators_hash`].
    pub fn hash(&self) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update((self.validators.len() as u32).to_be_bytes());
        for v in &self.validators {
            hasher.update(v.address);
            hasher.update(v.pub_key);
            hasher.update(v.voting_power.to_be_bytes());
        }
        hasher.finalize().into()
    }

    /// Sum of all voting power.
    pub fn total_voting_power(&self) -> u64 {
        self.validators
            .iter()
            .fold(0u64, |acc, v| acc.saturating_add(v.voting_power))
    }
}

/// Row and column roots of the erasure-coded block data.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataAvailabilityHeader {
    /// Row Merkle roots.
    pub row_roots: Vec<Hash>,
    /// Column Merkle roots.
    pub column_roots: Vec<Hash>,
}

impl DataAvailabilityHeader {
    /// Hash committed to in [`RawHeader::data_hash`].
    pub fn hash(&self) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update((self.row_roots.len() as u32).to_be_bytes());
        for root in &self.row_roots {
            hasher.update(root);
        }
        hasher.update((self.column_roots.len() as u32).to_be_bytes());
        for root in &self.column_roots {
            hasher.update(root);
        }
        hasher.finalize().into()
    }
}

/// Block header plus everything needed to verify it.
///
/// Immutable once built: identity is `(height, hash)` and both derive from
/// [`RawHeader`] alone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedHeader {
    /// The hashed header.
    pub raw: RawHeader,
    /// Commit finalizing `raw`.
    pub commit: Commit,
    /// Validators that produced `commit`.
    pub validator_set: ValidatorSet,
    /// Data availability roots hashed into `raw.data_hash`.
    pub dah: DataAvailabilityHeader,
}

impl ExtendedHeader {
    /// Block height.
    pub fn height(&self) -> u64 {
        self.raw.height
    }

    /// Content hash of the header.
    pub fn hash(&self) -> Hash {
        self.raw.hash()
    }

    /// Hash of the parent header.
    pub fn last_hash(&self) -> &Hash {
        &self.raw.last_block_hash
    }

    /// Structural consistency checks.
    ///
    /// Does not verify signatures; that belongs to consensus verification.
    pub fn validate_basic(&self) -> Result<(), HeaderError> {
        if self.raw.height == 0 {
            return Err(HeaderError::InvalidHeight(0));
        }
        if self.commit.height != self.raw.height {
            return Err(HeaderError::CommitHeightMismatch {
                header: self.raw.height,
                commit: self.commit.height,
            });
        }
        if self.commit.block_hash != self.hash() {
            return Err(HeaderError::CommitHashMismatch);
        }
        if self.validator_set.validators.is_empty() {
            return Err(HeaderError::EmptyValidatorSet);
        }
        if self.validator_set.hash() != self.raw.validators_hash {
            return Err(HeaderError::ValidatorsHashMismatch);
        }
        if self.dah.hash() != self.raw.data_hash {
            return Err(HeaderError::DataHashMismatch);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ExtendedHeader {
        let validator_set = ValidatorSet {
            validators: vec![Validator {
                address: [1u8; 20],
                pub_key: [2u8; 32],
                voting_power: 10,
            }],
        };
        let dah = DataAvailabilityHeader {
            row_roots: vec![[3u8; 32]],
            column_roots: vec![[4u8; 32]],
        };
        let raw = RawHeader {
            version: 1,
            chain_id: "test".into(),
            height: 7,
            time: 1_700_000_000,
            last_block_hash: [5u8; 32],
            data_hash: dah.hash(),
            validators_hash: validator_set.hash(),
            app_hash: [6u8; 32],
            proposer_address: [1u8; 20],
        };
        let commit = Commit {
            height: 7,
            round: 0,
            block_hash: raw.hash(),
            signatures: vec![CommitSig {
                validator_address: [1u8; 20],
                timestamp: 1_700_000_000,
                signature: [9u8; 64],
            }],
        };
        ExtendedHeader {
            raw,
            commit,
            validator_set,
            dah,
        }
    }

    #[test]
    fn test_hash_is_deterministic() {
        let h = sample();
        assert_eq!(h.hash(), h.clone().hash());
    }

    #[test]
    fn test_hash_changes_with_content() {
        let a = sample();
        let mut b = sample();
        b.raw.time += 1;
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_chain_id_length_prefix_disambiguates() {
        let mut a = sample().raw;
        let mut b = sample().raw;
        a.chain_id = "ab".into();
        b.chain_id = "a".into();
        assert_ne!(a.canonical_bytes(), b.canonical_bytes());
    }

    #[test]
    fn test_validate_basic_ok() {
        assert!(sample().validate_basic().is_ok());
    }

    #[test]
    fn test_validate_basic_rejects_zero_height() {
        let mut h = sample();
        h.raw.height = 0;
        assert!(matches!(
            h.validate_basic(),
            Err(HeaderError::InvalidHeight(0))
        ));
    }

    #[test]
    fn test_validate_basic_rejects_commit_mismatch() {
        let mut h = sample();
        h.commit.height = 8;
        assert!(matches!(
            h.validate_basic(),
            Err(HeaderError::CommitHeightMismatch { header: 7, commit: 8 })
        ));

        let mut h = sample();
        h.commit.block_hash = [0u8; 32];
        assert!(matches!(
            h.validate_basic(),
            Err(HeaderError::CommitHashMismatch)
        ));
    }

    #[test]
    fn test_validate_basic_rejects_foreign_validator_set() {
        let mut h = sample();
        h.validator_set.validators[0].voting_power = 11;
        assert!(matches!(
            h.validate_basic(),
            Err(HeaderError::ValidatorsHashMismatch)
        ));
    }

    #[test]
    fn test_validate_basic_rejects_data_hash_mismatch() {
        let mut h = sample();
        h.dah.row_roots.push([0u8; 32]);
        assert!(matches!(
            h.validate_basic(),
            Err(HeaderError::DataHashMismatch)
        ));
    }

    #[test]
    fn test_total_voting_power() {
        let h = sample();
        assert_eq!(h.validator_set.total_voting_power(), 10);
    }
}
