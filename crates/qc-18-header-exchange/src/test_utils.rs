//! # Test Utilities
//!
//! Deterministic generator of signed, linked header chains.
//! Enable with the `test-utils` feature flag.
//!
//! ```rust,ignore
//! use qc_18_header_exchange::test_utils::TestSuite;
//!
//! let mut suite = TestSuite::new(3);
//! let headers = suite.gen_extended_headers(5); // heights 1..=5
//! ```

use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared_types::{address_from_public_key, Hash};
use std::sync::Arc;

use crate::adapters::InMemoryHeaderStore;
use crate::domain::{
    Commit, CommitSig, DataAvailabilityHeader, ExtendedHeader, RawHeader, Validator, ValidatorSet,
};

/// Chain id of generated headers.
pub const TEST_CHAIN_ID: &str = "qc-test";

const GENESIS_TIME: u64 = 1_700_000_000;
const BLOCK_TIME: u64 = 6;

/// Produces a chain of headers signed by a fixed validator set.
pub struct TestSuite {
    keys: Vec<SigningKey>,
    validator_set: ValidatorSet,
    head: Option<ExtendedHeader>,
    rng: StdRng,
}

impl TestSuite {
    /// Suite with `num_validators` deterministic validator keys (at least one).
    pub fn new(num_validators: usize) -> Self {
        let keys: Vec<SigningKey> = (0..num_validators.max(1))
            .map(|i| {
                let mut seed = [0u8; 32];
                seed[..8].copy_from_slice(&(i as u64 + 1).to_be_bytes());
                SigningKey::from_bytes(&seed)
            })
            .collect();

        let validators = keys
            .iter()
            .map(|key| {
                let pub_key = key.verifying_key().to_bytes();
                Validator {
                    address: address_from_public_key(&pub_key),
                    pub_key,
                    voting_power: 100,
                }
            })
            .collect();

        Self {
            keys,
            validator_set: ValidatorSet { validators },
            head: None,
            rng: StdRng::seed_from_u64(num_validators as u64),
        }
    }

    /// Validator set signing every generated header.
    pub fn validator_set(&self) -> &ValidatorSet {
        &self.validator_set
    }

    /// Last generated header.
    pub fn head(&self) -> Option<&ExtendedHeader> {
        self.head.as_ref()
    }

    /// Next header in the chain, linked to the previous one.
    pub fn gen_extended_header(&mut self) -> ExtendedHeader {
        let (height, last_block_hash) = match &self.head {
            Some(prev) => (prev.height() + 1, prev.hash()),
            None => (1, [0u8; 32]),
        };

        let dah = DataAvailabilityHeader {
            row_roots: vec![self.random_hash(), self.random_hash()],
            column_roots: vec![self.random_hash(), self.random_hash()],
        };
        let app_hash = self.random_hash();
        let proposer_address =
            self.validator_set.validators[(height as usize) % self.keys.len()].address;
        let raw = RawHeader {
            version: 1,
            chain_id: TEST_CHAIN_ID.to_string(),
            height,
            time: GENESIS_TIME + height * BLOCK_TIME,
            last_block_hash,
            data_hash: dah.hash(),
            validators_hash: self.validator_set.hash(),
            app_hash,
            proposer_address,
        };

        let block_hash = raw.hash();
        let round = 0;
        let sign_bytes = Commit::sign_bytes(height, round, &block_hash);
        let signatures = self
            .keys
            .iter()
            .zip(&self.validator_set.validators)
            .map(|(key, validator)| CommitSig {
                validator_address: validator.address,
                timestamp: raw.time,
                signature: key.sign(&sign_bytes).to_bytes(),
            })
            .collect();

        let header = ExtendedHeader {
            raw,
            commit: Commit {
                height,
                round,
                block_hash,
                signatures,
            },
            validator_set: self.validator_set.clone(),
            dah,
        };
        self.head = Some(header.clone());
        header
    }

    /// `n` consecutive headers.
    pub fn gen_extended_headers(&mut self, n: usize) -> Vec<ExtendedHeader> {
        (0..n).map(|_| self.gen_extended_header()).collect()
    }

    fn random_hash(&mut self) -> Hash {
        self.rng.gen()
    }
}

/// Store seeded with `n` headers from a fresh suite.
pub fn create_store(num_validators: usize, n: usize) -> (TestSuite, Arc<InMemoryHeaderStore>) {
    let mut suite = TestSuite::new(num_validators);
    let store = Arc::new(InMemoryHeaderStore::with_headers(
        suite.gen_extended_headers(n),
    ));
    (suite, store)
}
