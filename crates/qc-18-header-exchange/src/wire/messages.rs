//! # Wire Messages
//!
//! Schema of the exchange protocol and conversion to and from the domain
//! header. Byte fields travel as `Vec<u8>` and are length-checked on decode.

use serde::{Deserialize, Serialize};
use shared_types::Hash;

use crate::domain::{
    Commit, CommitSig, DataAvailabilityHeader, ExtendedHeader, HeaderError, RawHeader,
    RequestError, RequestMode, Validator, ValidatorSet, HEAD_HEIGHT_SENTINEL,
};

/// A single request; exactly one per stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedHeaderRequest {
    /// Content hash; when present the request is a hash lookup.
    pub hash: Option<Vec<u8>>,
    /// Start height, or [`HEAD_HEIGHT_SENTINEL`] for the head.
    pub height: u64,
    /// Number of consecutive headers.
    pub amount: u64,
}

impl ExtendedHeaderRequest {
    /// Request for the current head.
    pub fn head() -> Self {
        Self {
            hash: None,
            height: HEAD_HEIGHT_SENTINEL,
            amount: 1,
        }
    }

    /// Request for `amount` headers starting at `from`.
    pub fn by_height(from: u64, amount: u64) -> Self {
        Self {
            hash: None,
            height: from,
            amount,
        }
    }

    /// Request for the header with the given hash.
    pub fn by_hash(hash: &Hash) -> Self {
        Self {
            hash: Some(hash.to_vec()),
            height: 0,
            amount: 1,
        }
    }

    /// Resolve the effective lookup mode, rejecting malformed parameters.
    pub fn mode(&self, max_amount: u64) -> Result<RequestMode, RequestError> {
        if let Some(bytes) = &self.hash {
            let hash: Hash = bytes
                .as_slice()
                .try_into()
                .map_err(|_| RequestError::InvalidHashLength(bytes.len()))?;
            return Ok(RequestMode::Hash(hash));
        }
        if self.height == HEAD_HEIGHT_SENTINEL {
            return Ok(RequestMode::Head);
        }
        if self.amount == 0 {
            return Err(RequestError::ZeroAmount);
        }
        if self.amount > max_amount {
            return Err(RequestError::AmountTooLarge {
                amount: self.amount,
                max: max_amount,
            });
        }
        if self.height.checked_add(self.amount).is_none() {
            return Err(RequestError::HeightOverflow {
                height: self.height,
                amount: self.amount,
            });
        }
        Ok(RequestMode::Height {
            from: self.height,
            amount: self.amount,
        })
    }
}

/// One response frame. `NotFound` is explicit rather than an empty payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderResponse {
    /// The requested header.
    Found(ExtendedHeaderMsg),
    /// The server has no such header.
    NotFound,
}

/// Wire form of [`RawHeader`].
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawHeaderMsg {
    pub version: u64,
    pub chain_id: String,
    pub height: u64,
    pub time: u64,
    pub last_block_hash: Vec<u8>,
    pub data_hash: Vec<u8>,
    pub validators_hash: Vec<u8>,
    pub app_hash: Vec<u8>,
    pub proposer_address: Vec<u8>,
}

/// Wire form of [`CommitSig`].
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSigMsg {
    pub validator_address: Vec<u8>,
    pub timestamp: u64,
    pub signature: Vec<u8>,
}

/// Wire form of [`Commit`].
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMsg {
    pub height: u64,
    pub round: u32,
    pub block_hash: Vec<u8>,
    pub signatures: Vec<CommitSigMsg>,
}

/// Wire form of [`Validator`].
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorMsg {
    pub address: Vec<u8>,
    pub pub_key: Vec<u8>,
    pub voting_power: u64,
}

/// Wire form of [`ValidatorSet`].
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSetMsg {
    pub validators: Vec<ValidatorMsg>,
}

/// Wire form of [`DataAvailabilityHeader`].
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataAvailabilityHeaderMsg {
    pub row_roots: Vec<Vec<u8>>,
    pub column_roots: Vec<Vec<u8>>,
}

/// Wire form of [`ExtendedHeader`]. Every part is required on decode.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedHeaderMsg {
    /// Hashed header fields.
    pub raw_header: Option<RawHeaderMsg>,
    /// Commit.
    pub commit: Option<CommitMsg>,
    /// Validator set.
    pub validator_set: Option<ValidatorSetMsg>,
    /// Data availability roots.
    pub dah: Option<DataAvailabilityHeaderMsg>,
}

fn to_array<const N: usize>(field: &'static str, bytes: &[u8]) -> Result<[u8; N], HeaderError> {
    bytes.try_into().map_err(|_| HeaderError::InvalidLength {
        field,
        expected: N,
        got: bytes.len(),
    })
}

impl ExtendedHeader {
    /// Encode into the wire message. Never fails.
    pub fn to_wire(&self) -> ExtendedHeaderMsg {
        let raw = &self.raw;
        ExtendedHeaderMsg {
            raw_header: Some(RawHeaderMsg {
                version: raw.version,
                chain_id: raw.chain_id.clone(),
                height: raw.height,
                time: raw.time,
                last_block_hash: raw.last_block_hash.to_vec(),
                data_hash: raw.data_hash.to_vec(),
                validators_hash: raw.validators_hash.to_vec(),
                app_hash: raw.app_hash.to_vec(),
                proposer_address: raw.proposer_address.to_vec(),
            }),
            commit: Some(CommitMsg {
                height: self.commit.height,
                round: self.commit.round,
                block_hash: self.commit.block_hash.to_vec(),
                signatures: self
                    .commit
                    .signatures
                    .iter()
                    .map(|sig| CommitSigMsg {
                        validator_address: sig.validator_address.to_vec(),
                        timestamp: sig.timestamp,
                        signature: sig.signature.to_vec(),
                    })
                    .collect(),
            }),
            validator_set: Some(ValidatorSetMsg {
                validators: self
                    .validator_set
                    .validators
                    .iter()
                    .map(|v| ValidatorMsg {
                        address: v.address.to_vec(),
                        pub_key: v.pub_key.to_vec(),
                        voting_power: v.voting_power,
                    })
                    .collect(),
            }),
            dah: Some(DataAvailabilityHeaderMsg {
                row_roots: self.dah.row_roots.iter().map(|r| r.to_vec()).collect(),
                column_roots: self.dah.column_roots.iter().map(|r| r.to_vec()).collect(),
            }),
        }
    }

    /// Decode a wire message and run [`ExtendedHeader::validate_basic`].
    pub fn from_wire(msg: ExtendedHeaderMsg) -> Result<Self, HeaderError> {
        let raw = msg.raw_header.ok_or(HeaderError::MissingField("raw_header"))?;
        let commit = msg.commit.ok_or(HeaderError::MissingField("commit"))?;
        let validator_set = msg
            .validator_set
            .ok_or(HeaderError::MissingField("validator_set"))?;
        let dah = msg.dah.ok_or(HeaderError::MissingField("dah"))?;

        let raw = RawHeader {
            version: raw.version,
            chain_id: raw.chain_id,
            height: raw.height,
            time: raw.time,
            last_block_hash: to_array("last_block_hash", &raw.last_block_hash)?,
            data_hash: to_array("data_hash", &raw.data_hash)?,
            validators_hash: to_array("validators_hash", &raw.validators_hash)?,
            app_hash: to_array("app_hash", &raw.app_hash)?,
            proposer_address: to_array("proposer_address", &raw.proposer_address)?,
        };

        let signatures = commit
            .signatures
            .iter()
            .map(|sig| {
                Ok(CommitSig {
                    validator_address: to_array("validator_address", &sig.validator_address)?,
                    timestamp: sig.timestamp,
                    signature: to_array("signature", &sig.signature)?,
                })
            })
            .collect::<Result<Vec<_>, HeaderError>>()?;
        let commit = Commit {
            height: commit.height,
            round: commit.round,
            block_hash: to_array("block_hash", &commit.block_hash)?,
            signatures,
        };

        let validators = validator_set
            .validators
            .iter()
            .map(|v| {
                Ok(Validator {
                    address: to_array("address", &v.address)?,
                    pub_key: to_array("pub_key", &v.pub_key)?,
                    voting_power: v.voting_power,
                })
            })
            .collect::<Result<Vec<_>, HeaderError>>()?;

        let dah = DataAvailabilityHeader {
            row_roots: dah
                .row_roots
                .iter()
                .map(|r| to_array("row_root", r))
                .collect::<Result<_, _>>()?,
            column_roots: dah
                .column_roots
                .iter()
                .map(|r| to_array("column_root", r))
                .collect::<Result<_, _>>()?,
        };

        let header = ExtendedHeader {
            raw,
            commit,
            validator_set: ValidatorSet { validators },
            dah,
        };
        header.validate_basic()?;
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestSuite;

    #[test]
    fn test_request_mode_precedence() {
        let hash = [7u8; 32];
        let mut req = ExtendedHeaderRequest::by_height(5, 3);
        req.hash = Some(hash.to_vec());
        assert_eq!(req.mode(10), Ok(RequestMode::Hash(hash)));

        assert_eq!(ExtendedHeaderRequest::head().mode(10), Ok(RequestMode::Head));
        assert_eq!(
            ExtendedHeaderRequest::by_height(5, 3).mode(10),
            Ok(RequestMode::Height { from: 5, amount: 3 })
        );
    }

    #[test]
    fn test_request_mode_rejects_bad_parameters() {
        let mut req = ExtendedHeaderRequest::head();
        req.hash = Some(vec![1, 2, 3]);
        assert_eq!(req.mode(10), Err(RequestError::InvalidHashLength(3)));

        assert_eq!(
            ExtendedHeaderRequest::by_height(1, 0).mode(10),
            Err(RequestError::ZeroAmount)
        );
        assert_eq!(
            ExtendedHeaderRequest::by_height(1, 11).mode(10),
            Err(RequestError::AmountTooLarge { amount: 11, max: 10 })
        );
        assert!(matches!(
            ExtendedHeaderRequest::by_height(u64::MAX, 2).mode(10),
            Err(RequestError::HeightOverflow { .. })
        ));
    }

    #[test]
    fn test_round_trip_preserves_identity() {
        let mut suite = TestSuite::new(3);
        let header = suite.gen_extended_header();
        let decoded = ExtendedHeader::from_wire(header.to_wire()).unwrap();
        assert_eq!(decoded.height(), header.height());
        assert_eq!(decoded.hash(), header.hash());
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_from_wire_missing_part() {
        let mut suite = TestSuite::new(1);
        let mut msg = suite.gen_extended_header().to_wire();
        msg.commit = None;
        assert_eq!(
            ExtendedHeader::from_wire(msg),
            Err(HeaderError::MissingField("commit"))
        );
        assert_eq!(
            ExtendedHeader::from_wire(ExtendedHeaderMsg::default()),
            Err(HeaderError::MissingField("raw_header"))
        );
    }

    #[test]
    fn test_from_wire_hash_length_mismatch() {
        let mut suite = TestSuite::new(1);
        let mut msg = suite.gen_extended_header().to_wire();
        if let Some(raw) = msg.raw_header.as_mut() {
            raw.last_block_hash.truncate(31);
        }
        assert_eq!(
            ExtendedHeader::from_wire(msg),
            Err(HeaderError::InvalidLength {
                field: "last_block_hash",
                expected: 32,
                got: 31,
            })
        );
    }

    #[test]
    fn test_from_wire_rejects_tampered_header() {
        let mut suite = TestSuite::new(2);
        let mut msg = suite.gen_extended_header().to_wire();
        if let Some(raw) = msg.raw_header.as_mut() {
            raw.time += 1;
        }
        assert_eq!(
            ExtendedHeader::from_wire(msg),
            Err(HeaderError::CommitHashMismatch)
        );
    }
}
