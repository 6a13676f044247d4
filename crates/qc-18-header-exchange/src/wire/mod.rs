//! # Wire Protocol
//!
//! Messages exchanged on a header exchange stream and their framing.

pub mod codec;
pub mod messages;

pub use codec::{CodecError, MessageCodec, LENGTH_PREFIX_SIZE};
pub use messages::{
    CommitMsg, CommitSigMsg, DataAvailabilityHeaderMsg, ExtendedHeaderMsg, ExtendedHeaderRequest,
    HeaderResponse, RawHeaderMsg, ValidatorMsg, ValidatorSetMsg,
};
