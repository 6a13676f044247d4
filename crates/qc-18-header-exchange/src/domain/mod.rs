//! # Domain Layer
//!
//! Extended header model, request modes and error types.

pub mod entities;
pub mod errors;
pub mod value_objects;

pub use entities::{
    Commit, CommitSig, DataAvailabilityHeader, ExtendedHeader, RawHeader, Validator, ValidatorSet,
};
pub use errors::{ExchangeError, HeaderError, HostError, RequestError, StoreError};
pub use value_objects::{LifecycleState, RequestMode, HEAD_HEIGHT_SENTINEL};
