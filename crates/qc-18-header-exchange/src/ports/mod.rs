//! # Ports
//!
//! Inbound (API) and outbound (dependency) traits.

pub mod inbound;
pub mod outbound;

pub use inbound::HeaderExchange;
pub use outbound::{AsyncStream, HeaderStore, Host, PeerStream, StreamHandler};
