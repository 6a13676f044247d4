//! # Service Layer
//!
//! - [`ExchangeClient`]: requests headers from a server peer
//! - [`ExchangeServer`]: answers requests from the local store
//! - [`P2PExchange`]: both halves with one lifecycle

pub mod client;
pub mod exchange;
pub mod server;

pub use client::ExchangeClient;
pub use exchange::P2PExchange;
pub use server::ExchangeServer;
