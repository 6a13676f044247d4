//! # Adapters
//!
//! Concrete implementations of the outbound ports.
//!
//! - [`InMemoryHeaderStore`]: `HeaderStore` over in-memory maps
//! - [`MockNetwork`] / [`MockHost`]: in-process peer endpoints
//! - [`TcpHost`]: peer endpoint over TCP

pub mod memory_store;
pub mod mock_network;
pub mod tcp_host;

pub use memory_store::InMemoryHeaderStore;
pub use mock_network::{MockHost, MockNetwork};
pub use tcp_host::TcpHost;
