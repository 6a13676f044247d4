//! # P2P Exchange
//!
//! Client and server halves bound to one host, with a shared lifecycle.

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{Hash, PeerId};
use std::sync::Arc;
use tracing::info;

use super::{ExchangeClient, ExchangeServer};
use crate::config::ExchangeConfig;
use crate::domain::{ExchangeError, ExtendedHeader, LifecycleState};
use crate::ports::{HeaderExchange, HeaderStore, Host};

/// Composed header exchange.
///
/// A node that only serves is built without a server peer; a node that only
/// requests is built without a store.
pub struct P2PExchange {
    host: Arc<dyn Host>,
    client: Option<ExchangeClient>,
    server: Option<ExchangeServer>,
    state: Mutex<LifecycleState>,
}

impl P2PExchange {
    /// Exchange with an optional client role (`server_peer`) and an optional
    /// server role (`store`).
    pub fn new(
        host: Arc<dyn Host>,
        server_peer: Option<PeerId>,
        store: Option<Arc<dyn HeaderStore>>,
        config: ExchangeConfig,
    ) -> Self {
        let client =
            server_peer.map(|peer| ExchangeClient::new(host.clone(), peer, config.clone()));
        let server = store.map(|store| ExchangeServer::new(host.clone(), store, config));
        Self {
            host,
            client,
            server,
            state: Mutex::new(LifecycleState::Created),
        }
    }

    /// Request-only exchange.
    pub fn client_only(host: Arc<dyn Host>, server_peer: PeerId, config: ExchangeConfig) -> Self {
        Self::new(host, Some(server_peer), None, config)
    }

    /// Serve-only exchange.
    pub fn server_only(
        host: Arc<dyn Host>,
        store: Arc<dyn HeaderStore>,
        config: ExchangeConfig,
    ) -> Self {
        Self::new(host, None, Some(store), config)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// Client half, if configured.
    pub fn client(&self) -> Option<&ExchangeClient> {
        self.client.as_ref()
    }

    /// Server half, if configured.
    pub fn server(&self) -> Option<&ExchangeServer> {
        self.server.as_ref()
    }

    /// Register the server handler. The client dials on demand.
    pub fn start(&self) -> Result<(), ExchangeError> {
        let mut state = self.state.lock();
        match *state {
            LifecycleState::Running => return Ok(()),
            LifecycleState::Stopped => return Err(ExchangeError::Stopped),
            LifecycleState::Created => {}
        }
        if let Some(server) = &self.server {
            server.start()?;
        }
        *state = LifecycleState::Running;
        info!(
            peer = %self.host.peer_id(),
            client = self.client.is_some(),
            server = self.server.is_some(),
            "Header exchange started"
        );
        Ok(())
    }

    /// Stop both halves. The exchange cannot be restarted.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock();
            if *state == LifecycleState::Stopped {
                return;
            }
            *state = LifecycleState::Stopped;
        }
        if let Some(client) = &self.client {
            client.stop();
        }
        if let Some(server) = &self.server {
            server.stop().await;
        }
        info!(peer = %self.host.peer_id(), "Header exchange stopped");
    }

    fn client_role(&self) -> Result<&ExchangeClient, ExchangeError> {
        if self.state() == LifecycleState::Stopped {
            return Err(ExchangeError::Stopped);
        }
        self.client
            .as_ref()
            .ok_or(ExchangeError::RoleUnavailable("server peer"))
    }
}

#[async_trait]
impl HeaderExchange for P2PExchange {
    async fn request_head(&self) -> Result<ExtendedHeader, ExchangeError> {
        self.client_role()?.request_head().await
    }

    async fn request_header(&self, height: u64) -> Result<ExtendedHeader, ExchangeError> {
        self.client_role()?.request_header(height).await
    }

    async fn request_headers(
        &self,
        from: u64,
        amount: u64,
    ) -> Result<Vec<ExtendedHeader>, ExchangeError> {
        self.client_role()?.request_headers(from, amount).await
    }

    async fn request_by_hash(&self, hash: &Hash) -> Result<ExtendedHeader, ExchangeError> {
        self.client_role()?.request_by_hash(hash).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryHeaderStore, MockNetwork};

    #[tokio::test]
    async fn test_start_stop_cycle() {
        let (_net, hosts) = MockNetwork::full_mesh(1);
        let host: Arc<dyn Host> = hosts[0].clone();
        let exchange = P2PExchange::server_only(
            host,
            Arc::new(InMemoryHeaderStore::new()),
            ExchangeConfig::for_testing(),
        );
        assert_eq!(exchange.state(), LifecycleState::Created);

        exchange.start().unwrap();
        assert_eq!(exchange.state(), LifecycleState::Running);
        assert_eq!(
            exchange.server().map(ExchangeServer::state),
            Some(LifecycleState::Running)
        );

        exchange.stop().await;
        assert_eq!(exchange.state(), LifecycleState::Stopped);
        assert!(matches!(exchange.start(), Err(ExchangeError::Stopped)));
    }

    #[tokio::test]
    async fn test_server_only_has_no_client_role() {
        let (_net, hosts) = MockNetwork::full_mesh(1);
        let host: Arc<dyn Host> = hosts[0].clone();
        let exchange = P2PExchange::server_only(
            host,
            Arc::new(InMemoryHeaderStore::new()),
            ExchangeConfig::for_testing(),
        );
        exchange.start().unwrap();
        assert!(matches!(
            exchange.request_head().await,
            Err(ExchangeError::RoleUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_stopped_exchange_refuses_requests() {
        let (_net, hosts) = MockNetwork::full_mesh(2);
        let host: Arc<dyn Host> = hosts[0].clone();
        let exchange =
            P2PExchange::client_only(host, hosts[1].peer_id(), ExchangeConfig::for_testing());
        exchange.stop().await;
        assert!(matches!(
            exchange.request_header(1).await,
            Err(ExchangeError::Stopped)
        ));
    }
}
