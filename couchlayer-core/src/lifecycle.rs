//! Component lifecycle contract and the reference registry components are wired with.

use async_trait::async_trait;
use std::sync::Arc;

use crate::{
    config::ConfigParams,
    connection::StoreConnection,
    discovery::{CredentialStore, DiscoveryService},
    error::PersistenceResult,
};

/// Reference key under which a shared [`StoreConnection`] is looked up by default.
pub const DEFAULT_CONNECTION_KEY: &str = "default";

/// Components that read static configuration before being opened.
pub trait Configurable {
    fn configure(&mut self, config: &ConfigParams) -> PersistenceResult<()>;
}

/// Components wired to collaborators through a [`References`] registry.
pub trait Referenceable {
    fn set_references(&mut self, references: &References) -> PersistenceResult<()>;

    fn unset_references(&mut self);
}

/// Components with an open/closed lifecycle.
#[async_trait]
pub trait Opener: Send + Sync {
    async fn is_open(&self) -> bool;

    async fn open(&self, correlation_id: Option<&str>) -> PersistenceResult<()>;

    async fn close(&self, correlation_id: Option<&str>) -> PersistenceResult<()>;
}

/// Registry of collaborators handed to components on `set_references`.
#[derive(Debug, Clone, Default)]
pub struct References {
    discovery: Vec<Arc<dyn DiscoveryService>>,
    credential_stores: Vec<Arc<dyn CredentialStore>>,
    connections: Vec<(String, Arc<StoreConnection>)>,
}

impl References {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_discovery(mut self, discovery: Arc<dyn DiscoveryService>) -> Self {
        self.discovery.push(discovery);
        self
    }

    pub fn with_credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credential_stores.push(store);
        self
    }

    /// Registers a shared connection under `key`. A connection registered here
    /// is owned by whoever registered it; persistence components only borrow it.
    pub fn with_connection(mut self, key: &str, connection: Arc<StoreConnection>) -> Self {
        self.connections.push((key.to_string(), connection));
        self
    }

    /// Discovery services, in registration order.
    pub fn discovery(&self) -> &[Arc<dyn DiscoveryService>] {
        &self.discovery
    }

    pub fn credential_stores(&self) -> &[Arc<dyn CredentialStore>] {
        &self.credential_stores
    }

    /// Looks up a shared connection by reference key.
    pub fn connection(&self, key: &str) -> Option<Arc<StoreConnection>> {
        self.connections
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, connection)| connection.clone())
    }
}
