//! Indirection services consulted while resolving connections and credentials.
//!
//! A connection entry carrying a `discovery_key` is looked up through a
//! [`DiscoveryService`]; a credential entry carrying a `store_key` through a
//! [`CredentialStore`]. Config-backed implementations are provided for tests
//! and static deployments.

use async_trait::async_trait;
use mea::rwlock::RwLock;
use std::{collections::HashMap, fmt::Debug};

use crate::{
    config::ConfigParams,
    error::PersistenceResult,
    params::{ConnectionParams, CredentialParams},
};

/// Resolves a discovery key into a connection entry.
#[async_trait]
pub trait DiscoveryService: Send + Sync + Debug {
    async fn resolve_one(
        &self,
        correlation_id: Option<&str>,
        key: &str,
    ) -> PersistenceResult<Option<ConnectionParams>>;
}

/// Resolves a store key into a credential entry.
#[async_trait]
pub trait CredentialStore: Send + Sync + Debug {
    async fn lookup(
        &self,
        correlation_id: Option<&str>,
        key: &str,
    ) -> PersistenceResult<Option<CredentialParams>>;
}

/// Discovery service backed by a static key to connection map.
///
/// Built from configuration where each top-level section is a key:
/// `key1.host=..., key1.port=..., key2.uri=...`.
#[derive(Debug, Default)]
pub struct MemoryDiscovery {
    items: RwLock<HashMap<String, ConnectionParams>>,
}

impl MemoryDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ConfigParams) -> Self {
        Self {
            items: RwLock::new(
                config
                    .section_names()
                    .into_iter()
                    .map(|key| {
                        let params = ConnectionParams::new(config.section(&key));
                        (key, params)
                    })
                    .collect(),
            ),
        }
    }

    /// Registers or replaces the connection under `key`.
    pub async fn register(&self, key: &str, connection: ConnectionParams) {
        self.items.write().await.insert(key.to_string(), connection);
    }
}

#[async_trait]
impl DiscoveryService for MemoryDiscovery {
    async fn resolve_one(
        &self,
        _correlation_id: Option<&str>,
        key: &str,
    ) -> PersistenceResult<Option<ConnectionParams>> {
        Ok(self.items.read().await.get(key).cloned())
    }
}

/// Credential store backed by a static key to credential map.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    items: RwLock<HashMap<String, CredentialParams>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ConfigParams) -> Self {
        Self {
            items: RwLock::new(
                config
                    .section_names()
                    .into_iter()
                    .map(|key| {
                        let params = CredentialParams::new(config.section(&key));
                        (key, params)
                    })
                    .collect(),
            ),
        }
    }

    /// Stores or replaces the credential under `key`.
    pub async fn store(&self, key: &str, credential: CredentialParams) {
        self.items.write().await.insert(key.to_string(), credential);
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn lookup(
        &self,
        _correlation_id: Option<&str>,
        key: &str,
    ) -> PersistenceResult<Option<CredentialParams>> {
        Ok(self.items.read().await.get(key).cloned())
    }
}
