//! Resolution of scattered connection configuration into a single connection URI.
//!
//! The [`ConnectionResolver`] collects one or many connection entries and an
//! optional credential entry, follows discovery and credential-store
//! indirections, validates the result and composes a
//! [`ResolvedConnection`].
//!
//! # Example
//!
//! ```ignore
//! use couchlayer_core::{config::ConfigParams, resolver::ConnectionResolver};
//!
//! let mut resolver = ConnectionResolver::new();
//! resolver.configure(&ConfigParams::from_tuples([
//!     ("connection.host", "localhost"),
//!     ("connection.port", "8091"),
//!     ("connection.database", "test"),
//! ]));
//!
//! let resolved = resolver.resolve(None).await?;
//! assert_eq!(resolved.uri, "couchbase://localhost:8091/test");
//! ```

use futures::future::try_join_all;
use std::sync::Arc;

use crate::{
    config::ConfigParams,
    discovery::{CredentialStore, DiscoveryService},
    error::{PersistenceError, PersistenceResult},
    lifecycle::References,
    params::{ConnectionParams, CredentialParams},
};

/// URI scheme used when no entry specifies a `protocol`.
pub const DEFAULT_SCHEME: &str = "couchbase";

/// Keys consumed by URI composition and never forwarded as query parameters.
const CONSUMED_KEYS: [&str; 9] = [
    "uri",
    "host",
    "port",
    "protocol",
    "database",
    "username",
    "password",
    "discovery_key",
    "store_key",
];

/// The final URI and credential pair used to establish a physical connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedConnection {
    pub uri: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ResolvedConnection {
    /// Creates an unauthenticated connection descriptor.
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into(), username: None, password: None }
    }

    /// Attaches credentials. The password is only kept alongside a username.
    pub fn with_credential(mut self, credential: Option<&CredentialParams>) -> Self {
        if let Some(username) = credential.and_then(|c| c.username()) {
            self.username = Some(username.to_string());
            self.password = credential
                .and_then(|c| c.password())
                .map(str::to_string);
        }
        self
    }
}

/// Merges connection and credential configuration into a [`ResolvedConnection`].
#[derive(Debug, Clone, Default)]
pub struct ConnectionResolver {
    connections: Vec<ConnectionParams>,
    credentials: Vec<CredentialParams>,
    discovery: Vec<Arc<dyn DiscoveryService>>,
    credential_stores: Vec<Arc<dyn CredentialStore>>,
}

impl ConnectionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the configured connection and credential entries.
    pub fn configure(&mut self, config: &ConfigParams) {
        self.connections = ConnectionParams::many_from_config(config);
        self.credentials = CredentialParams::many_from_config(config);
    }

    /// Picks up the discovery services and credential stores to resolve indirections with.
    pub fn set_references(&mut self, references: &References) {
        self.discovery = references.discovery().to_vec();
        self.credential_stores = references.credential_stores().to_vec();
    }

    /// Appends a connection entry after the configured ones.
    pub fn add_connection(&mut self, connection: ConnectionParams) {
        self.connections.push(connection);
    }

    /// Appends a credential entry. The first usable credential wins.
    pub fn add_credential(&mut self, credential: CredentialParams) {
        self.credentials.push(credential);
    }

    /// Configured connection entries, before discovery.
    pub fn connections(&self) -> &[ConnectionParams] {
        &self.connections
    }

    /// Resolves the configured entries into a single connection descriptor.
    ///
    /// # Errors
    ///
    /// Returns a [`PersistenceError::Config`] when no connection is configured,
    /// when an entry has neither a URI nor a host or port, or when a discovery
    /// or store key cannot be resolved.
    pub async fn resolve(&self, correlation_id: Option<&str>) -> PersistenceResult<ResolvedConnection> {
        let (connections, credential) = futures::try_join!(
            self.resolve_connections(correlation_id),
            self.lookup_credential(correlation_id),
        )?;

        for connection in &connections {
            Self::validate_connection(connection)?;
        }

        let uri = match connections.iter().find_map(|c| c.uri()) {
            Some(uri) => uri.to_string(),
            None => Self::compose_uri(&connections, credential.as_ref()),
        };

        Ok(ResolvedConnection::new(uri).with_credential(credential.as_ref()))
    }

    async fn resolve_connections(&self, correlation_id: Option<&str>) -> PersistenceResult<Vec<ConnectionParams>> {
        if self.connections.is_empty() {
            return Err(PersistenceError::config(
                "NO_CONNECTION",
                "Connection is not configured",
            ));
        }

        try_join_all(
            self.connections
                .iter()
                .map(|connection| self.resolve_connection(correlation_id, connection)),
        )
        .await
    }

    async fn resolve_connection(
        &self,
        correlation_id: Option<&str>,
        connection: &ConnectionParams,
    ) -> PersistenceResult<ConnectionParams> {
        let Some(key) = connection.discovery_key() else {
            return Ok(connection.clone());
        };

        for service in &self.discovery {
            if let Some(found) = service.resolve_one(correlation_id, key).await? {
                let mut local = connection.params().clone();
                local.remove("discovery_key");
                return Ok(ConnectionParams::new(local.merge(found.params())));
            }
        }

        Err(PersistenceError::config(
            "CANNOT_RESOLVE",
            format!("Connection with discovery key {key} cannot be resolved"),
        ))
    }

    async fn lookup_credential(&self, correlation_id: Option<&str>) -> PersistenceResult<Option<CredentialParams>> {
        for credential in &self.credentials {
            let Some(key) = credential.store_key() else {
                return Ok(Some(credential.clone()));
            };

            if self.credential_stores.is_empty() {
                return Err(PersistenceError::config(
                    "CANNOT_RESOLVE",
                    format!("Credential store key {key} is set but no credential store is referenced"),
                ));
            }

            for store in &self.credential_stores {
                if let Some(found) = store.lookup(correlation_id, key).await? {
                    return Ok(Some(found));
                }
            }
        }

        Ok(None)
    }

    fn validate_connection(connection: &ConnectionParams) -> PersistenceResult<()> {
        if connection.uri().is_some() {
            return Ok(());
        }

        if connection.host().is_none() {
            return Err(PersistenceError::config("NO_HOST", "Connection host is not set"));
        }

        if connection.port().is_none() {
            return Err(PersistenceError::config("NO_PORT", "Connection port is not set"));
        }

        Ok(())
    }

    fn compose_uri(connections: &[ConnectionParams], credential: Option<&CredentialParams>) -> String {
        let scheme = connections
            .iter()
            .find_map(|c| c.protocol())
            .unwrap_or(DEFAULT_SCHEME);

        let hosts = connections
            .iter()
            .map(|c| match (c.host(), c.port()) {
                (Some(host), Some(port)) => format!("{host}:{port}"),
                (Some(host), None) => host.to_string(),
                (None, _) => String::new(),
            })
            .collect::<Vec<_>>()
            .join(",");

        let database = connections
            .iter()
            .find_map(|c| c.database())
            .map(|database| format!("/{database}"))
            .unwrap_or_default();

        let mut options = connections
            .iter()
            .fold(ConfigParams::new(), |merged, c| merged.merge(c.params()));
        if let Some(credential) = credential {
            options = options.merge(credential.params());
        }
        for key in CONSUMED_KEYS {
            options.remove(key);
        }

        let params = options
            .iter()
            .map(|(key, value)| {
                if value.is_empty() {
                    key.to_string()
                } else {
                    format!("{key}={value}")
                }
            })
            .collect::<Vec<_>>()
            .join("&");
        let params = if params.is_empty() { params } else { format!("?{params}") };

        format!("{scheme}://{hosts}{database}{params}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{MemoryCredentialStore, MemoryDiscovery};

    fn resolver(tuples: &[(&str, &str)]) -> ConnectionResolver {
        let mut resolver = ConnectionResolver::new();
        resolver.configure(&ConfigParams::from_tuples(tuples.iter().copied()));
        resolver
    }

    #[tokio::test]
    async fn composes_uri_from_single_connection() {
        let resolved = resolver(&[
            ("connection.host", "localhost"),
            ("connection.port", "8091"),
            ("connection.database", "test"),
        ])
        .resolve(None)
        .await
        .unwrap();

        assert_eq!(resolved.uri, "couchbase://localhost:8091/test");
        assert_eq!(resolved.username, None);
        assert_eq!(resolved.password, None);
    }

    #[tokio::test]
    async fn joins_hosts_in_entry_order() {
        let resolved = resolver(&[
            ("connections.1.host", "host1"),
            ("connections.1.port", "8091"),
            ("connections.1.database", "test"),
            ("connections.2.host", "host2"),
            ("connections.2.port", "8091"),
            ("connections.2.database", "test"),
        ])
        .resolve(None)
        .await
        .unwrap();

        assert_eq!(resolved.uri, "couchbase://host1:8091,host2:8091/test");
    }

    #[tokio::test]
    async fn appends_leftover_keys_as_params() {
        let resolved = resolver(&[
            ("connection.host", "localhost"),
            ("connection.port", "8091"),
            ("connection.timeout", "5000"),
            ("connection.ssl", "true"),
            ("credential.username", "admin"),
            ("credential.password", "secret"),
        ])
        .resolve(Some("123"))
        .await
        .unwrap();

        assert_eq!(resolved.uri, "couchbase://localhost:8091?timeout=5000&ssl=true");
        assert_eq!(resolved.username.as_deref(), Some("admin"));
        assert_eq!(resolved.password.as_deref(), Some("secret"));
    }

    #[tokio::test]
    async fn password_requires_username() {
        let resolved = resolver(&[
            ("connection.host", "localhost"),
            ("connection.port", "8091"),
            ("credential.password", "secret"),
        ])
        .resolve(None)
        .await
        .unwrap();

        assert_eq!(resolved.username, None);
        assert_eq!(resolved.password, None);
    }

    #[tokio::test]
    async fn explicit_uri_wins() {
        let resolved = resolver(&[
            ("connections.1.host", "host1"),
            ("connections.1.port", "8091"),
            ("connections.2.uri", "couchbase://cluster:11210/data"),
            ("connections.3.uri", "couchbase://other:11210/data"),
        ])
        .resolve(None)
        .await
        .unwrap();

        assert_eq!(resolved.uri, "couchbase://cluster:11210/data");
    }

    #[tokio::test]
    async fn fails_without_connections() {
        let err = resolver(&[("bucket", "test")]).resolve(None).await.unwrap_err();
        assert_eq!(err.code(), Some("NO_CONNECTION"));
    }

    #[tokio::test]
    async fn fails_without_host_or_port() {
        let err = resolver(&[("connection.port", "8091")]).resolve(None).await.unwrap_err();
        assert_eq!(err.code(), Some("NO_HOST"));

        let err = resolver(&[("connection.host", "localhost"), ("connection.port", "0")])
            .resolve(None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("NO_PORT"));
    }

    #[tokio::test]
    async fn resolves_discovery_and_store_keys() {
        let discovery = Arc::new(MemoryDiscovery::from_config(&ConfigParams::from_tuples([
            ("main.host", "discovered"),
            ("main.port", "8091"),
        ])));
        let store = Arc::new(MemoryCredentialStore::from_config(&ConfigParams::from_tuples([
            ("admin.username", "admin"),
            ("admin.password", "pass"),
        ])));

        let mut resolver = resolver(&[
            ("connection.discovery_key", "main"),
            ("connection.database", "test"),
            ("credential.store_key", "admin"),
        ]);
        resolver.set_references(
            &References::new()
                .with_discovery(discovery)
                .with_credential_store(store),
        );

        let resolved = resolver.resolve(None).await.unwrap();
        assert_eq!(resolved.uri, "couchbase://discovered:8091/test");
        assert_eq!(resolved.username.as_deref(), Some("admin"));
    }

    #[tokio::test]
    async fn unresolvable_discovery_key_fails() {
        let err = resolver(&[("connection.discovery_key", "missing")])
            .resolve(None)
            .await
            .unwrap_err();

        assert_eq!(err.code(), Some("CANNOT_RESOLVE"));
    }

    #[tokio::test]
    async fn resolve_does_not_mutate_entries() {
        let resolver = resolver(&[
            ("connection.host", "localhost"),
            ("connection.port", "8091"),
            ("connection.timeout", "5000"),
        ]);
        let before = resolver.connections().to_vec();

        resolver.resolve(None).await.unwrap();
        assert_eq!(resolver.connections(), before.as_slice());
    }
}
