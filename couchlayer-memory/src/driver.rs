//! In-memory document driver and cluster.

use async_trait::async_trait;
use mea::rwlock::RwLock;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use couchlayer_core::{
    driver::{BucketHandle, BucketSettings, DocumentDriver, DocumentDriverBuilder, DriverCluster},
    error::{DriverError, DriverErrorKind, DriverResult},
    resolver::ResolvedConnection,
};

use crate::bucket::{BucketData, MemoryBucket, SharedBucket};

#[derive(Debug, Default)]
struct ClusterState {
    buckets: HashMap<String, SharedBucket>,
    indexes: HashSet<String>,
}

/// Thread-safe in-memory document driver.
///
/// Clones share the same buckets, so a test can keep one clone for inspection
/// while persistence components connect through another. When users are
/// registered, connections must present a matching username and password.
///
/// ```ignore
/// use couchlayer_memory::InMemoryDriver;
///
/// let driver = InMemoryDriver::builder().with_bucket("test").build().await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryDriver {
    state: Arc<RwLock<ClusterState>>,
    users: Arc<HashMap<String, String>>,
}

impl InMemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a builder for a driver with seeded buckets or users.
    pub fn builder() -> InMemoryDriverBuilder {
        InMemoryDriverBuilder::default()
    }

    /// Returns a handle on an existing bucket.
    pub async fn bucket(&self, name: &str) -> Option<MemoryBucket> {
        self.state
            .read()
            .await
            .buckets
            .get(name)
            .map(|data| MemoryBucket::new(name, data.clone()))
    }

    /// Returns `true` once a primary index was created on `bucket`.
    pub async fn has_primary_index(&self, bucket: &str) -> bool {
        self.state.read().await.indexes.contains(bucket)
    }

    fn authenticate(&self, connection: &ResolvedConnection) -> DriverResult<()> {
        if self.users.is_empty() {
            return Ok(());
        }

        let matches = connection
            .username
            .as_ref()
            .and_then(|username| self.users.get(username))
            .is_some_and(|password| connection.password.as_deref() == Some(password.as_str()));

        if matches {
            Ok(())
        } else {
            Err(DriverError::new(
                DriverErrorKind::AuthenticationFailed,
                format!("Authentication failed for {}", connection.uri),
            ))
        }
    }
}

#[async_trait]
impl DocumentDriver for InMemoryDriver {
    async fn connect(&self, connection: &ResolvedConnection) -> DriverResult<Arc<dyn DriverCluster>> {
        if connection.uri.is_empty() {
            return Err(DriverError::other("Connection URI is empty"));
        }

        self.authenticate(connection)?;
        tracing::debug!(uri = %connection.uri, "connected to in-memory cluster");

        Ok(Arc::new(MemoryCluster { state: self.state.clone() }))
    }
}

/// Cluster connection handed out by [`InMemoryDriver`].
#[derive(Debug)]
pub struct MemoryCluster {
    state: Arc<RwLock<ClusterState>>,
}

#[async_trait]
impl DriverCluster for MemoryCluster {
    async fn create_bucket(&self, settings: &BucketSettings) -> DriverResult<()> {
        let mut state = self.state.write().await;

        if state.buckets.contains_key(&settings.name) {
            return Err(DriverError::new(
                DriverErrorKind::BucketExists,
                format!("Bucket {} already exists", settings.name),
            ));
        }

        state.buckets.insert(
            settings.name.clone(),
            Arc::new(RwLock::new(BucketData::new(settings.flush_enabled))),
        );
        Ok(())
    }

    async fn open_bucket(&self, name: &str) -> DriverResult<Arc<dyn BucketHandle>> {
        match self.state.read().await.buckets.get(name) {
            Some(data) => Ok(Arc::new(MemoryBucket::new(name, data.clone()))),
            None => Err(DriverError::other(format!("Bucket {name} does not exist"))),
        }
    }

    async fn create_primary_index(&self, bucket: &str) -> DriverResult<()> {
        let mut state = self.state.write().await;

        if !state.buckets.contains_key(bucket) {
            return Err(DriverError::other(format!("Bucket {bucket} does not exist")));
        }

        if !state.indexes.insert(bucket.to_string()) {
            return Err(DriverError::new(
                DriverErrorKind::IndexExists,
                format!("Primary index on {bucket} already exists"),
            ));
        }

        Ok(())
    }

    async fn disconnect(&self) {}
}

/// Builder for [`InMemoryDriver`] with preexisting buckets and users.
#[derive(Debug, Default)]
pub struct InMemoryDriverBuilder {
    buckets: Vec<(String, bool)>,
    users: HashMap<String, String>,
}

impl InMemoryDriverBuilder {
    /// Adds a bucket with flush enabled.
    pub fn with_bucket(mut self, name: impl Into<String>) -> Self {
        self.buckets.push((name.into(), true));
        self
    }

    /// Seeds a bucket that rejects flush.
    pub fn with_unflushable_bucket(mut self, name: impl Into<String>) -> Self {
        self.buckets.push((name.into(), false));
        self
    }

    /// Requires these credentials on connect. Without any user every login is accepted.
    pub fn with_user(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.users.insert(username.into(), password.into());
        self
    }
}

#[async_trait]
impl DocumentDriverBuilder for InMemoryDriverBuilder {
    type Driver = InMemoryDriver;

    async fn build(self) -> DriverResult<Self::Driver> {
        let buckets = self
            .buckets
            .into_iter()
            .map(|(name, flush_enabled)| (name, Arc::new(RwLock::new(BucketData::new(flush_enabled)))))
            .collect();

        Ok(InMemoryDriver {
            state: Arc::new(RwLock::new(ClusterState { buckets, indexes: HashSet::new() })),
            users: Arc::new(self.users),
        })
    }
}
