//! Lifecycle of a single physical connection and its bucket handle.
//!
//! A [`StoreConnection`] resolves its URI, connects through the injected
//! [`DocumentDriver`], optionally creates the bucket and its primary index,
//! and holds the open handles until closed.
//!
//! # Example
//!
//! ```ignore
//! use couchlayer_core::{config::ConfigParams, connection::StoreConnection, lifecycle::*};
//!
//! let mut connection = StoreConnection::new(driver);
//! connection.configure(&ConfigParams::from_tuples([
//!     ("bucket", "test"),
//!     ("connection.host", "localhost"),
//!     ("connection.port", "8091"),
//!     ("options.auto_create", "true"),
//! ]))?;
//!
//! connection.open(None).await?;
//! let bucket = connection.bucket().await;
//! connection.close(None).await?;
//! ```

use async_trait::async_trait;
use mea::rwlock::RwLock;
use std::{sync::Arc, time::Duration};
use tracing::{debug, error};

use crate::{
    config::ConfigParams,
    driver::{BucketHandle, BucketSettings, DocumentDriver, DriverCluster},
    error::{DriverErrorKind, PersistenceError, PersistenceResult},
    lifecycle::{Configurable, Opener, References, Referenceable},
    params::ConnectionOptions,
    resolver::{ConnectionResolver, ResolvedConnection},
};

/// Time a freshly created bucket is given to initialize before it is opened.
pub const BUCKET_SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Handles held while a connection is open.
#[derive(Debug, Clone)]
pub struct OpenConnection {
    pub cluster: Arc<dyn DriverCluster>,
    pub bucket: Arc<dyn BucketHandle>,
    pub bucket_name: String,
}

/// Owns one physical cluster connection and one bucket handle.
#[derive(Debug)]
pub struct StoreConnection {
    driver: Arc<dyn DocumentDriver>,
    resolver: ConnectionResolver,
    options: ConnectionOptions,
    bucket_name: Option<String>,
    state: RwLock<Option<OpenConnection>>,
}

impl StoreConnection {
    pub fn new(driver: Arc<dyn DocumentDriver>) -> Self {
        Self {
            driver,
            resolver: ConnectionResolver::new(),
            options: ConnectionOptions::default(),
            bucket_name: None,
            state: RwLock::new(None),
        }
    }

    /// Bucket management options read on configure.
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Configured bucket name.
    pub fn bucket_name(&self) -> Option<&str> {
        self.bucket_name.as_deref()
    }

    /// Cluster handle, when open.
    pub async fn cluster(&self) -> Option<Arc<dyn DriverCluster>> {
        self.state.read().await.as_ref().map(|open| open.cluster.clone())
    }

    /// Bucket handle, when open.
    pub async fn bucket(&self) -> Option<Arc<dyn BucketHandle>> {
        self.state.read().await.as_ref().map(|open| open.bucket.clone())
    }

    /// Returns a snapshot of the open handles, or `None` when closed.
    pub async fn handles(&self) -> Option<OpenConnection> {
        self.state.read().await.clone()
    }

    async fn connect(
        &self,
        correlation_id: Option<&str>,
        resolved: &ResolvedConnection,
        bucket_name: &str,
    ) -> PersistenceResult<OpenConnection> {
        let cluster = self.driver.connect(resolved).await.map_err(|err| {
            PersistenceError::connection("CONNECT_FAILED", "Connection to couchbase failed", Some(err))
        })?;

        match self.open_bucket(correlation_id, &cluster, bucket_name).await {
            Ok(bucket) => Ok(OpenConnection {
                cluster,
                bucket,
                bucket_name: bucket_name.to_string(),
            }),
            Err(err) => {
                cluster.disconnect().await;
                Err(err)
            }
        }
    }

    async fn open_bucket(
        &self,
        correlation_id: Option<&str>,
        cluster: &Arc<dyn DriverCluster>,
        bucket_name: &str,
    ) -> PersistenceResult<Arc<dyn BucketHandle>> {
        let created = if self.options.auto_create {
            self.create_bucket(correlation_id, cluster, bucket_name).await?
        } else {
            false
        };

        let bucket = cluster.open_bucket(bucket_name).await.map_err(|err| {
            PersistenceError::connection(
                "CONNECT_FAILED",
                format!("Connection to couchbase bucket {bucket_name} failed"),
                Some(err),
            )
        })?;

        if created && self.options.auto_index {
            match cluster.create_primary_index(bucket_name).await {
                Ok(()) => debug!(correlation_id, "Created primary index on bucket {}", bucket_name),
                Err(err) if err.kind == DriverErrorKind::IndexExists => {}
                Err(err) => {
                    bucket.disconnect().await;
                    return Err(err.into());
                }
            }
        }

        Ok(bucket)
    }

    /// Creates the bucket, returning `true` when it did not exist before.
    async fn create_bucket(
        &self,
        correlation_id: Option<&str>,
        cluster: &Arc<dyn DriverCluster>,
        bucket_name: &str,
    ) -> PersistenceResult<bool> {
        let settings = BucketSettings {
            name: bucket_name.to_string(),
            bucket_type: self.options.bucket_type.clone(),
            ram_quota_mb: self.options.ram_quota,
            flush_enabled: self.options.flush_enabled,
        };

        match cluster.create_bucket(&settings).await {
            Ok(()) => {
                debug!(correlation_id, "Created couchbase bucket {}", bucket_name);
                tokio::time::sleep(BUCKET_SETTLE_DELAY).await;
                Ok(true)
            }
            Err(err) if err.kind == DriverErrorKind::BucketExists => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

impl Configurable for StoreConnection {
    fn configure(&mut self, config: &ConfigParams) -> PersistenceResult<()> {
        self.resolver.configure(config);
        self.options = self.options.with_config(config);
        if let Some(bucket) = config.get_non_empty("bucket") {
            self.bucket_name = Some(bucket.to_string());
        }

        Ok(())
    }
}

impl Referenceable for StoreConnection {
    fn set_references(&mut self, references: &References) -> PersistenceResult<()> {
        self.resolver.set_references(references);
        Ok(())
    }

    fn unset_references(&mut self) {
        self.resolver.set_references(&References::new());
    }
}

#[async_trait]
impl Opener for StoreConnection {
    async fn is_open(&self) -> bool {
        self.state.read().await.is_some()
    }

    async fn open(&self, correlation_id: Option<&str>) -> PersistenceResult<()> {
        let mut state = self.state.write().await;
        if state.is_some() {
            return Ok(());
        }

        let resolved = self.resolver.resolve(correlation_id).await.inspect_err(|err| {
            error!(correlation_id, error = %err, "Failed to resolve couchbase connection");
        })?;

        let Some(bucket_name) = self.bucket_name.clone() else {
            let err = PersistenceError::config("NO_BUCKET", "Couchbase bucket is not configured");
            error!(correlation_id, error = %err, "Failed to open couchbase connection");
            return Err(err);
        };

        debug!(correlation_id, uri = %resolved.uri, "Connecting to couchbase bucket {}", bucket_name);

        match self.connect(correlation_id, &resolved, &bucket_name).await {
            Ok(open) => {
                *state = Some(open);
                debug!(correlation_id, "Connected to couchbase bucket {}", bucket_name);
                Ok(())
            }
            Err(err) => {
                *state = None;
                error!(correlation_id, error = %err, "Failed to open couchbase connection");
                Err(err)
            }
        }
    }

    async fn close(&self, correlation_id: Option<&str>) -> PersistenceResult<()> {
        if let Some(open) = self.state.write().await.take() {
            open.bucket.disconnect().await;
            open.cluster.disconnect().await;
            debug!(correlation_id, "Disconnected from couchbase bucket {}", open.bucket_name);
        }

        Ok(())
    }
}
